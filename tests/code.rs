use makepad_qvm::{Code, Error, ImmKind, Opcode, Token};

fn encode(instrs: &[(Opcode, i32)]) -> Vec<u8> {
    let mut bytes = Vec::new();
    for &(opcode, imm) in instrs {
        bytes.push(opcode as u8);
        match opcode.imm_kind() {
            ImmKind::None => {}
            ImmKind::Byte => bytes.push(imm as u8),
            ImmKind::Word | ImmKind::Target => bytes.extend_from_slice(&imm.to_le_bytes()),
        }
    }
    bytes
}

#[test]
fn test_opcode_encoding() {
    assert_eq!(Opcode::COUNT, 60);
    for byte in 0..=u8::MAX {
        match Opcode::from_u8(byte) {
            Some(opcode) => assert_eq!(opcode as u8, byte),
            None => assert!(usize::from(byte) >= Opcode::COUNT),
        }
    }
    assert_eq!(Opcode::from_u8(0), Some(Opcode::Undef));
    assert_eq!(Opcode::from_u8(34), Some(Opcode::BlockCopy));
    assert_eq!(Opcode::from_u8(59), Some(Opcode::Cvfi));
    assert_eq!(Opcode::BlockCopy.to_string(), "BLOCK_COPY");
    assert_eq!(Opcode::Arg.imm_kind(), ImmKind::Byte);
    assert_eq!(Opcode::Arg.imm_kind().encoded_size(), 1);
    assert_eq!(Opcode::Enter.imm_kind().encoded_size(), 4);
    assert_eq!(Opcode::Call.imm_kind().encoded_size(), 0);
}

#[test]
fn test_branches() {
    let branches: Vec<Opcode> = (0..Opcode::COUNT as u8)
        .filter_map(Opcode::from_u8)
        .filter(|opcode| opcode.is_branch())
        .collect();
    assert_eq!(branches.len(), 16);
    for opcode in branches {
        let bytes = encode(&[
            (Opcode::Const, 1),
            (Opcode::Const, 2),
            (opcode, 4),
            (Opcode::Ignore, 0),
            (Opcode::Ignore, 0),
        ]);
        let code = Code::new(&bytes, 5).unwrap();
        let expected: &[Token] = &[
            Opcode::Const as Token,
            1,
            Opcode::Const as Token,
            2,
            opcode as Token,
            7,
            Opcode::Ignore as Token,
            Opcode::Ignore as Token,
        ];
        assert_eq!(code.tokens(), expected, "{}", opcode);
    }
}

#[test]
fn test_instr_offsets() {
    let bytes = encode(&[
        (Opcode::Enter, 8),
        (Opcode::Arg, 12),
        (Opcode::Push, 0),
        (Opcode::Gei, 0),
        (Opcode::Leave, 8),
    ]);
    let code = Code::new(&bytes, 5).unwrap();
    assert_eq!(code.instr_count(), 5);
    assert_eq!(code.instr_offset(0), Some(0));
    assert_eq!(code.instr_offset(1), Some(2));
    assert_eq!(code.instr_offset(2), Some(4));
    assert_eq!(code.instr_offset(3), Some(5));
    assert_eq!(code.instr_offset(4), Some(7));
    assert_eq!(code.instr_offset(5), None);
    assert_eq!(code.tokens()[3], 12);
    assert_eq!(code.tokens()[6], 0);
    assert!(!code.is_empty());
}

#[test]
fn test_non_branch_immediates_are_kept() {
    let bytes = encode(&[(Opcode::Const, 1000), (Opcode::Local, -4), (Opcode::BlockCopy, 16)]);
    let code = Code::new(&bytes, 3).unwrap();
    assert_eq!(
        code.tokens(),
        &[
            Opcode::Const as Token,
            1000,
            Opcode::Local as Token,
            -4,
            Opcode::BlockCopy as Token,
            16
        ]
    );
}

#[test]
fn test_errors() {
    assert_eq!(Code::new(&[], 1), Err(Error::ProgramCounterOutOfRange));
    assert_eq!(Code::new(&[Opcode::Const as u8, 0, 0], 1), Err(Error::ProgramCounterOutOfRange));
    assert_eq!(Code::new(&[Opcode::Arg as u8], 1), Err(Error::ProgramCounterOutOfRange));
    assert_eq!(Code::new(&[Opcode::COUNT as u8], 1), Err(Error::BadInstruction));
    assert_eq!(Code::new(&encode(&[(Opcode::Eq, 1)]), 1), Err(Error::InvalidJumpTarget));
    assert_eq!(Code::new(&encode(&[(Opcode::Eq, -1)]), 1), Err(Error::InvalidJumpTarget));
    assert_eq!(Code::new(&encode(&[(Opcode::Eq, 0)]), 1).map(|code| code.tokens().len()), Ok(2));
}

#[test]
fn test_default_is_empty() {
    let code = Code::default();
    assert!(code.is_empty());
    assert_eq!(code.instr_count(), 0);
    assert_eq!(code.instr_offset(0), None);
}
