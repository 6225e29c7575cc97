use makepad_qvm::{Assembler, Config, Error, Header, Opcode, Vm, MAGIC};

fn minimal() -> Assembler {
    let mut asm = Assembler::new();
    asm.enter(8).const_(0).leave(8);
    asm
}

fn load(image: &[u8]) -> Result<Vm, Error> {
    load_with_config(image, Config::default())
}

fn load_with_config(image: &[u8], config: Config) -> Result<Vm, Error> {
    Vm::builder("test")
        .config(config)
        .syscalls(|_, args| Err(Error::UnknownSyscall(args.id())))
        .load(image)
}

fn set_header_field(image: &mut [u8], idx: usize, val: i32) {
    image[4 * idx..4 * idx + 4].copy_from_slice(&val.to_le_bytes());
}

#[test]
fn test_load() {
    let image = minimal().finish();
    let vm = load(&image).unwrap();
    assert_eq!(vm.name(), "test");
    assert!(vm.is_loaded());
    assert_eq!(vm.instruction_count(), 3);
    assert_eq!(vm.header().magic, MAGIC);
    assert_eq!(vm.header().instruction_count, 3);
    assert_eq!(vm.header().code_offset, Header::SIZE as i32);
    assert_eq!(vm.header().code_length, 15);
    assert_eq!(vm.data().size(), 0x40000);
    assert_eq!(vm.data_mask(), 0x3FFFF);
    assert_eq!(vm.data().bytes().len(), 0x40004);
    assert_eq!(vm.program_stack(), 0x40000);
    assert_eq!(vm.stack_bottom(), 0x30000);
    assert_eq!(vm.call_depth(), 0);
    assert!(!vm.is_interpreting());
    assert_eq!(vm.last_error(), None);
}

#[test]
fn test_decode_header() {
    let mut asm = minimal();
    asm.data_word(1);
    asm.lit_str("abc");
    asm.bss(64);
    let image = asm.finish();
    let header = Header::decode(&image, &Config::default()).unwrap();
    assert_eq!(header.data_offset, Header::SIZE as i32 + 15);
    assert_eq!(header.data_length, 4);
    assert_eq!(header.lit_length, 4);
    assert_eq!(header.bss_length, 64);
    assert_eq!(header.code_range(), 32..47);
    assert_eq!(header.data_range(), 47..55);
}

#[test]
fn test_data_is_copied() {
    let mut asm = minimal();
    let word = asm.data_word(0x01020304);
    let string = asm.lit_str("hello");
    let bss = asm.bss(4);
    let vm = load(&asm.finish()).unwrap();
    assert_eq!(word, 0);
    assert_eq!(string, 4);
    assert_eq!(bss, 10);
    assert_eq!(vm.data().read_i32(word), 0x01020304);
    assert_eq!(vm.data().read_c_str(string), b"hello");
    assert_eq!(vm.data().read_i32(bss), 0);
}

#[test]
fn test_data_segment_size() {
    let mut asm = minimal();
    asm.bss(0x20000);
    let vm = load(&asm.finish()).unwrap();
    assert_eq!(vm.data().size(), 0x80000);

    let config = Config::default().with_heap_reserve(0);
    let mut asm = minimal();
    asm.bss(0x1000);
    let vm = load_with_config(&asm.finish(), config).unwrap();
    assert_eq!(vm.data().size(), 0x1000);
}

#[test]
fn test_no_syscalls() {
    let image = minimal().finish();
    let error = Vm::builder("test").load(&image).unwrap_err();
    assert_eq!(error, Error::NoSyscallCallback);
    assert_eq!(error.code(), -3);
}

#[test]
fn test_bad_magic() {
    let mut image = minimal().finish();
    image[0] ^= 1;
    assert_eq!(load(&image).unwrap_err(), Error::FailedToLoadBytecode);
}

#[test]
fn test_bad_size() {
    let image = minimal().finish();
    assert_eq!(load(&[]).unwrap_err(), Error::FailedToLoadBytecode);
    assert_eq!(load(&image[..Header::SIZE]).unwrap_err(), Error::FailedToLoadBytecode);
    assert_eq!(
        load_with_config(&image, Config::default().with_max_image_size(image.len() - 1)).unwrap_err(),
        Error::FailedToLoadBytecode
    );
    assert!(load_with_config(&image, Config::default().with_max_image_size(image.len())).is_ok());
}

#[test]
fn test_bad_header() {
    let image = minimal().finish();
    let cases = [
        // instruction count
        (1, 0),
        (1, -1),
        // code offset and length
        (2, -1),
        (2, image.len() as i32),
        (3, 0),
        (3, image.len() as i32),
        // data offset and lengths
        (4, -1),
        (4, image.len() as i32 + 1),
        (5, -4),
        (5, 4),
        (6, -1),
        (6, 1),
        (7, -1),
    ];
    for (idx, val) in cases {
        let mut image = image.clone();
        set_header_field(&mut image, idx, val);
        assert_eq!(
            load(&image).unwrap_err(),
            Error::FailedToLoadBytecode,
            "field {} = {}",
            idx,
            val
        );
    }
}

#[test]
fn test_bss_too_large() {
    let mut asm = minimal();
    asm.bss(Config::DEFAULT_MAX_BSS_LENGTH + 1);
    let image = asm.finish();
    assert_eq!(load(&image).unwrap_err(), Error::FailedToLoadBytecode);

    let config = Config::default().with_max_bss_length(u32::MAX);
    let mut asm = minimal();
    asm.bss(0x7FFF0000);
    let image = asm.finish();
    assert_eq!(load_with_config(&image, config).unwrap_err(), Error::MallocFailed);
}

#[test]
fn test_bad_instruction() {
    let mut image = minimal().finish();
    image[Header::SIZE + 5] = Opcode::COUNT as u8;
    assert_eq!(load(&image).unwrap_err(), Error::BadInstruction);

    let mut image = minimal().finish();
    image[Header::SIZE] = 0xFF;
    assert_eq!(load(&image).unwrap_err(), Error::BadInstruction);
}

#[test]
fn test_instruction_count_exceeds_code_length() {
    let mut image = Vec::new();
    for field in [MAGIC, i32::MAX, 32, 4, 36, 0, 0, 0] {
        image.extend_from_slice(&field.to_le_bytes());
    }
    image.extend_from_slice(&[Opcode::Ignore as u8; 4]);
    assert_eq!(load(&image).unwrap_err(), Error::FailedToLoadBytecode);

    set_header_field(&mut image, 1, 5);
    assert_eq!(load(&image).unwrap_err(), Error::FailedToLoadBytecode);
    set_header_field(&mut image, 1, 4);
    assert_eq!(load(&image).unwrap().instruction_count(), 4);
}

#[test]
fn test_truncated_code() {
    let mut image = minimal().finish();
    set_header_field(&mut image, 1, 4);
    assert_eq!(load(&image).unwrap_err(), Error::ProgramCounterOutOfRange);

    let mut image = minimal().finish();
    set_header_field(&mut image, 3, 14);
    assert_eq!(load(&image).unwrap_err(), Error::ProgramCounterOutOfRange);
}

#[test]
fn test_trailing_code_is_ignored() {
    let mut image = minimal().finish();
    set_header_field(&mut image, 1, 2);
    let vm = load(&image).unwrap();
    assert_eq!(vm.instruction_count(), 2);
    assert_eq!(vm.code().tokens().len(), 4);
}

#[test]
fn test_invalid_jump_target() {
    for target in [-1, 3, 4, i32::MAX] {
        let mut asm = Assembler::new();
        asm.const_(0)
            .const_(0)
            .op_imm(Opcode::Eq, target);
        assert_eq!(
            load(&asm.finish()).unwrap_err(),
            Error::InvalidJumpTarget,
            "{}",
            target
        );
    }
}

#[test]
fn test_load_failure_does_not_construct() {
    let image = minimal().finish();
    let mut corrupted = image.clone();
    corrupted[Header::SIZE] = 0xFF;
    assert!(load(&corrupted).is_err());
    let mut vm = load(&image).unwrap();
    assert_eq!(vm.call(0, &[]), Ok(0));
}
