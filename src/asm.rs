use crate::{
    instr::{ImmKind, Opcode},
    module::{Header, MAGIC},
};

/// A label that refers to an instruction index.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Label(usize);

/// A builder for module images.
///
/// Code is emitted one instruction at a time. Branches and `CONST` instructions can refer to
/// [`Label`]s, which are resolved to instruction indices when the image is finished.
///
/// Data is laid out in the same order as in the image: initialized data words first, then
/// literals, then bss.
#[derive(Clone, Debug, Default)]
pub struct Assembler {
    code: Vec<u8>,
    instr_count: u32,
    labels: Vec<Option<u32>>,
    fixups: Vec<(usize, Label)>,
    data: Vec<u8>,
    lit: Vec<u8>,
    bss_length: u32,
}

impl Assembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the index of the next instruction to be emitted.
    pub fn instr_count(&self) -> u32 {
        self.instr_count
    }

    /// Creates a new, unbound [`Label`].
    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Binds the given [`Label`] to the next instruction to be emitted.
    ///
    /// # Panics
    ///
    /// If the [`Label`] is already bound.
    pub fn bind(&mut self, label: Label) -> &mut Self {
        let slot = &mut self.labels[label.0];
        assert!(slot.is_none(), "label is already bound");
        *slot = Some(self.instr_count);
        self
    }

    /// Emits an instruction without an immediate.
    ///
    /// # Panics
    ///
    /// If the given [`Opcode`] takes an immediate.
    pub fn op(&mut self, opcode: Opcode) -> &mut Self {
        assert_eq!(opcode.imm_kind(), ImmKind::None, "{} takes an immediate", opcode);
        self.emit_opcode(opcode);
        self
    }

    /// Emits an instruction with a 4-byte immediate.
    ///
    /// For branches, the immediate is the index of the target instruction.
    ///
    /// # Panics
    ///
    /// If the given [`Opcode`] does not take a 4-byte immediate.
    pub fn op_imm(&mut self, opcode: Opcode, imm: i32) -> &mut Self {
        assert!(
            matches!(opcode.imm_kind(), ImmKind::Word | ImmKind::Target),
            "{} does not take a 4-byte immediate",
            opcode
        );
        self.emit_opcode(opcode);
        self.code.extend_from_slice(&imm.to_le_bytes());
        self
    }

    /// Emits a conditional branch to the given [`Label`].
    ///
    /// # Panics
    ///
    /// If the given [`Opcode`] is not a conditional branch.
    pub fn branch(&mut self, opcode: Opcode, label: Label) -> &mut Self {
        assert!(opcode.is_branch(), "{} is not a branch", opcode);
        self.emit_opcode(opcode);
        self.emit_label(label);
        self
    }

    pub fn enter(&mut self, frame_size: i32) -> &mut Self {
        self.op_imm(Opcode::Enter, frame_size)
    }

    pub fn leave(&mut self, frame_size: i32) -> &mut Self {
        self.op_imm(Opcode::Leave, frame_size)
    }

    pub fn const_(&mut self, val: i32) -> &mut Self {
        self.op_imm(Opcode::Const, val)
    }

    pub fn const_f32(&mut self, val: f32) -> &mut Self {
        self.op_imm(Opcode::Const, val.to_bits() as i32)
    }

    /// Emits a `CONST` that pushes the instruction index of the given [`Label`], for use with
    /// `CALL` or `JUMP`.
    pub fn const_label(&mut self, label: Label) -> &mut Self {
        self.emit_opcode(Opcode::Const);
        self.emit_label(label);
        self
    }

    pub fn local(&mut self, offset: i32) -> &mut Self {
        self.op_imm(Opcode::Local, offset)
    }

    pub fn arg(&mut self, offset: u8) -> &mut Self {
        self.emit_opcode(Opcode::Arg);
        self.code.push(offset);
        self
    }

    pub fn block_copy(&mut self, len: i32) -> &mut Self {
        self.op_imm(Opcode::BlockCopy, len)
    }

    /// Emits a call to the syscall with the given number.
    pub fn syscall(&mut self, id: i32) -> &mut Self {
        self.const_(-1 - id).op(Opcode::Call)
    }

    /// Appends a word to the initialized data section, and returns its address.
    ///
    /// # Panics
    ///
    /// If literals or bss have already been added.
    pub fn data_word(&mut self, word: i32) -> u32 {
        assert!(
            self.lit.is_empty() && self.bss_length == 0,
            "data words must be added before literals and bss"
        );
        let addr = self.data.len() as u32;
        self.data.extend_from_slice(&word.to_le_bytes());
        addr
    }

    /// Appends bytes to the literal section, and returns their address.
    ///
    /// # Panics
    ///
    /// If bss has already been added.
    pub fn lit(&mut self, bytes: &[u8]) -> u32 {
        assert!(self.bss_length == 0, "literals must be added before bss");
        let addr = (self.data.len() + self.lit.len()) as u32;
        self.lit.extend_from_slice(bytes);
        addr
    }

    /// Appends a NUL-terminated string to the literal section, and returns its address.
    pub fn lit_str(&mut self, string: &str) -> u32 {
        let addr = self.lit(string.as_bytes());
        self.lit.push(0);
        addr
    }

    /// Reserves `len` zero-initialized bytes, and returns their address.
    pub fn bss(&mut self, len: u32) -> u32 {
        let addr = (self.data.len() + self.lit.len()) as u32 + self.bss_length;
        self.bss_length += len;
        addr
    }

    /// Finishes the module image.
    ///
    /// # Panics
    ///
    /// If a referenced [`Label`] is unbound.
    pub fn finish(&self) -> Vec<u8> {
        let mut code = self.code.clone();
        for &(pos, label) in &self.fixups {
            let instr_idx = self.labels[label.0].expect("unbound label");
            code[pos..pos + 4].copy_from_slice(&instr_idx.to_le_bytes());
        }
        let code_offset = Header::SIZE;
        let data_offset = code_offset + code.len();
        let header = [
            MAGIC,
            self.instr_count as i32,
            code_offset as i32,
            code.len() as i32,
            data_offset as i32,
            self.data.len() as i32,
            self.lit.len() as i32,
            self.bss_length as i32,
        ];
        let mut image = Vec::with_capacity(data_offset + self.data.len() + self.lit.len());
        for field in header {
            image.extend_from_slice(&field.to_le_bytes());
        }
        image.extend_from_slice(&code);
        image.extend_from_slice(&self.data);
        image.extend_from_slice(&self.lit);
        image
    }

    fn emit_opcode(&mut self, opcode: Opcode) {
        self.code.push(opcode as u8);
        self.instr_count += 1;
    }

    fn emit_label(&mut self, label: Label) {
        self.fixups.push((self.code.len(), label));
        self.code.extend_from_slice(&[0; 4]);
    }
}
