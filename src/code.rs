use crate::{
    decode::Decoder,
    error::Error,
    instr::{ImmKind, Opcode},
};

/// A single word in a token stream: either an opcode or an immediate.
pub type Token = i32;

/// The preprocessed code of a module.
///
/// Instructions in a module image have variable length: a 1-byte opcode, followed by a 0, 1 or
/// 4-byte immediate. [`Code`] stores the same instructions as a token stream, in which every
/// opcode and every immediate takes up exactly one [`Token`]. Branch immediates, which are
/// instruction indices in the image, are rewritten to token offsets, so that a taken branch does
/// not need to look up its target.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Code {
    tokens: Box<[Token]>,
    instr_offsets: Box<[u32]>,
}

impl Code {
    /// Preprocesses the given code section, which contains `instr_count` instructions.
    ///
    /// # Errors
    ///
    /// - [`Error::ProgramCounterOutOfRange`] if the code section ends in the middle of an
    ///   instruction, or before `instr_count` instructions have been read.
    /// - [`Error::BadInstruction`] if an opcode is invalid.
    /// - [`Error::InvalidJumpTarget`] if a branch targets an instruction index that is out of range.
    pub fn new(code: &[u8], instr_count: u32) -> Result<Self, Error> {
        let mut code = Self::tokenize(code, instr_count)?;
        code.link()?;
        Ok(code)
    }

    /// Returns the token stream of this [`Code`].
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Returns the number of instructions in this [`Code`].
    pub fn instr_count(&self) -> usize {
        self.instr_offsets.len()
    }

    /// Returns the token offset of the instruction with the given index, if it exists.
    #[inline]
    pub fn instr_offset(&self, instr_idx: u32) -> Option<usize> {
        self.instr_offsets
            .get(instr_idx as usize)
            .map(|&offset| offset as usize)
    }

    /// Returns the token at the given offset, if it exists.
    #[inline]
    pub(crate) fn token(&self, offset: usize) -> Option<Token> {
        self.tokens.get(offset).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Converts the given code section to a token stream, and records the token offset of each
    /// instruction.
    fn tokenize(code: &[u8], instr_count: u32) -> Result<Self, Error> {
        let mut decoder = Decoder::new(code);
        let mut tokens = Vec::with_capacity(code.len());
        let mut instr_offsets = Vec::with_capacity((instr_count as usize).min(code.len()));
        for instr_idx in 0..instr_count {
            instr_offsets.push(tokens.len() as u32);
            let Some(byte) = decoder.read_byte() else {
                tracing::warn!(instr_idx, "code section ended before the last instruction");
                return Err(Error::ProgramCounterOutOfRange);
            };
            let Some(opcode) = Opcode::from_u8(byte) else {
                tracing::warn!(instr_idx, opcode = byte, "bad instruction");
                return Err(Error::BadInstruction);
            };
            tokens.push(opcode as Token);
            let imm = match opcode.imm_kind() {
                ImmKind::None => continue,
                ImmKind::Byte => decoder.read_byte().map(Token::from),
                ImmKind::Word | ImmKind::Target => decoder.read_i32(),
            };
            let Some(imm) = imm else {
                tracing::warn!(instr_idx, %opcode, "code section ended in the middle of an immediate");
                return Err(Error::ProgramCounterOutOfRange);
            };
            tokens.push(imm);
        }
        if !decoder.is_at_end() {
            tracing::debug!(
                trailing = code.len() - decoder.position(),
                "ignoring trailing bytes in code section"
            );
        }
        Ok(Self {
            tokens: tokens.into(),
            instr_offsets: instr_offsets.into(),
        })
    }

    /// Rewrites the immediate of every branch from an instruction index to a token offset.
    fn link(&mut self) -> Result<(), Error> {
        let mut offset = 0;
        for _ in 0..self.instr_offsets.len() {
            let opcode = Opcode::from_token(self.tokens[offset]).ok_or(Error::BadInstruction)?;
            offset += 1;
            match opcode.imm_kind() {
                ImmKind::None => {}
                ImmKind::Byte | ImmKind::Word => offset += 1,
                ImmKind::Target => {
                    let target = self.tokens[offset];
                    let target_offset = u32::try_from(target)
                        .ok()
                        .and_then(|target| self.instr_offset(target))
                        .ok_or_else(|| {
                            tracing::warn!(%opcode, target, "jump to invalid instruction");
                            Error::InvalidJumpTarget
                        })?;
                    self.tokens[offset] = target_offset as Token;
                    offset += 1;
                }
            }
        }
        Ok(())
    }
}
