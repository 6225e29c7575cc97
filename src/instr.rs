use std::fmt;

macro_rules! for_each_opcode {
    ($macro:ident) => {
        $macro! {
            Undef => None, "UNDEF"
            Ignore => None, "IGNORE"
            Break => None, "BREAK"

            Enter => Word, "ENTER"
            Leave => Word, "LEAVE"
            Call => None, "CALL"
            Push => None, "PUSH"
            Pop => None, "POP"

            Const => Word, "CONST"
            Local => Word, "LOCAL"

            Jump => None, "JUMP"

            Eq => Target, "EQ"
            Ne => Target, "NE"

            Lti => Target, "LTI"
            Lei => Target, "LEI"
            Gti => Target, "GTI"
            Gei => Target, "GEI"

            Ltu => Target, "LTU"
            Leu => Target, "LEU"
            Gtu => Target, "GTU"
            Geu => Target, "GEU"

            Eqf => Target, "EQF"
            Nef => Target, "NEF"

            Ltf => Target, "LTF"
            Lef => Target, "LEF"
            Gtf => Target, "GTF"
            Gef => Target, "GEF"

            Load1 => None, "LOAD1"
            Load2 => None, "LOAD2"
            Load4 => None, "LOAD4"
            Store1 => None, "STORE1"
            Store2 => None, "STORE2"
            Store4 => None, "STORE4"
            Arg => Byte, "ARG"

            BlockCopy => Word, "BLOCK_COPY"

            Sex8 => None, "SEX8"
            Sex16 => None, "SEX16"

            Negi => None, "NEGI"
            Add => None, "ADD"
            Sub => None, "SUB"
            Divi => None, "DIVI"
            Divu => None, "DIVU"
            Modi => None, "MODI"
            Modu => None, "MODU"
            Muli => None, "MULI"
            Mulu => None, "MULU"

            Band => None, "BAND"
            Bor => None, "BOR"
            Bxor => None, "BXOR"
            Bcom => None, "BCOM"

            Lsh => None, "LSH"
            Rshi => None, "RSHI"
            Rshu => None, "RSHU"

            Negf => None, "NEGF"
            Addf => None, "ADDF"
            Subf => None, "SUBF"
            Divf => None, "DIVF"
            Mulf => None, "MULF"

            Cvif => None, "CVIF"
            Cvfi => None, "CVFI"
        }
    };
}

macro_rules! define_opcode {
    ($($Name:ident => $Imm:ident, $text:literal)*) => {
        /// A QVM opcode.
        ///
        /// The discriminant of each variant is its on-disk encoding.
        #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
        #[repr(u8)]
        pub enum Opcode {
            $($Name,)*
        }

        impl Opcode {
            const ALL: &'static [Opcode] = &[$(Opcode::$Name,)*];

            /// Returns the kind of immediate that follows this [`Opcode`] in a module image.
            pub fn imm_kind(self) -> ImmKind {
                match self {
                    $(Self::$Name => ImmKind::$Imm,)*
                }
            }

            /// Returns the assembly mnemonic of this [`Opcode`].
            pub fn name(self) -> &'static str {
                match self {
                    $(Self::$Name => $text,)*
                }
            }
        }
    };
}

for_each_opcode!(define_opcode);

impl Opcode {
    /// The number of valid opcodes. Every encoding at or above this value is invalid.
    pub const COUNT: usize = Self::ALL.len();

    /// Decodes an [`Opcode`] from its on-disk encoding.
    pub fn from_u8(byte: u8) -> Option<Self> {
        Self::ALL.get(usize::from(byte)).copied()
    }

    /// Decodes an [`Opcode`] from a token in a token stream.
    pub(crate) fn from_token(token: i32) -> Option<Self> {
        usize::try_from(token)
            .ok()
            .and_then(|idx| Self::ALL.get(idx))
            .copied()
    }

    /// Returns `true` if this [`Opcode`] is a conditional branch.
    pub fn is_branch(self) -> bool {
        self.imm_kind() == ImmKind::Target
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The immediate operand carried by an [`Opcode`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ImmKind {
    /// No immediate.
    None,
    /// A 1-byte immediate.
    Byte,
    /// A 4-byte little-endian immediate.
    Word,
    /// A 4-byte little-endian instruction index, rewritten to a token offset when linking.
    Target,
}

impl ImmKind {
    /// Returns the size of this immediate in a module image, in bytes.
    pub fn encoded_size(self) -> usize {
        match self {
            Self::None => 0,
            Self::Byte => 1,
            Self::Word | Self::Target => 4,
        }
    }
}
