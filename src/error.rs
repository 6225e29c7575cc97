use thiserror::Error as ThisError;

/// An error that can occur when loading or running a QVM module.
///
/// Every variant has a stable numeric code, see [`Error::code`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, ThisError)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid pointer")]
    InvalidPointer,
    #[error("failed to load bytecode")]
    FailedToLoadBytecode,
    #[error("no syscall callback provided")]
    NoSyscallCallback,
    #[error("free called on a running vm")]
    FreeOnRunningVm,
    #[error("block copy out of range")]
    BlockCopyOutOfRange,
    #[error("program counter out of range")]
    ProgramCounterOutOfRange,
    #[error("jump to invalid instruction")]
    InvalidJumpTarget,
    #[error("program stack overflow")]
    StackOverflow,
    #[error("program stack misaligned")]
    StackMisaligned,
    #[error("misaligned 4-byte load")]
    Load4Misaligned,
    #[error("interpreter stack error")]
    InterpreterStackError,
    #[error("memory access out of range")]
    DataOutOfRange,
    #[error("allocation failed")]
    MallocFailed,
    #[error("bad instruction")]
    BadInstruction,
    #[error("vm not loaded")]
    NotLoaded,
    #[error("unknown syscall {0}")]
    UnknownSyscall(i32),
    #[error("integer divide by zero")]
    IntegerDivideByZero,
    #[error("out of fuel")]
    OutOfFuel,
    #[error("too many arguments: {0}")]
    TooManyArguments(usize),
}

impl Error {
    /// Returns the numeric code of this [`Error`].
    ///
    /// Codes are negative. `-1` through `-15` follow the classic QVM error table.
    pub fn code(self) -> i32 {
        match self {
            Self::InvalidPointer => -1,
            Self::FailedToLoadBytecode => -2,
            Self::NoSyscallCallback => -3,
            Self::FreeOnRunningVm => -4,
            Self::BlockCopyOutOfRange => -5,
            Self::ProgramCounterOutOfRange => -6,
            Self::InvalidJumpTarget => -7,
            Self::StackOverflow => -8,
            Self::StackMisaligned => -9,
            Self::Load4Misaligned => -10,
            Self::InterpreterStackError => -11,
            Self::DataOutOfRange => -12,
            Self::MallocFailed => -13,
            Self::BadInstruction => -14,
            Self::NotLoaded => -15,
            Self::UnknownSyscall(_) => -16,
            Self::IntegerDivideByZero => -17,
            Self::OutOfFuel => -18,
            Self::TooManyArguments(_) => -19,
        }
    }

    /// Returns `true` if the [`Vm`](crate::Vm) that reported this [`Error`] is still fully usable.
    pub fn is_recoverable(self) -> bool {
        matches!(self, Self::FreeOnRunningVm | Self::TooManyArguments(_))
    }
}
