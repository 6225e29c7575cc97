use {
    crate::{error::Error, mem::DataSegment, vm::Vm},
    std::{fmt, sync::Arc},
};

/// The host side of the syscall boundary.
///
/// A module invokes a syscall by calling a negative target. The [`Vm`] then calls the closure
/// wrapped by this [`Syscalls`] with a mutable reference to itself, so that the host can access
/// the data segment or call back into the module, and with the [`SyscallArgs`] read from the
/// caller's frame. The value returned by the closure is pushed onto the operand stack.
///
/// Syscall numbering is defined by the host. A host should reject a syscall it does not recognize,
/// typically with [`Error::UnknownSyscall`].
#[derive(Clone)]
pub struct Syscalls(Arc<SyscallFn>);

type SyscallFn = dyn Fn(&mut Vm, &SyscallArgs) -> Result<i32, Error> + Send + Sync;

impl Syscalls {
    /// Creates a new [`Syscalls`] that wraps the given closure.
    pub fn new(f: impl Fn(&mut Vm, &SyscallArgs) -> Result<i32, Error> + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub(crate) fn call(&self, vm: &mut Vm, args: &SyscallArgs) -> Result<i32, Error> {
        (self.0)(vm, args)
    }
}

impl fmt::Debug for Syscalls {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Syscalls").finish_non_exhaustive()
    }
}

/// The arguments of a syscall.
///
/// Arguments are always marshaled as 32-bit values, regardless of the width of a host pointer.
/// Arguments that are addresses must be translated with [`DataSegment::translate`] or one of the
/// other [`DataSegment`] methods before use.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct SyscallArgs {
    words: [i32; Self::WORD_COUNT],
}

impl SyscallArgs {
    /// The number of words read from the caller's frame: the syscall number and its arguments.
    pub const WORD_COUNT: usize = 16;

    /// The maximum number of arguments passed to a syscall.
    pub const MAX_ARG_COUNT: usize = Self::WORD_COUNT - 1;

    /// Creates a new [`SyscallArgs`] from the given syscall number and arguments.
    ///
    /// Missing arguments are zero. Arguments beyond [`SyscallArgs::MAX_ARG_COUNT`] are ignored.
    pub fn new(id: i32, args: &[i32]) -> Self {
        let mut words = [0; Self::WORD_COUNT];
        words[0] = id;
        for (word, arg) in words[1..].iter_mut().zip(args) {
            *word = *arg;
        }
        Self { words }
    }

    /// Reads a [`SyscallArgs`] from the given address in the data segment.
    pub(crate) fn read(data: &DataSegment, addr: u32) -> Self {
        let mut words = [0; Self::WORD_COUNT];
        for (idx, word) in words.iter_mut().enumerate() {
            *word = data.read_i32(addr.wrapping_add(4 * idx as u32));
        }
        Self { words }
    }

    /// Returns the syscall number.
    ///
    /// A call to target `-1` is syscall `0`, a call to target `-2` is syscall `1`, and so on.
    pub fn id(&self) -> i32 {
        self.words[0]
    }

    /// Returns the argument with the given index, or `0` if the index is out of range.
    pub fn arg(&self, idx: usize) -> i32 {
        self.args().get(idx).copied().unwrap_or(0)
    }

    /// Returns the argument with the given index as a VM address.
    pub fn addr(&self, idx: usize) -> u32 {
        self.arg(idx) as u32
    }

    /// Returns the argument with the given index, reinterpreted as an `f32`.
    pub fn f32(&self, idx: usize) -> f32 {
        f32::from_bits(self.addr(idx))
    }

    /// Returns all arguments.
    pub fn args(&self) -> &[i32] {
        &self.words[1..]
    }
}
