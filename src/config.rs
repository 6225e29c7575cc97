/// Configuration for loading and running a [`Vm`](crate::Vm).
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Config {
    /// The number of bytes reserved for [`Vm::malloc`](crate::Vm::malloc), on top of the data,
    /// literal and bss sections.
    pub heap_reserve: u32,
    /// The number of bytes between the top of the data segment and the stack bottom.
    pub stack_size: u32,
    /// The maximum size of a module image in bytes.
    pub max_image_size: usize,
    /// The maximum length of the bss section in bytes.
    pub max_bss_length: u32,
    /// Whether `ENTER` checks the program stack against the stack bottom and its alignment.
    pub check_stack: bool,
    /// The maximum number of instructions a top-level call may execute, if any. Calls made by
    /// syscalls draw from the budget of the call that made the syscall.
    pub fuel: Option<u64>,
}

impl Config {
    pub const DEFAULT_HEAP_RESERVE: u32 = 150 * 1024;
    pub const DEFAULT_STACK_SIZE: u32 = 0x10000;
    pub const DEFAULT_MAX_IMAGE_SIZE: usize = 0x400000;
    pub const DEFAULT_MAX_BSS_LENGTH: u32 = 10 * 1024 * 1024;

    /// Creates a new [`Config`] with default values.
    pub fn new() -> Self {
        Self {
            heap_reserve: Self::DEFAULT_HEAP_RESERVE,
            stack_size: Self::DEFAULT_STACK_SIZE,
            max_image_size: Self::DEFAULT_MAX_IMAGE_SIZE,
            max_bss_length: Self::DEFAULT_MAX_BSS_LENGTH,
            check_stack: true,
            fuel: None,
        }
    }

    pub fn with_heap_reserve(mut self, heap_reserve: u32) -> Self {
        self.heap_reserve = heap_reserve;
        self
    }

    pub fn with_stack_size(mut self, stack_size: u32) -> Self {
        self.stack_size = stack_size;
        self
    }

    pub fn with_max_image_size(mut self, max_image_size: usize) -> Self {
        self.max_image_size = max_image_size;
        self
    }

    pub fn with_max_bss_length(mut self, max_bss_length: u32) -> Self {
        self.max_bss_length = max_bss_length;
        self
    }

    /// Enables or disables the program stack checks performed by `ENTER`.
    ///
    /// With the checks disabled, a module that overruns its stack silently wraps around the data
    /// segment instead.
    pub fn with_check_stack(mut self, check_stack: bool) -> Self {
        self.check_stack = check_stack;
        self
    }

    pub fn with_fuel(mut self, fuel: Option<u64>) -> Self {
        self.fuel = fuel;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
