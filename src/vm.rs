use crate::{
    code::Code,
    config::Config,
    error::Error,
    exec::{self, ARG_SLOT_COUNT},
    mem::DataSegment,
    module::{Header, Layout},
    syscall::{SyscallArgs, Syscalls},
};

/// A loaded QVM module, together with its sandboxed data segment.
///
/// A [`Vm`] owns its token stream and its data segment. Both are released by [`Vm::free`], or
/// when the [`Vm`] is dropped.
#[derive(Debug)]
pub struct Vm {
    name: String,
    header: Header,
    pub(crate) config: Config,
    pub(crate) code: Code,
    pub(crate) data: DataSegment,
    heap_ptr: u32,
    heap_end: u32,
    pub(crate) program_stack: u32,
    pub(crate) stack_bottom: u32,
    call_depth: u32,
    /// The number of instructions the outermost call in flight may still execute, if limited.
    pub(crate) fuel: Option<u64>,
    pub(crate) break_count: u32,
    last_error: Option<Error>,
    pub(crate) syscalls: Syscalls,
}

impl Vm {
    /// The maximum number of arguments that can be passed to [`Vm::call`], besides the command.
    pub const MAX_ARG_COUNT: usize = ARG_SLOT_COUNT - 1;

    /// Loads the given module image with the default [`Config`].
    ///
    /// # Errors
    ///
    /// If the image could not be loaded. See [`VmBuilder::load`].
    pub fn new(
        name: impl Into<String>,
        image: &[u8],
        syscalls: impl Fn(&mut Vm, &SyscallArgs) -> Result<i32, Error> + Send + Sync + 'static,
    ) -> Result<Self, Error> {
        VmBuilder::new(name).syscalls(syscalls).load(image)
    }

    /// Returns a [`VmBuilder`] for a [`Vm`] with the given name.
    pub fn builder(name: impl Into<String>) -> VmBuilder {
        VmBuilder::new(name)
    }

    /// Returns the name of this [`Vm`].
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the [`Header`] of the module image this [`Vm`] was loaded from.
    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the preprocessed [`Code`] of this [`Vm`].
    pub fn code(&self) -> &Code {
        &self.code
    }

    /// Returns the number of instructions in the module.
    pub fn instruction_count(&self) -> usize {
        self.code.instr_count()
    }

    /// Returns the [`DataSegment`] of this [`Vm`].
    pub fn data(&self) -> &DataSegment {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut DataSegment {
        &mut self.data
    }

    pub fn data_mask(&self) -> u32 {
        self.data.mask()
    }

    /// Translates a VM address to an offset into [`DataSegment::bytes`].
    pub fn translate(&self, addr: u32) -> usize {
        self.data.translate(addr)
    }

    /// Checks that both ends of the range `addr..addr + len` lie within the data segment. See
    /// [`DataSegment::validate_range`].
    ///
    /// # Errors
    ///
    /// If the range does not lie within the data segment.
    pub fn validate_range(&self, addr: u32, len: u32) -> Result<(), Error> {
        self.data.validate_range(addr, len)
    }

    /// Returns the current program stack pointer.
    pub fn program_stack(&self) -> u32 {
        self.program_stack
    }

    /// Returns the lowest address the program stack may grow down to.
    pub fn stack_bottom(&self) -> u32 {
        self.stack_bottom
    }

    /// Returns the number of calls into this [`Vm`] that are currently in flight.
    pub fn call_depth(&self) -> u32 {
        self.call_depth
    }

    pub fn is_interpreting(&self) -> bool {
        self.call_depth > 0
    }

    /// Returns the number of `BREAK` instructions executed so far.
    pub fn break_count(&self) -> u32 {
        self.break_count
    }

    /// Returns the last [`Error`] reported by this [`Vm`], if any.
    pub fn last_error(&self) -> Option<Error> {
        self.last_error
    }

    /// Returns `true` if this [`Vm`] has a module loaded, i.e. it has not been freed.
    pub fn is_loaded(&self) -> bool {
        !self.code.is_empty()
    }

    /// Calls into the module with the given command and arguments.
    ///
    /// The command is passed as the first argument of the module's entry point, followed by
    /// `args`. Calls may be nested: a syscall may call back into the same [`Vm`].
    ///
    /// # Errors
    ///
    /// - [`Error::NotLoaded`] if this [`Vm`] has been freed.
    /// - [`Error::TooManyArguments`] if more than [`Vm::MAX_ARG_COUNT`] arguments are given.
    /// - Any runtime error reported by the interpreter or by a syscall. The call is aborted, and
    ///   the error is recorded as [`Vm::last_error`].
    pub fn call(&mut self, command: i32, args: &[i32]) -> Result<i32, Error> {
        if !self.is_loaded() {
            return Err(self.fail(Error::NotLoaded));
        }
        if args.len() > Self::MAX_ARG_COUNT {
            return Err(self.fail(Error::TooManyArguments(args.len())));
        }
        let mut slots = [0; ARG_SLOT_COUNT];
        slots[0] = command;
        slots[1..=args.len()].copy_from_slice(args);

        // Nested calls draw from the budget of the outermost call.
        if self.call_depth == 0 {
            self.fuel = self.config.fuel;
        }
        self.call_depth += 1;
        let result = exec::call(self, &slots);
        self.call_depth -= 1;

        result.map_err(|error| {
            tracing::debug!(vm = %self.name, command, %error, "call aborted");
            self.fail(error)
        })
    }

    /// Allocates `size` bytes from the dynamic allocation region of the data segment. The region
    /// ends at the stack bottom at the latest.
    ///
    /// Returns the VM address of the allocated block, together with its bytes. Allocated memory
    /// is never reclaimed.
    ///
    /// # Errors
    ///
    /// - [`Error::NotLoaded`] if this [`Vm`] has been freed.
    /// - [`Error::MallocFailed`] if the dynamic allocation region is exhausted.
    pub fn malloc(&mut self, size: u32) -> Result<(u32, &mut [u8]), Error> {
        if !self.is_loaded() {
            return Err(self.fail(Error::NotLoaded));
        }
        let addr = self.heap_ptr;
        let end = match addr.checked_add(size) {
            Some(end) if end <= self.heap_end && self.data.validate_range(addr, size).is_ok() => end,
            _ => return Err(self.fail(Error::MallocFailed)),
        };
        self.heap_ptr = end;
        let bytes = self.data.slice_mut(addr, size)?;
        Ok((addr, bytes))
    }

    /// Releases the token stream and data segment of this [`Vm`].
    ///
    /// After this, every call returns [`Error::NotLoaded`].
    ///
    /// # Errors
    ///
    /// [`Error::FreeOnRunningVm`] if a call into this [`Vm`] is in flight. The [`Vm`] is left
    /// intact, and can be freed once the call returns.
    pub fn free(&mut self) -> Result<(), Error> {
        if self.call_depth != 0 {
            tracing::warn!(vm = %self.name, call_depth = self.call_depth, "free on running vm");
            return Err(self.fail(Error::FreeOnRunningVm));
        }
        self.code = Code::default();
        self.data.clear();
        self.heap_ptr = 0;
        self.heap_end = 0;
        self.program_stack = 0;
        self.stack_bottom = 0;
        Ok(())
    }

    fn fail(&mut self, error: Error) -> Error {
        self.last_error = Some(error);
        error
    }
}

/// A builder for a [`Vm`].
#[derive(Debug)]
pub struct VmBuilder {
    name: String,
    config: Config,
    syscalls: Option<Syscalls>,
}

impl VmBuilder {
    /// Creates a new [`VmBuilder`] for a [`Vm`] with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: Config::default(),
            syscalls: None,
        }
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Sets the closure that handles syscalls made by the module.
    pub fn syscalls(
        mut self,
        f: impl Fn(&mut Vm, &SyscallArgs) -> Result<i32, Error> + Send + Sync + 'static,
    ) -> Self {
        self.syscalls = Some(Syscalls::new(f));
        self
    }

    pub fn syscalls_shared(mut self, syscalls: Syscalls) -> Self {
        self.syscalls = Some(syscalls);
        self
    }

    /// Loads the given module image into a new [`Vm`].
    ///
    /// # Errors
    ///
    /// - [`Error::NoSyscallCallback`] if no syscall handler was set.
    /// - [`Error::FailedToLoadBytecode`] if the image or its header is malformed.
    /// - [`Error::MallocFailed`] if the data segment would be too large.
    /// - [`Error::BadInstruction`], [`Error::ProgramCounterOutOfRange`] or
    ///   [`Error::InvalidJumpTarget`] if the code section is malformed.
    #[tracing::instrument(level = "debug", skip(self, image), fields(name = %self.name, len = image.len()))]
    pub fn load(self, image: &[u8]) -> Result<Vm, Error> {
        let Some(syscalls) = self.syscalls else {
            tracing::warn!("no syscalls provided");
            return Err(Error::NoSyscallCallback);
        };
        let config = self.config;
        let header = Header::decode(image, &config)?;
        let layout = Layout::new(&header, &config)?;
        let code = Code::new(&image[header.code_range()], header.instruction_count as u32)?;
        let data = DataSegment::with_image(layout.size, &header, image);
        let program_stack = layout.size;
        tracing::debug!(
            instruction_count = header.instruction_count,
            data_mask = data.mask(),
            "loaded module"
        );
        Ok(Vm {
            name: self.name,
            header,
            config,
            code,
            data,
            heap_ptr: layout.heap_start,
            heap_end: layout.heap_end,
            program_stack,
            stack_bottom: layout.stack_bottom,
            call_depth: 0,
            fuel: None,
            break_count: 0,
            last_error: None,
            syscalls,
        })
    }
}
