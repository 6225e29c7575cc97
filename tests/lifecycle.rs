use {
    makepad_qvm::{Assembler, Config, Error, Opcode, Vm},
    std::sync::{Arc, Mutex},
};

fn minimal() -> Assembler {
    let mut asm = Assembler::new();
    asm.enter(8).local(16).op(Opcode::Load4).leave(8);
    asm
}

fn load(asm: &Assembler) -> Vm {
    Vm::new("test", &asm.finish(), |_, args| Err(Error::UnknownSyscall(args.id()))).unwrap()
}

#[test]
fn test_create_and_free() {
    let mut vm = load(&minimal());
    assert_eq!(vm.call(3, &[]), Ok(3));
    assert_eq!(vm.free(), Ok(()));
    assert!(!vm.is_loaded());
    assert_eq!(vm.call(3, &[]), Err(Error::NotLoaded));
    assert_eq!(vm.last_error(), Some(Error::NotLoaded));
    assert_eq!(vm.malloc(4).unwrap_err(), Error::NotLoaded);
    assert_eq!(vm.free(), Ok(()));
    assert_eq!(vm.instruction_count(), 0);
    assert_eq!(vm.data().size(), 1);
}

#[test]
fn test_free_during_syscall() {
    let mut asm = Assembler::new();
    asm.enter(8).syscall(0).leave(8);
    let errors = Arc::new(Mutex::new(Vec::new()));
    let mut vm = Vm::new("test", &asm.finish(), {
        let errors = errors.clone();
        move |vm, _| {
            let error = vm.free().unwrap_err();
            assert!(vm.is_loaded());
            errors.lock().unwrap().push(error);
            Ok(error.code())
        }
    })
    .unwrap();
    assert_eq!(vm.call(0, &[]), Ok(-4));
    assert_eq!(*errors.lock().unwrap(), [Error::FreeOnRunningVm]);
    assert!(Error::FreeOnRunningVm.is_recoverable());
    assert_eq!(vm.call(0, &[]), Ok(-4));
    assert_eq!(vm.free(), Ok(()));
    assert_eq!(vm.call(0, &[]), Err(Error::NotLoaded));
}

#[test]
fn test_free_during_nested_call() {
    let mut asm = Assembler::new();
    let inner = asm.new_label();
    asm.enter(16)
        .local(24)
        .op(Opcode::Load4)
        .const_(1)
        .branch(Opcode::Eq, inner)
        .syscall(0)
        .leave(16)
        .bind(inner)
        .syscall(1)
        .leave(16);
    let mut vm = Vm::new("test", &asm.finish(), |vm, args| match args.id() {
        0 => vm.call(1, &[]),
        1 => {
            assert_eq!(vm.call_depth(), 2);
            Ok(vm.free().map_or_else(Error::code, |_| 0))
        }
        id => Err(Error::UnknownSyscall(id)),
    })
    .unwrap();
    assert_eq!(vm.call(0, &[]), Ok(Error::FreeOnRunningVm.code()));
    assert_eq!(vm.call_depth(), 0);
    assert!(vm.free().is_ok());
}

#[test]
fn test_malloc() {
    let mut vm = load(&minimal());
    let (addr_0, bytes) = vm.malloc(16).unwrap();
    assert_eq!(bytes, [0; 16]);
    bytes.fill(0xAB);
    assert_eq!(addr_0, 16);
    let (addr_1, _) = vm.malloc(4).unwrap();
    assert_eq!(addr_1, 32);
    assert_eq!(vm.data().read_u8(addr_0 + 15), 0xAB);
    assert_eq!(vm.data().read_u8(addr_1), 0);
}

#[test]
fn test_malloc_after_data() {
    let mut asm = minimal();
    asm.data_word(1);
    asm.lit_str("abc");
    asm.bss(8);
    let mut vm = load(&asm);
    let (addr, _) = vm.malloc(1).unwrap();
    assert_eq!(addr, 4 + 4 + 8 + 16);
}

#[test]
fn test_malloc_exhausted() {
    let mut vm = load(&minimal());
    let reserve = Config::DEFAULT_HEAP_RESERVE;
    assert_eq!(vm.malloc(reserve + 1).unwrap_err(), Error::MallocFailed);
    assert_eq!(vm.last_error(), Some(Error::MallocFailed));
    assert!(vm.malloc(reserve).is_ok());
    assert_eq!(vm.malloc(1).unwrap_err(), Error::MallocFailed);
    assert_eq!(vm.malloc(u32::MAX).unwrap_err(), Error::MallocFailed);
    assert!(vm.malloc(0).is_ok());
}

#[test]
fn test_malloc_does_not_overlap_stack() {
    let mut vm = load(&minimal());
    let reserve = Config::DEFAULT_HEAP_RESERVE;
    let (addr, bytes) = vm.malloc(reserve).unwrap();
    bytes.fill(0xFF);
    assert!(addr + reserve <= vm.stack_bottom());
    assert_eq!(vm.call(9, &[]), Ok(9));

    let mut asm = minimal();
    asm.bss(100 * 1024);
    let mut vm = load(&asm);
    assert_eq!(vm.data().size(), 0x40000);
    assert_eq!(vm.stack_bottom(), 0x30000);
    assert_eq!(vm.malloc(150 * 1024).unwrap_err(), Error::MallocFailed);
    let (addr, bytes) = vm.malloc(1024).unwrap();
    bytes.fill(0xFF);
    let rest = vm.stack_bottom() - (addr + 1024);
    let (addr, bytes) = vm.malloc(rest).unwrap();
    bytes.fill(0xFF);
    assert_eq!(addr + rest, vm.stack_bottom());
    assert_eq!(vm.malloc(1).unwrap_err(), Error::MallocFailed);
    assert_eq!(vm.call(9, &[]), Ok(9));
}

#[test]
fn test_error_codes() {
    let errors = [
        Error::InvalidPointer,
        Error::FailedToLoadBytecode,
        Error::NoSyscallCallback,
        Error::FreeOnRunningVm,
        Error::BlockCopyOutOfRange,
        Error::ProgramCounterOutOfRange,
        Error::InvalidJumpTarget,
        Error::StackOverflow,
        Error::StackMisaligned,
        Error::Load4Misaligned,
        Error::InterpreterStackError,
        Error::DataOutOfRange,
        Error::MallocFailed,
        Error::BadInstruction,
        Error::NotLoaded,
    ];
    for (idx, error) in errors.into_iter().enumerate() {
        assert_eq!(error.code(), -1 - idx as i32, "{}", error);
    }
    assert_eq!(Error::UnknownSyscall(9).to_string(), "unknown syscall 9");
    assert_eq!(Error::IntegerDivideByZero.code(), -17);
    assert_eq!(Error::OutOfFuel.code(), -18);
    assert_eq!(Error::TooManyArguments(20).code(), -19);
    assert!(!Error::BadInstruction.is_recoverable());
}

#[test]
fn test_config() {
    let config = Config::default();
    assert_eq!(config.heap_reserve, 150 * 1024);
    assert_eq!(config.stack_size, 0x10000);
    assert_eq!(config.max_image_size, 0x400000);
    assert_eq!(config.max_bss_length, 10 * 1024 * 1024);
    assert!(config.check_stack);
    assert_eq!(config.fuel, None);

    let config = Config::new().with_stack_size(0x1000).with_fuel(Some(5));
    let vm = Vm::builder("test")
        .config(config)
        .syscalls(|_, _| Ok(0))
        .load(&minimal().finish())
        .unwrap();
    assert_eq!(vm.config(), &config);
    assert_eq!(vm.stack_bottom(), vm.data().size() - 0x1000);
}
