#![no_main]

use {
    libfuzzer_sys::fuzz_target,
    makepad_qvm::{Config, Error, Vm},
};

fuzz_target!(|image: &[u8]| {
    let config = Config::default().with_fuel(Some(10_000));
    let Ok(mut vm) = Vm::builder("fuzz")
        .config(config)
        .syscalls(|_, args| Err(Error::UnknownSyscall(args.id())))
        .load(image)
    else {
        return;
    };
    let _ = vm.call(0, &[]);
    vm.free().unwrap();
    assert_eq!(vm.call(0, &[]), Err(Error::NotLoaded));
});
