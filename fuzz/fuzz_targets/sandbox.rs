#![no_main]

use {
    libfuzzer_sys::fuzz_target,
    makepad_qvm::{Config, Error, Header, Vm, MAGIC},
};

// Wraps arbitrary bytes in a valid header, so that most inputs get past the loader and exercise
// the interpreter.
fuzz_target!(|code: &[u8]| {
    if code.len() < 2 {
        return;
    }
    let code_len = code.len() as i32 - 1;
    let instruction_count = (i32::from(code[0]) + 1).min(code_len);
    let code = &code[1..];
    let code_offset = Header::SIZE as i32;
    let header = [
        MAGIC,
        instruction_count,
        code_offset,
        code.len() as i32,
        code_offset + code.len() as i32,
        0,
        0,
        64,
    ];
    let mut image = Vec::with_capacity(Header::SIZE + code.len());
    for field in header {
        image.extend_from_slice(&field.to_le_bytes());
    }
    image.extend_from_slice(code);

    let config = Config::default()
        .with_heap_reserve(0x1000)
        .with_stack_size(0x800)
        .with_fuel(Some(100_000));
    let Ok(mut vm) = Vm::builder("fuzz")
        .config(config)
        .syscalls(|vm, args| match args.id() {
            0 => Ok(vm.data().read_c_str(args.addr(0)).len() as i32),
            1 => vm.call(args.arg(0), &[]),
            id => Err(Error::UnknownSyscall(id)),
        })
        .load(&image)
    else {
        return;
    };
    let size = vm.data().size();
    let _ = vm.call(0, &[1, 2, 3]);
    assert_eq!(vm.call_depth(), 0);
    assert_eq!(vm.program_stack(), size);
    assert_eq!(vm.data().bytes().len(), size as usize + 4);
});
