mod asm;
mod code;
mod config;
mod decode;
mod error;
mod exec;
mod instr;
mod mem;
mod module;
mod ops;
mod syscall;
mod vm;

pub use self::{
    asm::{Assembler, Label},
    code::{Code, Token},
    config::Config,
    error::Error,
    instr::{ImmKind, Opcode},
    mem::DataSegment,
    module::{Header, MAGIC},
    syscall::{SyscallArgs, Syscalls},
    vm::{Vm, VmBuilder},
};
