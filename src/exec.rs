//! Types and functions for executing a token stream.

use crate::{
    code::{Code, Token},
    error::Error,
    instr::Opcode,
    ops::*,
    syscall::SyscallArgs,
    vm::Vm,
};

/// The value written to the bottom of the operand stack, to detect stack corruption.
const CANARY: i32 = 0x0000BEEF;

/// The number of argument slots in the frame of a top-level call.
pub(crate) const ARG_SLOT_COUNT: usize = 13;

/// The size of the frame of a top-level call: the return address sentinel, a dummy word, and the
/// argument slots.
const ENTRY_FRAME_SIZE: u32 = 8 + 4 * ARG_SLOT_COUNT as u32;

/// The return address that ends a top-level call.
const RETURN_TO_HOST: i32 = -1;

/// A 32-bit value that can be stored in an operand stack cell.
pub(crate) trait Cell: Copy {
    fn from_cell(cell: i32) -> Self;

    fn into_cell(self) -> i32;
}

impl Cell for i32 {
    fn from_cell(cell: i32) -> Self {
        cell
    }

    fn into_cell(self) -> i32 {
        self
    }
}

impl Cell for u32 {
    fn from_cell(cell: i32) -> Self {
        cell as u32
    }

    fn into_cell(self) -> i32 {
        self as i32
    }
}

// Floats are reinterpreted, not converted.
impl Cell for f32 {
    fn from_cell(cell: i32) -> Self {
        f32::from_bits(cell as u32)
    }

    fn into_cell(self) -> i32 {
        self.to_bits() as i32
    }
}

/// Executes a top-level call into the module of the given [`Vm`].
///
/// `args` are written to the argument slots of the entry frame. The first slot holds the command.
pub(crate) fn call(vm: &mut Vm, args: &[i32; ARG_SLOT_COUNT]) -> Result<i32, Error> {
    let stack_on_entry = vm.program_stack;
    let program_stack = stack_on_entry.wrapping_sub(ENTRY_FRAME_SIZE);
    // Bounds the depth of nested calls made by syscalls.
    if vm.config.check_stack && (program_stack < vm.stack_bottom || program_stack > stack_on_entry)
    {
        return Err(Error::StackOverflow);
    }
    let mut exec = Exec::new(program_stack);
    for (idx, arg) in args.iter().copied().enumerate() {
        vm.data
            .write_i32(exec.program_stack.wrapping_add(8 + 4 * idx as u32), arg);
    }
    vm.data.write_i32(exec.program_stack.wrapping_add(4), 0);
    vm.data.write_i32(exec.program_stack, RETURN_TO_HOST);

    let result = exec.run(vm);
    vm.program_stack = stack_on_entry;
    result?;

    if exec.op_stack_ofs != 1 || exec.op_stack[0] != CANARY {
        tracing::debug!(
            op_stack_ofs = exec.op_stack_ofs,
            canary = exec.op_stack[0],
            "operand stack corrupted"
        );
        return Err(Error::InterpreterStackError);
    }
    Ok(exec.top())
}

fn consume_fuel(vm: &mut Vm) -> Result<(), Error> {
    if let Some(fuel) = &mut vm.fuel {
        if *fuel == 0 {
            return Err(Error::OutOfFuel);
        }
        *fuel -= 1;
    }
    Ok(())
}

/// The state of a single top-level call.
#[derive(Debug)]
struct Exec {
    /// The offset of the next token to execute.
    pc: usize,
    /// The operand stack.
    op_stack: [i32; 256],
    /// The index of the top of the operand stack. Wraps around modulo 256.
    op_stack_ofs: u8,
    /// The address of the current frame in the data segment. Grows downwards.
    program_stack: u32,
}

impl Exec {
    fn new(program_stack: u32) -> Self {
        let mut op_stack = [0; 256];
        op_stack[0] = CANARY;
        Self {
            pc: 0,
            op_stack,
            op_stack_ofs: 0,
            program_stack,
        }
    }

    /// Runs the dispatch loop until the outermost frame returns to the host.
    fn run(&mut self, vm: &mut Vm) -> Result<(), Error> {
        loop {
            consume_fuel(vm)?;
            let opcode = self.fetch(&vm.code)?;
            match opcode {
                Opcode::Undef => return Err(Error::BadInstruction),
                Opcode::Ignore => {}
                Opcode::Break => vm.break_count = vm.break_count.wrapping_add(1),

                Opcode::Enter => {
                    let frame_size = self.read_imm(&vm.code)?;
                    self.program_stack = self.program_stack.wrapping_sub(frame_size as u32);
                    if vm.config.check_stack {
                        self.check_program_stack(vm)?;
                    }
                }
                Opcode::Leave => {
                    let frame_size = self.read_imm(&vm.code)?;
                    self.program_stack = self.program_stack.wrapping_add(frame_size as u32);
                    let return_pc = vm.data.read_i32(self.program_stack);
                    if return_pc == RETURN_TO_HOST {
                        return Ok(());
                    }
                    self.jump(&vm.code, return_pc)?;
                }
                Opcode::Call => self.call(vm)?,
                Opcode::Push => self.op_stack_ofs = self.op_stack_ofs.wrapping_add(1),
                Opcode::Pop => self.op_stack_ofs = self.op_stack_ofs.wrapping_sub(1),

                Opcode::Const => {
                    let val = self.read_imm(&vm.code)?;
                    self.push(val);
                }
                Opcode::Local => {
                    let offset = self.read_imm(&vm.code)?;
                    self.push(offset.wrapping_add(self.program_stack as i32));
                }

                Opcode::Jump => {
                    let instr_idx = self.pop();
                    self.pc = u32::try_from(instr_idx)
                        .ok()
                        .and_then(|instr_idx| vm.code.instr_offset(instr_idx))
                        .ok_or(Error::ProgramCounterOutOfRange)?;
                }

                Opcode::Eq => self.branch::<i32, Eq>(&vm.code)?,
                Opcode::Ne => self.branch::<i32, Ne>(&vm.code)?,
                Opcode::Lti => self.branch::<i32, Lt>(&vm.code)?,
                Opcode::Lei => self.branch::<i32, Le>(&vm.code)?,
                Opcode::Gti => self.branch::<i32, Gt>(&vm.code)?,
                Opcode::Gei => self.branch::<i32, Ge>(&vm.code)?,
                Opcode::Ltu => self.branch::<u32, Lt>(&vm.code)?,
                Opcode::Leu => self.branch::<u32, Le>(&vm.code)?,
                Opcode::Gtu => self.branch::<u32, Gt>(&vm.code)?,
                Opcode::Geu => self.branch::<u32, Ge>(&vm.code)?,
                Opcode::Eqf => self.branch::<f32, Eq>(&vm.code)?,
                Opcode::Nef => self.branch::<f32, Ne>(&vm.code)?,
                Opcode::Ltf => self.branch::<f32, Lt>(&vm.code)?,
                Opcode::Lef => self.branch::<f32, Le>(&vm.code)?,
                Opcode::Gtf => self.branch::<f32, Gt>(&vm.code)?,
                Opcode::Gef => self.branch::<f32, Ge>(&vm.code)?,

                Opcode::Load1 => {
                    let addr = self.top() as u32;
                    self.set_top(i32::from(vm.data.read_u8(addr)));
                }
                Opcode::Load2 => {
                    let addr = self.top() as u32;
                    self.set_top(i32::from(vm.data.read_u16(addr)));
                }
                Opcode::Load4 => {
                    let addr = self.top() as u32;
                    self.set_top(vm.data.read_i32(addr));
                }
                Opcode::Store1 => {
                    let val = self.pop();
                    let addr = self.pop() as u32;
                    vm.data.write_u8(addr, val as u8);
                }
                Opcode::Store2 => {
                    let val = self.pop();
                    let addr = self.pop() as u32;
                    vm.data.write_u16(addr, val as u16);
                }
                Opcode::Store4 => {
                    let val = self.pop();
                    let addr = self.pop() as u32;
                    vm.data.write_i32(addr, val);
                }
                Opcode::Arg => {
                    let offset = self.read_imm(&vm.code)?;
                    let val = self.pop();
                    vm.data
                        .write_i32(self.program_stack.wrapping_add(offset as u32), val);
                }

                Opcode::BlockCopy => {
                    let len = self.read_imm(&vm.code)?;
                    let src = self.pop() as u32;
                    let dst = self.pop() as u32;
                    vm.data.block_copy(dst, src, len as u32)?;
                }

                Opcode::Sex8 => self.un_op::<i32, SignExtendFrom<i8>>()?,
                Opcode::Sex16 => self.un_op::<i32, SignExtendFrom<i16>>()?,

                Opcode::Negi => self.un_op::<i32, Neg>()?,
                Opcode::Add => self.bin_op::<i32, Add>()?,
                Opcode::Sub => self.bin_op::<i32, Sub>()?,
                Opcode::Divi => self.bin_op::<i32, Div>()?,
                Opcode::Divu => self.bin_op::<u32, Div>()?,
                Opcode::Modi => self.bin_op::<i32, Rem>()?,
                Opcode::Modu => self.bin_op::<u32, Rem>()?,
                Opcode::Muli => self.bin_op::<i32, Mul>()?,
                Opcode::Mulu => self.bin_op::<u32, Mul>()?,

                Opcode::Band => self.bin_op::<u32, And>()?,
                Opcode::Bor => self.bin_op::<u32, Or>()?,
                Opcode::Bxor => self.bin_op::<u32, Xor>()?,
                Opcode::Bcom => self.un_op::<u32, Not>()?,

                Opcode::Lsh => self.bin_op::<i32, Shl>()?,
                Opcode::Rshi => self.bin_op::<i32, Shr>()?,
                Opcode::Rshu => self.bin_op::<u32, Shr>()?,

                Opcode::Negf => self.un_op::<f32, Neg>()?,
                Opcode::Addf => self.bin_op::<f32, Add>()?,
                Opcode::Subf => self.bin_op::<f32, Sub>()?,
                Opcode::Divf => self.bin_op::<f32, Div>()?,
                Opcode::Mulf => self.bin_op::<f32, Mul>()?,

                Opcode::Cvif => self.un_op::<i32, ConvertTo<f32>>()?,
                Opcode::Cvfi => self.un_op::<f32, TruncTo<i32>>()?,
            }
        }
    }

    /// Executes a `CALL` instruction.
    ///
    /// The return address is saved at the bottom of the current frame. A negative target is a
    /// syscall, which is handled by the host and returns immediately.
    fn call(&mut self, vm: &mut Vm) -> Result<(), Error> {
        vm.data.write_i32(self.program_stack, self.pc as Token);
        let target = self.pop();
        if target < 0 {
            let id = -1 - target;
            // Nested calls made by the host start below the current frame.
            vm.program_stack = self.program_stack.wrapping_sub(4);
            vm.data.write_i32(self.program_stack.wrapping_add(4), id);
            let args = SyscallArgs::read(&vm.data, self.program_stack.wrapping_add(4));
            tracing::trace!(id, args = ?args.args(), "syscall");
            let syscalls = vm.syscalls.clone();
            let result = syscalls.call(vm, &args)?;
            self.push(result);
            let return_pc = vm.data.read_i32(self.program_stack);
            self.jump(&vm.code, return_pc)
        } else {
            self.pc = vm
                .code
                .instr_offset(target as u32)
                .ok_or(Error::ProgramCounterOutOfRange)?;
            Ok(())
        }
    }

    /// Executes a conditional branch, comparing the top two cells of the operand stack.
    fn branch<T, B>(&mut self, code: &Code) -> Result<(), Error>
    where
        T: Cell,
        B: BinOp<T, Output = bool>,
    {
        let target = self.read_imm(code)?;
        let x1 = T::from_cell(self.pop());
        let x0 = T::from_cell(self.pop());
        if B::bin_op(x0, x1)? {
            self.pc = target as u32 as usize;
        }
        Ok(())
    }

    fn un_op<T, U>(&mut self) -> Result<(), Error>
    where
        T: Cell,
        U: UnOp<T>,
        U::Output: Cell,
    {
        let x = T::from_cell(self.top());
        self.set_top(U::un_op(x)?.into_cell());
        Ok(())
    }

    fn bin_op<T, B>(&mut self) -> Result<(), Error>
    where
        T: Cell,
        B: BinOp<T>,
        B::Output: Cell,
    {
        let x1 = T::from_cell(self.pop());
        let x0 = T::from_cell(self.top());
        self.set_top(B::bin_op(x0, x1)?.into_cell());
        Ok(())
    }

    /// Sets the program counter to a return address read from the data segment.
    fn jump(&mut self, code: &Code, pc: i32) -> Result<(), Error> {
        match usize::try_from(pc) {
            Ok(pc) if pc < code.tokens().len() => {
                self.pc = pc;
                Ok(())
            }
            _ => Err(Error::ProgramCounterOutOfRange),
        }
    }

    fn check_program_stack(&self, vm: &Vm) -> Result<(), Error> {
        if self.program_stack < vm.stack_bottom || self.program_stack > vm.data.size() {
            return Err(Error::StackOverflow);
        }
        if self.program_stack % 4 != 0 {
            return Err(Error::StackMisaligned);
        }
        Ok(())
    }

    #[inline]
    fn fetch(&mut self, code: &Code) -> Result<Opcode, Error> {
        let token = code.token(self.pc).ok_or(Error::ProgramCounterOutOfRange)?;
        self.pc += 1;
        Opcode::from_token(token).ok_or(Error::BadInstruction)
    }

    #[inline]
    fn read_imm(&mut self, code: &Code) -> Result<Token, Error> {
        let token = code.token(self.pc).ok_or(Error::ProgramCounterOutOfRange)?;
        self.pc += 1;
        Ok(token)
    }

    #[inline]
    fn top(&self) -> i32 {
        self.op_stack[usize::from(self.op_stack_ofs)]
    }

    #[inline]
    fn set_top(&mut self, val: i32) {
        self.op_stack[usize::from(self.op_stack_ofs)] = val;
    }

    #[inline]
    fn push(&mut self, val: i32) {
        self.op_stack_ofs = self.op_stack_ofs.wrapping_add(1);
        self.set_top(val);
    }

    #[inline]
    fn pop(&mut self) -> i32 {
        let val = self.top();
        self.op_stack_ofs = self.op_stack_ofs.wrapping_sub(1);
        val
    }
}
