#![no_std]

#![cfg_attr(
    not(test),
    deny(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::todo,
        clippy::unimplemented,
        clippy::indexing_slicing,
        clippy::string_slice,
        clippy::arithmetic_side_effects,
        clippy::panicking_unwrap,
        clippy::out_of_bounds_indexing,
        clippy::panic_in_result_fn,
        clippy::unwrap_in_result,
    )
)]
#![cfg_attr(not(test), warn(clippy::missing_panics_doc))]

//! A small register machine.
//!
//! Source text is compiled by the two-pass [`assembler`] into flat bytecode.
//! The bytecode is copied into [`Memory`] at [`STORED_SIZE`], the start of
//! the code segment, and run by a [`Cpu`] until it halts or faults.
//!
//! The machine has four 16 bit registers, a comparison flags register, a
//! bounded [`Stack`] of words and 64KiB of memory. The first [`STORED_SIZE`]
//! bytes are the data segment that load/store instructions work on.
//!
//! ```
//! use byte_machine::{assemble_source, execute, Memory};
//!
//! let bytecode = assemble_source("LOAD R0 42\nLOAD R1 10\nADD R0 R1\nHLT").unwrap();
//! let mut memory = Memory::new();
//! memory.load_code(&bytecode).unwrap();
//! let mut out = String::new();
//! let cpu = execute(&mut memory, &mut out).unwrap();
//! assert_eq!(cpu.registers()[0], 52);
//! ```

extern crate alloc;

use core::fmt::Write;
use core::mem::transmute;
use serde::Serialize;
use thiserror_no_std::Error;
use variant_count::VariantCount;

pub mod assembler;
pub mod disasm;
pub mod isa;
pub mod memory;
pub mod stack;


pub use assembler::{AssemblerError, AssemblerErrorKind, assemble, assemble_source};
pub use memory::Memory;
pub use stack::Stack;

/// Register, stack and immediate width.
pub type Word = u16;

pub const TOTAL_SIZE: usize = 65536;
/// Size of the data segment; the code segment starts here.
pub const STORED_SIZE: usize = 2048;
pub const CODE_SIZE: usize = TOTAL_SIZE - STORED_SIZE;
pub const STACK_CAPACITY: usize = 256;
pub const REGISTER_COUNT: usize = 4;

#[repr(u8)]
#[derive(VariantCount, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Opcode {
    Halt,
    Nop,
    LoadImm,
    Move,
    LoadByte,
    LoadByteIndirect,
    LoadWord,
    LoadWordIndirect,
    StoreByte,
    StoreByteIndirect,
    StoreByteImm,
    StoreByteImmIndirect,
    StoreWord,
    StoreWordIndirect,
    StoreWordImm,
    Add,
    AddImm,
    Subtract,
    SubtractImm,
    Multiply,
    MultiplyImm,
    Divide,
    DivideImm,
    Mod,
    ModImm,
    And,
    AndImm,
    Or,
    OrImm,
    Xor,
    XorImm,
    Not,
    ShiftLeft,
    ShiftRight,
    Increment,
    Decrement,
    Compare,
    CompareImm,
    Jump,
    JumpIndirect,
    JumpEqual,
    JumpEqualIndirect,
    JumpNotEqual,
    JumpNotEqualIndirect,
    JumpGreater,
    JumpGreaterIndirect,
    JumpGreaterEqual,
    JumpGreaterEqualIndirect,
    JumpLess,
    JumpLessIndirect,
    JumpLessEqual,
    JumpLessEqualIndirect,
    Call,
    CallIndirect,
    Return,
    Push,
    PushImm,
    Pop,
    PopRegister,
    Print,
    PrintImm,
    PrintString,
    PrintStringIndirect,
}

impl From<Opcode> for u8 {
    fn from(op: Opcode) -> u8 {
        op as u8
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("byte {0} is not an opcode")]
pub struct InvalidOpcode(pub u8);

impl TryFrom<u8> for Opcode {
    type Error = InvalidOpcode;
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if usize::from(value) >= Opcode::VARIANT_COUNT {
            return Err(InvalidOpcode(value));
        }

        // SAFETY: Opcode is `repr(u8)` with implicit discriminants starting
        // at zero, and the value was just checked to be in range.
        let op = unsafe { transmute::<u8, Self>(value) };
        Ok(op)
    }
}

/// A condition that stops the machine. None of these are recoverable: once
/// one is returned the run is over.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MachineFault {
    #[error("address {0} is out of memory bounds")]
    OutOfBounds(usize),
    #[error("address {0} is out of the data segment")]
    StoredOutOfBounds(usize),
    #[error("{0} bytes of code do not fit in the code segment")]
    CodeTooLarge(usize),
    #[error("attempted operation would overflow the stack")]
    StackOverflow,
    #[error("attempted operation would underflow the stack")]
    StackUnderflow,
    #[error("byte {opcode} at {pc} is not a valid opcode")]
    UnknownOpcode { opcode: u8, pc: usize },
    #[error("byte {register} at {pc} does not name a register")]
    InvalidRegister { register: u8, pc: usize },
    #[error("division by zero in instruction at {0}")]
    DivideByZero(usize),
    #[error("return address {0} does not fit in a word")]
    ReturnAddressOverflow(usize),
    #[error("writing to the console failed")]
    ConsoleWrite,
}

/// The comparison flags. `CMP` sets exactly one of the three bits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Flags(u8);

impl Flags {
    pub const EQUAL: u8 = 0b001;
    pub const GREATER: u8 = 0b010;
    pub const LESS: u8 = 0b100;

    pub fn compare(lhs: Word, rhs: Word) -> Self {
        match lhs.cmp(&rhs) {
            core::cmp::Ordering::Equal => Flags(Self::EQUAL),
            core::cmp::Ordering::Greater => Flags(Self::GREATER),
            core::cmp::Ordering::Less => Flags(Self::LESS),
        }
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    /// True if any bit of `mask` is set.
    pub fn any(self, mask: u8) -> bool {
        self.0 & mask != 0
    }

    pub fn equal(self) -> bool {
        self.any(Self::EQUAL)
    }

    pub fn greater(self) -> bool {
        self.any(Self::GREATER)
    }

    pub fn less(self) -> bool {
        self.any(Self::LESS)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    Continue,
    Halted,
}

/// Machine state after (or during) a run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub registers: [Word; REGISTER_COUNT],
    pub flags: u8,
    pub pc: usize,
    pub stack_depth: usize,
}

#[derive(Debug, Default)]
pub struct Cpu {
    registers: [Word; REGISTER_COUNT],
    flags: Flags,
    pc: usize,
    stack: Stack,
}

impl Cpu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registers(&self) -> &[Word; REGISTER_COUNT] {
        &self.registers
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            registers: self.registers,
            flags: self.flags.bits(),
            pc: self.pc,
            stack_depth: self.stack.len(),
        }
    }

    /// Clears registers, flags and stack and points the PC at the code
    /// segment.
    pub fn reset(&mut self) {
        self.registers = [0; REGISTER_COUNT];
        self.flags = Flags::default();
        self.pc = STORED_SIZE;
        self.stack.clear();
    }

    /// Runs the program loaded in `memory` from the start of the code
    /// segment until `HLT` or the first fault.
    pub fn execute<W: Write>(
        &mut self,
        memory: &mut Memory,
        console: &mut W,
    ) -> Result<(), MachineFault> {
        self.reset();
        loop {
            match self.step(memory, console) {
                Ok(Step::Continue) => {}
                Ok(Step::Halted) => {
                    tracing::debug!(pc = self.pc, registers = ?self.registers, "halted");
                    return Ok(());
                }
                Err(fault) => {
                    tracing::warn!(pc = self.pc, %fault, "machine fault");
                    return Err(fault);
                }
            }
        }
    }

    /// Executes the instruction at the PC.
    pub fn step<W: Write>(
        &mut self,
        memory: &mut Memory,
        console: &mut W,
    ) -> Result<Step, MachineFault> {
        let at = self.pc;
        let byte = self.fetch_byte(memory)?;
        let op = Opcode::try_from(byte)
            .map_err(|_| MachineFault::UnknownOpcode { opcode: byte, pc: at })?;
        tracing::trace!(pc = at, ?op, "step");

        match op {
            Opcode::Halt => return Ok(Step::Halted),
            Opcode::Nop => {}
            Opcode::LoadImm => {
                let register = self.fetch_register(memory)?;
                let value = self.fetch_word(memory)?;
                self.set_register(register, value)?;
            }
            Opcode::Move => {
                let (dst, src) = self.fetch_register_pair(memory)?;
                let value = self.register(src)?;
                self.set_register(dst, value)?;
            }
            Opcode::LoadByte => {
                let register = self.fetch_register(memory)?;
                let address = self.fetch_address(memory)?;
                let value = memory.read_stored(address)?;
                self.set_register(register, Word::from(value))?;
            }
            Opcode::LoadByteIndirect => {
                let (dst, src) = self.fetch_register_pair(memory)?;
                let address = usize::from(self.register(src)?);
                let value = memory.read_stored(address)?;
                self.set_register(dst, Word::from(value))?;
            }
            Opcode::LoadWord => {
                let register = self.fetch_register(memory)?;
                let address = self.fetch_address(memory)?;
                let value = memory.read_stored_word(address)?;
                self.set_register(register, value)?;
            }
            Opcode::LoadWordIndirect => {
                let (dst, src) = self.fetch_register_pair(memory)?;
                let address = usize::from(self.register(src)?);
                let value = memory.read_stored_word(address)?;
                self.set_register(dst, value)?;
            }
            Opcode::StoreByte => {
                let register = self.fetch_register(memory)?;
                let address = self.fetch_address(memory)?;
                memory.write_stored(address, low_byte(self.register(register)?))?;
            }
            Opcode::StoreByteIndirect => {
                let (src, target) = self.fetch_register_pair(memory)?;
                let address = usize::from(self.register(target)?);
                memory.write_stored(address, low_byte(self.register(src)?))?;
            }
            Opcode::StoreByteImm => {
                let address = self.fetch_address(memory)?;
                let value = self.fetch_word(memory)?;
                memory.write_stored(address, low_byte(value))?;
            }
            Opcode::StoreByteImmIndirect => {
                let target = self.fetch_register(memory)?;
                let value = self.fetch_word(memory)?;
                let address = usize::from(self.register(target)?);
                memory.write_stored(address, low_byte(value))?;
            }
            Opcode::StoreWord => {
                let register = self.fetch_register(memory)?;
                let address = self.fetch_address(memory)?;
                memory.write_stored_word(address, self.register(register)?)?;
            }
            Opcode::StoreWordIndirect => {
                let (src, target) = self.fetch_register_pair(memory)?;
                let address = usize::from(self.register(target)?);
                memory.write_stored_word(address, self.register(src)?)?;
            }
            Opcode::StoreWordImm => {
                let address = self.fetch_address(memory)?;
                let value = self.fetch_word(memory)?;
                memory.write_stored_word(address, value)?;
            }
            Opcode::Add => self.binary_registers(memory, |lhs, rhs| Ok(lhs.wrapping_add(rhs)))?,
            Opcode::AddImm => self.binary_immediate(memory, |lhs, rhs| Ok(lhs.wrapping_add(rhs)))?,
            Opcode::Subtract => {
                self.binary_registers(memory, |lhs, rhs| Ok(lhs.wrapping_sub(rhs)))?
            }
            Opcode::SubtractImm => {
                self.binary_immediate(memory, |lhs, rhs| Ok(lhs.wrapping_sub(rhs)))?
            }
            Opcode::Multiply => {
                self.binary_registers(memory, |lhs, rhs| Ok(lhs.wrapping_mul(rhs)))?
            }
            Opcode::MultiplyImm => {
                self.binary_immediate(memory, |lhs, rhs| Ok(lhs.wrapping_mul(rhs)))?
            }
            Opcode::Divide => self.binary_registers(memory, |lhs, rhs| {
                lhs.checked_div(rhs).ok_or(MachineFault::DivideByZero(at))
            })?,
            Opcode::DivideImm => self.binary_immediate(memory, |lhs, rhs| {
                lhs.checked_div(rhs).ok_or(MachineFault::DivideByZero(at))
            })?,
            Opcode::Mod => self.binary_registers(memory, |lhs, rhs| {
                lhs.checked_rem(rhs).ok_or(MachineFault::DivideByZero(at))
            })?,
            Opcode::ModImm => self.binary_immediate(memory, |lhs, rhs| {
                lhs.checked_rem(rhs).ok_or(MachineFault::DivideByZero(at))
            })?,
            Opcode::And => self.binary_registers(memory, |lhs, rhs| Ok(lhs & rhs))?,
            Opcode::AndImm => self.binary_immediate(memory, |lhs, rhs| Ok(lhs & rhs))?,
            Opcode::Or => self.binary_registers(memory, |lhs, rhs| Ok(lhs | rhs))?,
            Opcode::OrImm => self.binary_immediate(memory, |lhs, rhs| Ok(lhs | rhs))?,
            Opcode::Xor => self.binary_registers(memory, |lhs, rhs| Ok(lhs ^ rhs))?,
            Opcode::XorImm => self.binary_immediate(memory, |lhs, rhs| Ok(lhs ^ rhs))?,
            Opcode::Not => self.unary(memory, |value| !value)?,
            Opcode::ShiftLeft => self.unary(memory, |value| value.wrapping_shl(1))?,
            Opcode::ShiftRight => self.unary(memory, |value| value.wrapping_shr(1))?,
            Opcode::Increment => self.unary(memory, |value| value.wrapping_add(1))?,
            Opcode::Decrement => self.unary(memory, |value| value.wrapping_sub(1))?,
            Opcode::Compare => {
                let (lhs, rhs) = self.fetch_register_pair(memory)?;
                self.flags = Flags::compare(self.register(lhs)?, self.register(rhs)?);
            }
            Opcode::CompareImm => {
                let register = self.fetch_register(memory)?;
                let value = self.fetch_word(memory)?;
                self.flags = Flags::compare(self.register(register)?, value);
            }
            Opcode::Jump => self.jump_if(memory, true)?,
            Opcode::JumpIndirect => self.jump_indirect_if(memory, true)?,
            Opcode::JumpEqual => self.jump_if(memory, self.flags.equal())?,
            Opcode::JumpEqualIndirect => self.jump_indirect_if(memory, self.flags.equal())?,
            Opcode::JumpNotEqual => self.jump_if(memory, !self.flags.equal())?,
            Opcode::JumpNotEqualIndirect => {
                self.jump_indirect_if(memory, !self.flags.equal())?
            }
            Opcode::JumpGreater => self.jump_if(memory, self.flags.greater())?,
            Opcode::JumpGreaterIndirect => self.jump_indirect_if(memory, self.flags.greater())?,
            Opcode::JumpGreaterEqual => {
                self.jump_if(memory, self.flags.any(Flags::EQUAL | Flags::GREATER))?
            }
            Opcode::JumpGreaterEqualIndirect => {
                self.jump_indirect_if(memory, self.flags.any(Flags::EQUAL | Flags::GREATER))?
            }
            Opcode::JumpLess => self.jump_if(memory, self.flags.less())?,
            Opcode::JumpLessIndirect => self.jump_indirect_if(memory, self.flags.less())?,
            Opcode::JumpLessEqual => {
                self.jump_if(memory, self.flags.any(Flags::EQUAL | Flags::LESS))?
            }
            Opcode::JumpLessEqualIndirect => {
                self.jump_indirect_if(memory, self.flags.any(Flags::EQUAL | Flags::LESS))?
            }
            Opcode::Call => {
                let target = self.fetch_word(memory)?;
                self.call(target)?;
            }
            Opcode::CallIndirect => {
                let register = self.fetch_register(memory)?;
                let target = self.register(register)?;
                self.call(target)?;
            }
            Opcode::Return => {
                self.pc = usize::from(self.stack.pop()?);
            }
            Opcode::Push => {
                let register = self.fetch_register(memory)?;
                self.stack.push(self.register(register)?)?;
            }
            Opcode::PushImm => {
                let value = self.fetch_word(memory)?;
                self.stack.push(value)?;
            }
            Opcode::Pop => {
                self.stack.pop()?;
            }
            Opcode::PopRegister => {
                let register = self.fetch_register(memory)?;
                let value = self.stack.pop()?;
                self.set_register(register, value)?;
            }
            Opcode::Print => {
                let register = self.fetch_register(memory)?;
                print_value(console, self.register(register)?)?;
            }
            Opcode::PrintImm => {
                let value = self.fetch_word(memory)?;
                print_value(console, value)?;
            }
            Opcode::PrintString => {
                let address = self.fetch_address(memory)?;
                print_string(memory, address, console)?;
            }
            Opcode::PrintStringIndirect => {
                let register = self.fetch_register(memory)?;
                let address = usize::from(self.register(register)?);
                print_string(memory, address, console)?;
            }
        }

        Ok(Step::Continue)
    }

    fn fetch_byte(&mut self, memory: &Memory) -> Result<u8, MachineFault> {
        let byte = memory.read(self.pc)?;
        self.pc = advance(self.pc, 1)?;
        Ok(byte)
    }

    fn fetch_word(&mut self, memory: &Memory) -> Result<Word, MachineFault> {
        let word = memory.read_word(self.pc)?;
        self.pc = advance(self.pc, 2)?;
        Ok(word)
    }

    fn fetch_address(&mut self, memory: &Memory) -> Result<usize, MachineFault> {
        Ok(usize::from(self.fetch_word(memory)?))
    }

    fn fetch_register(&mut self, memory: &Memory) -> Result<usize, MachineFault> {
        let at = self.pc;
        let register = self.fetch_byte(memory)?;
        let index = usize::from(register);
        if index >= REGISTER_COUNT {
            return Err(MachineFault::InvalidRegister { register, pc: at });
        }
        Ok(index)
    }

    fn fetch_register_pair(&mut self, memory: &Memory) -> Result<(usize, usize), MachineFault> {
        let first = self.fetch_register(memory)?;
        let second = self.fetch_register(memory)?;
        Ok((first, second))
    }

    fn register(&self, index: usize) -> Result<Word, MachineFault> {
        self.registers
            .get(index)
            .copied()
            .ok_or(MachineFault::InvalidRegister {
                register: register_byte(index),
                pc: self.pc,
            })
    }

    fn set_register(&mut self, index: usize, value: Word) -> Result<(), MachineFault> {
        let pc = self.pc;
        let slot = self
            .registers
            .get_mut(index)
            .ok_or(MachineFault::InvalidRegister {
                register: register_byte(index),
                pc,
            })?;
        *slot = value;
        Ok(())
    }

    fn binary_registers(
        &mut self,
        memory: &Memory,
        op: impl FnOnce(Word, Word) -> Result<Word, MachineFault>,
    ) -> Result<(), MachineFault> {
        let (dst, src) = self.fetch_register_pair(memory)?;
        let value = op(self.register(dst)?, self.register(src)?)?;
        self.set_register(dst, value)
    }

    fn binary_immediate(
        &mut self,
        memory: &Memory,
        op: impl FnOnce(Word, Word) -> Result<Word, MachineFault>,
    ) -> Result<(), MachineFault> {
        let dst = self.fetch_register(memory)?;
        let rhs = self.fetch_word(memory)?;
        let value = op(self.register(dst)?, rhs)?;
        self.set_register(dst, value)
    }

    fn unary(&mut self, memory: &Memory, op: impl FnOnce(Word) -> Word) -> Result<(), MachineFault> {
        let register = self.fetch_register(memory)?;
        let value = op(self.register(register)?);
        self.set_register(register, value)
    }

    fn jump_if(&mut self, memory: &Memory, condition: bool) -> Result<(), MachineFault> {
        let target = self.fetch_word(memory)?;
        if condition {
            self.pc = usize::from(target);
        }
        Ok(())
    }

    fn jump_indirect_if(&mut self, memory: &Memory, condition: bool) -> Result<(), MachineFault> {
        let register = self.fetch_register(memory)?;
        let target = self.register(register)?;
        if condition {
            self.pc = usize::from(target);
        }
        Ok(())
    }

    /// The PC already points past the call, so that is the return address.
    fn call(&mut self, target: Word) -> Result<(), MachineFault> {
        let return_address =
            Word::try_from(self.pc).map_err(|_| MachineFault::ReturnAddressOverflow(self.pc))?;
        self.stack.push(return_address)?;
        self.pc = usize::from(target);
        Ok(())
    }
}

/// Runs `memory` on a freshly constructed [`Cpu`] and returns it once the
/// program halts.
pub fn execute<W: Write>(memory: &mut Memory, console: &mut W) -> Result<Cpu, MachineFault> {
    let mut cpu = Cpu::new();
    cpu.execute(memory, console)?;
    Ok(cpu)
}

fn advance(pc: usize, by: usize) -> Result<usize, MachineFault> {
    pc.checked_add(by).ok_or(MachineFault::OutOfBounds(pc))
}

fn low_byte(value: Word) -> u8 {
    let [_, low] = value.to_be_bytes();
    low
}

fn register_byte(index: usize) -> u8 {
    u8::try_from(index).unwrap_or(u8::MAX)
}

fn print_value<W: Write>(console: &mut W, value: Word) -> Result<(), MachineFault> {
    writeln!(console, "{value}").map_err(|_| MachineFault::ConsoleWrite)
}

fn print_string<W: Write>(
    memory: &Memory,
    start: usize,
    console: &mut W,
) -> Result<(), MachineFault> {
    let mut address = start;
    loop {
        let byte = memory.read_stored(address)?;
        if byte == 0 {
            return Ok(());
        }
        console
            .write_char(char::from(byte))
            .map_err(|_| MachineFault::ConsoleWrite)?;
        address = advance(address, 1)?;
    }
}
