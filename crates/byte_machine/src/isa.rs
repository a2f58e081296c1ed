//! The instruction set table and the operand-shape classifier.
//!
//! Several mnemonics are overloaded: `ADD R0 R1` and `ADD R0 5` are two
//! different opcodes. The assembler first classifies the operand tokens of a
//! line into a [`Shape`] and then looks up the `(mnemonic, shape)` pair in
//! [`INSTRUCTION_SET`]. Classification only ever looks at the tokens of the
//! current line.

use crate::{Opcode, REGISTER_COUNT};

/// Layout of an instruction's operands.
///
/// Register operands are one byte (the register index). Immediates and
/// addresses are two bytes, big-endian.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Shape {
    RegReg,
    RegImm,
    RegAddr,
    AddrImm,
    /// A literal address or a label resolved by the assembler.
    Addr,
    Imm,
    Reg,
    NoOperand,
}

impl Shape {
    /// Encoded length in bytes, opcode byte included.
    pub const fn width(self) -> usize {
        match self {
            Shape::RegReg => 3,
            Shape::RegImm => 4,
            Shape::RegAddr => 4,
            Shape::AddrImm => 5,
            Shape::Addr => 3,
            Shape::Imm => 3,
            Shape::Reg => 2,
            Shape::NoOperand => 1,
        }
    }

    pub const fn operand_count(self) -> usize {
        match self {
            Shape::RegReg | Shape::RegImm | Shape::RegAddr | Shape::AddrImm => 2,
            Shape::Addr | Shape::Imm | Shape::Reg => 1,
            Shape::NoOperand => 0,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct InstructionEntry {
    pub mnemonic: &'static str,
    pub shape: Shape,
    pub opcode: Opcode,
}

const fn entry(mnemonic: &'static str, shape: Shape, opcode: Opcode) -> InstructionEntry {
    InstructionEntry {
        mnemonic,
        shape,
        opcode,
    }
}

/// Every accepted `(mnemonic, shape)` pair. The first entry for an opcode
/// gives its canonical mnemonic.
pub const INSTRUCTION_SET: &[InstructionEntry] = &[
    entry("HLT", Shape::NoOperand, Opcode::Halt),
    entry("NOP", Shape::NoOperand, Opcode::Nop),
    entry("LOAD", Shape::RegImm, Opcode::LoadImm),
    entry("LOAD", Shape::RegReg, Opcode::Move),
    entry("MOV", Shape::RegImm, Opcode::LoadImm),
    entry("MOV", Shape::RegReg, Opcode::Move),
    entry("LDM", Shape::RegAddr, Opcode::LoadByte),
    entry("LDM", Shape::RegReg, Opcode::LoadByteIndirect),
    entry("LDW", Shape::RegAddr, Opcode::LoadWord),
    entry("LDW", Shape::RegReg, Opcode::LoadWordIndirect),
    entry("STORE", Shape::RegAddr, Opcode::StoreByte),
    entry("STORE", Shape::RegReg, Opcode::StoreByteIndirect),
    entry("STORE", Shape::AddrImm, Opcode::StoreByteImm),
    entry("STI", Shape::RegImm, Opcode::StoreByteImmIndirect),
    entry("STW", Shape::RegAddr, Opcode::StoreWord),
    entry("STW", Shape::RegReg, Opcode::StoreWordIndirect),
    entry("STW", Shape::AddrImm, Opcode::StoreWordImm),
    entry("ADD", Shape::RegReg, Opcode::Add),
    entry("ADD", Shape::RegImm, Opcode::AddImm),
    entry("SUB", Shape::RegReg, Opcode::Subtract),
    entry("SUB", Shape::RegImm, Opcode::SubtractImm),
    entry("MUL", Shape::RegReg, Opcode::Multiply),
    entry("MUL", Shape::RegImm, Opcode::MultiplyImm),
    entry("DIV", Shape::RegReg, Opcode::Divide),
    entry("DIV", Shape::RegImm, Opcode::DivideImm),
    entry("MOD", Shape::RegReg, Opcode::Mod),
    entry("MOD", Shape::RegImm, Opcode::ModImm),
    entry("AND", Shape::RegReg, Opcode::And),
    entry("AND", Shape::RegImm, Opcode::AndImm),
    entry("OR", Shape::RegReg, Opcode::Or),
    entry("OR", Shape::RegImm, Opcode::OrImm),
    entry("XOR", Shape::RegReg, Opcode::Xor),
    entry("XOR", Shape::RegImm, Opcode::XorImm),
    entry("NOT", Shape::Reg, Opcode::Not),
    entry("SHL", Shape::Reg, Opcode::ShiftLeft),
    entry("SHR", Shape::Reg, Opcode::ShiftRight),
    entry("INC", Shape::Reg, Opcode::Increment),
    entry("DEC", Shape::Reg, Opcode::Decrement),
    entry("CMP", Shape::RegReg, Opcode::Compare),
    entry("CMP", Shape::RegImm, Opcode::CompareImm),
    entry("JMP", Shape::Addr, Opcode::Jump),
    entry("JMP", Shape::Reg, Opcode::JumpIndirect),
    entry("JE", Shape::Addr, Opcode::JumpEqual),
    entry("JE", Shape::Reg, Opcode::JumpEqualIndirect),
    entry("JNE", Shape::Addr, Opcode::JumpNotEqual),
    entry("JNE", Shape::Reg, Opcode::JumpNotEqualIndirect),
    entry("JG", Shape::Addr, Opcode::JumpGreater),
    entry("JG", Shape::Reg, Opcode::JumpGreaterIndirect),
    entry("JGE", Shape::Addr, Opcode::JumpGreaterEqual),
    entry("JGE", Shape::Reg, Opcode::JumpGreaterEqualIndirect),
    entry("JL", Shape::Addr, Opcode::JumpLess),
    entry("JL", Shape::Reg, Opcode::JumpLessIndirect),
    entry("JLE", Shape::Addr, Opcode::JumpLessEqual),
    entry("JLE", Shape::Reg, Opcode::JumpLessEqualIndirect),
    entry("CALL", Shape::Addr, Opcode::Call),
    entry("CALL", Shape::Reg, Opcode::CallIndirect),
    entry("RET", Shape::NoOperand, Opcode::Return),
    entry("PUSH", Shape::Reg, Opcode::Push),
    entry("PUSH", Shape::Imm, Opcode::PushImm),
    entry("POP", Shape::NoOperand, Opcode::Pop),
    entry("POP", Shape::Reg, Opcode::PopRegister),
    entry("PRINT", Shape::Reg, Opcode::Print),
    entry("PRINT", Shape::Imm, Opcode::PrintImm),
    entry("PRINTS", Shape::Imm, Opcode::PrintString),
    entry("PRINTS", Shape::Reg, Opcode::PrintStringIndirect),
];

const CONTROL_FLOW: &[&str] = &["JMP", "JE", "JNE", "JG", "JGE", "JL", "JLE", "CALL"];
const MEMORY_ADDRESSING: &[&str] = &["LDM", "STORE", "LDW", "STW"];

pub fn is_control_flow(mnemonic: &str) -> bool {
    CONTROL_FLOW
        .iter()
        .any(|name| name.eq_ignore_ascii_case(mnemonic))
}

pub fn is_memory_addressing(mnemonic: &str) -> bool {
    MEMORY_ADDRESSING
        .iter()
        .any(|name| name.eq_ignore_ascii_case(mnemonic))
}

pub fn is_known_mnemonic(mnemonic: &str) -> bool {
    INSTRUCTION_SET
        .iter()
        .any(|entry| entry.mnemonic.eq_ignore_ascii_case(mnemonic))
}

/// True when some table entry for `mnemonic` takes `count` operands.
pub fn accepts_operand_count(mnemonic: &str, count: usize) -> bool {
    INSTRUCTION_SET.iter().any(|entry| {
        entry.mnemonic.eq_ignore_ascii_case(mnemonic) && entry.shape.operand_count() == count
    })
}

pub fn lookup(mnemonic: &str, shape: Shape) -> Option<Opcode> {
    INSTRUCTION_SET
        .iter()
        .find(|entry| entry.shape == shape && entry.mnemonic.eq_ignore_ascii_case(mnemonic))
        .map(|entry| entry.opcode)
}

/// Picks the operand shape for a line from the token kinds alone.
///
/// Returns `None` when there are more than two operands.
pub fn classify(mnemonic: &str, operands: &[&str]) -> Option<Shape> {
    match operands {
        [] => Some(Shape::NoOperand),
        [operand] => {
            if is_register_name(operand) {
                Some(Shape::Reg)
            } else if is_control_flow(mnemonic) {
                Some(Shape::Addr)
            } else {
                Some(Shape::Imm)
            }
        }
        [first, second] => {
            if !is_register_name(first) {
                Some(Shape::AddrImm)
            } else if is_register_name(second) {
                Some(Shape::RegReg)
            } else if is_numeric(second) && is_memory_addressing(mnemonic) {
                Some(Shape::RegAddr)
            } else {
                Some(Shape::RegImm)
            }
        }
        _ => None,
    }
}

/// `R` or `r` followed by digits. Such a token is always treated as a
/// register operand; whether it names an existing register is checked when
/// encoding.
pub fn is_register_name(token: &str) -> bool {
    token
        .strip_prefix('R')
        .or_else(|| token.strip_prefix('r'))
        .is_some_and(|digits| !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()))
}

/// Maps `R0`..`R3` (either case) to a register index.
pub fn register_index(token: &str) -> Option<u8> {
    let digits = token
        .strip_prefix('R')
        .or_else(|| token.strip_prefix('r'))?;
    if digits.len() != 1 {
        return None;
    }
    let index = digits.parse::<u8>().ok()?;
    if usize::from(index) < REGISTER_COUNT {
        Some(index)
    } else {
        None
    }
}

/// Decimal with an optional leading `-`, or `0x` hex.
pub fn is_numeric(token: &str) -> bool {
    if let Some(hex) = token.strip_prefix("0x") {
        return !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit());
    }
    let digits = token.strip_prefix('-').unwrap_or(token);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

/// Parses a numeric token. `None` for non-numeric tokens and for values
/// that do not fit an `i64`.
pub fn parse_number(token: &str) -> Option<i64> {
    if !is_numeric(token) {
        return None;
    }
    match token.strip_prefix("0x") {
        Some(hex) => i64::from_str_radix(hex, 16).ok(),
        None => token.parse::<i64>().ok(),
    }
}

impl Opcode {
    /// The operand shape this opcode decodes.
    pub const fn shape(self) -> Shape {
        match self {
            Opcode::Halt | Opcode::Nop | Opcode::Return | Opcode::Pop => Shape::NoOperand,
            Opcode::LoadImm
            | Opcode::StoreByteImmIndirect
            | Opcode::AddImm
            | Opcode::SubtractImm
            | Opcode::MultiplyImm
            | Opcode::DivideImm
            | Opcode::ModImm
            | Opcode::AndImm
            | Opcode::OrImm
            | Opcode::XorImm
            | Opcode::CompareImm => Shape::RegImm,
            Opcode::Move
            | Opcode::LoadByteIndirect
            | Opcode::LoadWordIndirect
            | Opcode::StoreByteIndirect
            | Opcode::StoreWordIndirect
            | Opcode::Add
            | Opcode::Subtract
            | Opcode::Multiply
            | Opcode::Divide
            | Opcode::Mod
            | Opcode::And
            | Opcode::Or
            | Opcode::Xor
            | Opcode::Compare => Shape::RegReg,
            Opcode::LoadByte | Opcode::LoadWord | Opcode::StoreByte | Opcode::StoreWord => {
                Shape::RegAddr
            }
            Opcode::StoreByteImm | Opcode::StoreWordImm => Shape::AddrImm,
            Opcode::Jump
            | Opcode::JumpEqual
            | Opcode::JumpNotEqual
            | Opcode::JumpGreater
            | Opcode::JumpGreaterEqual
            | Opcode::JumpLess
            | Opcode::JumpLessEqual
            | Opcode::Call => Shape::Addr,
            Opcode::PushImm | Opcode::PrintImm | Opcode::PrintString => Shape::Imm,
            Opcode::Not
            | Opcode::ShiftLeft
            | Opcode::ShiftRight
            | Opcode::Increment
            | Opcode::Decrement
            | Opcode::JumpIndirect
            | Opcode::JumpEqualIndirect
            | Opcode::JumpNotEqualIndirect
            | Opcode::JumpGreaterIndirect
            | Opcode::JumpGreaterEqualIndirect
            | Opcode::JumpLessIndirect
            | Opcode::JumpLessEqualIndirect
            | Opcode::CallIndirect
            | Opcode::Push
            | Opcode::PopRegister
            | Opcode::Print
            | Opcode::PrintStringIndirect => Shape::Reg,
        }
    }

    /// Canonical mnemonic, used by the disassembler.
    pub fn mnemonic(self) -> &'static str {
        INSTRUCTION_SET
            .iter()
            .find(|entry| entry.opcode == self)
            .map_or("???", |entry| entry.mnemonic)
    }
}

#[cfg(test)]
mod test;
