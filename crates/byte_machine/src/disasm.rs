//! Bytecode back to assembly text.
//!
//! Every decoded instruction prints in a form the assembler accepts again:
//! registers as `R<n>`, immediates in decimal and addresses in hex. Labels
//! are gone after assembly, so jump targets come back as literal addresses.

use alloc::vec::Vec;
use core::fmt;

use thiserror_no_std::Error;

use crate::isa::Shape;
use crate::{Opcode, REGISTER_COUNT, STORED_SIZE, Word};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DisasmError {
    #[error("byte {opcode} at offset {offset} is not an opcode")]
    UnknownOpcode { opcode: u8, offset: usize },
    #[error("byte {register} at offset {offset} does not name a register")]
    InvalidRegister { register: u8, offset: usize },
    #[error("instruction at offset {0} runs past the end of the code")]
    Truncated(usize),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operand {
    Register(u8),
    Immediate(Word),
    Address(Word),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Register(index) => write!(f, "R{index}"),
            Operand::Immediate(value) => write!(f, "{value}"),
            Operand::Address(address) => write!(f, "{address:#06x}"),
        }
    }
}

/// One decoded instruction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Disasm {
    offset: usize,
    opcode: Opcode,
    operands: heapless::Vec<Operand, 2>,
}

impl Disasm {
    /// Offset into the bytecode.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Where the instruction sits once the code is loaded.
    pub fn address(&self) -> usize {
        STORED_SIZE.saturating_add(self.offset)
    }

    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    pub fn operands(&self) -> &[Operand] {
        &self.operands
    }

    /// Encoded length in bytes.
    pub fn width(&self) -> usize {
        self.opcode.shape().width()
    }
}

impl fmt::Display for Disasm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode.mnemonic())?;
        for operand in self.operands.iter() {
            write!(f, " {operand}")?;
        }
        Ok(())
    }
}

struct Cursor<'a> {
    code: &'a [u8],
    offset: usize,
    start: usize,
}

impl Cursor<'_> {
    fn byte(&mut self) -> Result<u8, DisasmError> {
        let byte = self
            .code
            .get(self.offset)
            .copied()
            .ok_or(DisasmError::Truncated(self.start))?;
        self.offset = self
            .offset
            .checked_add(1)
            .ok_or(DisasmError::Truncated(self.start))?;
        Ok(byte)
    }

    fn word(&mut self) -> Result<Word, DisasmError> {
        let high = self.byte()?;
        let low = self.byte()?;
        Ok(Word::from_be_bytes([high, low]))
    }

    fn register(&mut self) -> Result<Operand, DisasmError> {
        let offset = self.offset;
        let register = self.byte()?;
        if usize::from(register) >= REGISTER_COUNT {
            return Err(DisasmError::InvalidRegister { register, offset });
        }
        Ok(Operand::Register(register))
    }

    fn immediate(&mut self) -> Result<Operand, DisasmError> {
        Ok(Operand::Immediate(self.word()?))
    }

    fn address(&mut self) -> Result<Operand, DisasmError> {
        Ok(Operand::Address(self.word()?))
    }
}

/// Decodes the instruction starting at `offset`.
pub fn disassemble_one(code: &[u8], offset: usize) -> Result<Disasm, DisasmError> {
    let mut cursor = Cursor {
        code,
        offset,
        start: offset,
    };
    let byte = cursor.byte()?;
    let opcode = Opcode::try_from(byte)
        .map_err(|_| DisasmError::UnknownOpcode { opcode: byte, offset })?;

    let operands: [Option<Operand>; 2] = match opcode.shape() {
        Shape::NoOperand => [None, None],
        Shape::Reg => [Some(cursor.register()?), None],
        Shape::Imm => [Some(cursor.immediate()?), None],
        Shape::Addr => [Some(cursor.address()?), None],
        Shape::RegReg => [Some(cursor.register()?), Some(cursor.register()?)],
        Shape::RegImm => [Some(cursor.register()?), Some(cursor.immediate()?)],
        Shape::RegAddr => [Some(cursor.register()?), Some(cursor.address()?)],
        Shape::AddrImm => [Some(cursor.address()?), Some(cursor.immediate()?)],
    };

    Ok(Disasm {
        offset,
        opcode,
        operands: operands.into_iter().flatten().collect(),
    })
}

/// Decodes a whole program, front to back.
pub fn disassemble(code: &[u8]) -> Result<Vec<Disasm>, DisasmError> {
    let mut listing = Vec::new();
    let mut offset = 0;
    while offset < code.len() {
        let instruction = disassemble_one(code, offset)?;
        offset = offset
            .checked_add(instruction.width())
            .ok_or(DisasmError::Truncated(offset))?;
        listing.push(instruction);
    }
    tracing::debug!(instructions = listing.len(), "disassembled program");
    Ok(listing)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::assembler::assemble;

    extern crate std;
    use std::string::{String, ToString};
    use std::vec;

    #[test]
    fn lists_instructions_with_literal_targets() {
        let code = assemble(&["start:", "LOAD R0 42", "STORE 10 7", "JNE start", "HLT"])
            .unwrap();
        let listing = disassemble(&code).unwrap();
        let lines: Vec<String> = listing.iter().map(ToString::to_string).collect();
        assert_eq!(
            lines,
            vec!["LOAD R0 42", "STORE 0x000a 7", "JNE 0x0800", "HLT"]
        );
        assert_eq!(listing.get(2).map(Disasm::address), Some(STORED_SIZE + 9));
    }

    #[test]
    fn listing_reassembles_to_the_same_bytes() {
        let source = [
            "LOAD R1 3",
            "loop:",
            "PRINT R1",
            "DEC R1",
            "CMP R1 0",
            "JG loop",
            "CALL done",
            "PRINTS 100",
            "done:",
            "POP",
            "HLT",
        ];
        let code = assemble(&source).unwrap();
        let listing = disassemble(&code).unwrap();
        let text: Vec<String> = listing.iter().map(ToString::to_string).collect();
        assert_eq!(assemble(&text), Ok(code));
    }

    #[test]
    fn rejects_bad_bytes() {
        assert_eq!(
            disassemble(&[0xff]),
            Err(DisasmError::UnknownOpcode {
                opcode: 0xff,
                offset: 0
            })
        );
        assert_eq!(
            disassemble(&[u8::from(Opcode::Nop), u8::from(Opcode::Push), 9]),
            Err(DisasmError::InvalidRegister {
                register: 9,
                offset: 2
            })
        );
        assert_eq!(
            disassemble(&[u8::from(Opcode::LoadImm), 0, 1]),
            Err(DisasmError::Truncated(0))
        );
    }
}
