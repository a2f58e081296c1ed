use super::*;
use crate::assembler::{AssemblerError, assemble};
use crate::Opcode;

extern crate std;
use std::format;
use std::string::String;

fn sample_operands(shape: Shape) -> &'static str {
    match shape {
        Shape::RegReg => "R0 R1",
        Shape::RegImm => "R0 5",
        Shape::RegAddr => "R0 16",
        Shape::AddrImm => "16 5",
        Shape::Addr => "16",
        Shape::Imm => "5",
        Shape::Reg => "R0",
        Shape::NoOperand => "",
    }
}

#[test]
fn every_entry_encodes_to_its_shape_width() -> Result<(), AssemblerError> {
    for entry in INSTRUCTION_SET {
        let line = format!("{} {}", entry.mnemonic, sample_operands(entry.shape));
        let code = assemble(&[line.as_str()])?;
        assert_eq!(code.len(), entry.shape.width(), "{line}");
        assert_eq!(code.first().copied(), Some(u8::from(entry.opcode)), "{line}");
    }
    Ok(())
}

#[test]
fn table_agrees_with_decoder_shapes() {
    for entry in INSTRUCTION_SET {
        assert_eq!(entry.opcode.shape(), entry.shape, "{}", entry.mnemonic);
        assert_eq!(lookup(entry.mnemonic, entry.shape), Some(entry.opcode));
    }
}

#[test]
fn every_opcode_has_a_table_entry() {
    for byte in 0..=u8::MAX {
        let Ok(opcode) = Opcode::try_from(byte) else {
            assert!(usize::from(byte) >= Opcode::VARIANT_COUNT);
            continue;
        };
        assert_eq!(u8::from(opcode), byte);
        assert!(
            INSTRUCTION_SET.iter().any(|entry| entry.opcode == opcode),
            "{opcode:?}"
        );
        assert_ne!(opcode.mnemonic(), "???");
    }
}

#[test]
fn table_has_no_duplicate_pairs() {
    for (i, a) in INSTRUCTION_SET.iter().enumerate() {
        for b in INSTRUCTION_SET.iter().skip(i + 1) {
            assert!(
                !(a.mnemonic == b.mnemonic && a.shape == b.shape),
                "{} {:?}",
                a.mnemonic,
                a.shape
            );
        }
    }
}

#[test]
fn classifies_single_operands() {
    assert_eq!(classify("PUSH", &["R2"]), Some(Shape::Reg));
    assert_eq!(classify("PUSH", &["7"]), Some(Shape::Imm));
    assert_eq!(classify("JMP", &["loop"]), Some(Shape::Addr));
    assert_eq!(classify("jne", &["0x0800"]), Some(Shape::Addr));
    assert_eq!(classify("CALL", &["R1"]), Some(Shape::Reg));
    assert_eq!(classify("HLT", &[]), Some(Shape::NoOperand));
}

#[test]
fn classifies_operand_pairs() {
    assert_eq!(classify("ADD", &["R0", "R1"]), Some(Shape::RegReg));
    assert_eq!(classify("ADD", &["R0", "9"]), Some(Shape::RegImm));
    assert_eq!(classify("LDM", &["R0", "100"]), Some(Shape::RegAddr));
    assert_eq!(classify("LDM", &["R0", "x"]), Some(Shape::RegImm));
    assert_eq!(classify("LOAD", &["R0", "100"]), Some(Shape::RegImm));
    assert_eq!(classify("STORE", &["100", "7"]), Some(Shape::AddrImm));
    assert_eq!(classify("ADD", &["R0", "R1", "R2"]), None);
}

#[test]
fn register_names() {
    assert_eq!(register_index("R0"), Some(0));
    assert_eq!(register_index("r3"), Some(3));
    assert_eq!(register_index("R4"), None);
    assert_eq!(register_index("R"), None);
    assert_eq!(register_index("R01"), None);
    assert!(is_register_name("R9"));
    assert!(is_register_name("r12"));
    assert!(!is_register_name("R"));
    assert!(!is_register_name("Rx"));
    assert!(!is_register_name("loop"));
}

#[test]
fn numeric_tokens() {
    assert_eq!(parse_number("42"), Some(42));
    assert_eq!(parse_number("-3"), Some(-3));
    assert_eq!(parse_number("0xff"), Some(255));
    assert_eq!(parse_number("0x"), None);
    assert_eq!(parse_number("-"), None);
    assert_eq!(parse_number("12a"), None);
    assert_eq!(parse_number("99999999999999999999"), None);
    assert!(is_numeric("0x1F"));
    assert!(!is_numeric("A"));
}

#[test]
fn mnemonic_families() {
    for name in ["JMP", "JE", "JNE", "JG", "JGE", "JL", "JLE", "CALL", "call"] {
        assert!(is_control_flow(name), "{name}");
    }
    assert!(!is_control_flow("RET"));
    for name in ["LDM", "STORE", "LDW", "STW"] {
        assert!(is_memory_addressing(name), "{name}");
    }
    assert!(!is_memory_addressing("STI"));
}

#[test]
fn operand_count_lookup() {
    assert!(accepts_operand_count("POP", 0));
    assert!(accepts_operand_count("POP", 1));
    assert!(!accepts_operand_count("POP", 2));
    assert!(is_known_mnemonic("prints"));
    assert!(!is_known_mnemonic("FOO"));
    let canonical: String = Opcode::Move.mnemonic().into();
    assert_eq!(canonical, "LOAD");
}
