//! Two-pass assembler.
//!
//! Pass one ([`Assembler::layout`]) walks the source, records where every
//! label lands and which bytecode offsets name a label that has to be
//! filled in later. Pass two ([`Assembler::assemble`]) encodes each
//! instruction and then back-patches the recorded offsets with the label
//! addresses. Any error aborts the whole assembly; no partial bytecode is
//! ever returned.

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt;

use thiserror_no_std::Error;

use crate::isa::{self, Shape};
use crate::{CODE_SIZE, Opcode, STORED_SIZE, TOTAL_SIZE, Word};

/// Mnemonic plus at most two operands.
const MAX_TOKENS: usize = 3;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssemblerErrorKind {
    #[error("invalid operand count")]
    InvalidOperandCount,
    #[error("invalid register")]
    InvalidRegister,
    #[error("invalid value")]
    InvalidValue,
    #[error("invalid address")]
    InvalidAddress,
    #[error("invalid label `{0}`")]
    InvalidLabel(String),
    #[error("invalid opcode")]
    InvalidOpcode,
    #[error("duplicate label `{0}`")]
    DuplicateLabel(String),
    #[error("program too large")]
    ProgramTooLarge,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblerError {
    kind: AssemblerErrorKind,
    line: Option<u32>,
    mnemonic: Option<String>,
    opcode: Option<Opcode>,
}

impl AssemblerError {
    fn new(kind: AssemblerErrorKind) -> Self {
        Self {
            kind,
            line: None,
            mnemonic: None,
            opcode: None,
        }
    }

    fn with_line(mut self, line: u32) -> Self {
        if self.line.is_none() {
            self.line = Some(line);
        }
        self
    }

    fn with_mnemonic(mut self, mnemonic: &str) -> Self {
        if self.mnemonic.is_none() {
            self.mnemonic = Some(mnemonic.to_string());
        }
        self
    }

    fn with_opcode(mut self, opcode: Opcode) -> Self {
        self.opcode = Some(opcode);
        self
    }

    pub fn kind(&self) -> &AssemblerErrorKind {
        &self.kind
    }

    /// 1-based source line. `None` for errors found after the line scan.
    pub fn line_number(&self) -> Option<u32> {
        self.line
    }

    pub fn mnemonic(&self) -> Option<&str> {
        self.mnemonic.as_deref()
    }

    pub fn opcode(&self) -> Option<Opcode> {
        self.opcode
    }
}

impl From<AssemblerErrorKind> for AssemblerError {
    fn from(kind: AssemblerErrorKind) -> Self {
        Self::new(kind)
    }
}

impl fmt::Display for AssemblerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "assembler error on line {line}: {}", self.kind)?,
            None => write!(f, "assembler error: {}", self.kind)?,
        }
        if let Some(mnemonic) = &self.mnemonic {
            write!(f, " ({mnemonic})")?;
        }
        Ok(())
    }
}

impl core::error::Error for AssemblerError {}

/// Result of pass one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Layout {
    labels: BTreeMap<String, Word>,
    patches: BTreeMap<usize, String>,
    code_len: usize,
}

impl Layout {
    /// Label name to absolute address.
    pub fn labels(&self) -> &BTreeMap<String, Word> {
        &self.labels
    }

    /// Bytecode offset to the label whose address belongs there.
    pub fn patches(&self) -> &BTreeMap<usize, String> {
        &self.patches
    }

    pub fn code_len(&self) -> usize {
        self.code_len
    }

    pub fn label(&self, name: &str) -> Option<Word> {
        self.labels.get(name).copied()
    }
}

enum Line<'a> {
    Blank,
    Label(&'a str),
    Instruction(Instruction<'a>),
}

struct Instruction<'a> {
    mnemonic: &'a str,
    operands: heapless::Vec<&'a str, 2>,
    shape: Shape,
}

impl Instruction<'_> {
    fn operand(&self, index: usize) -> Result<&str, AssemblerErrorKind> {
        self.operands
            .get(index)
            .copied()
            .ok_or(AssemblerErrorKind::InvalidOperandCount)
    }
}

pub struct Assembler<'a> {
    lines: Vec<&'a str>,
}

impl<'a> Assembler<'a> {
    pub fn new<S: AsRef<str>>(lines: &'a [S]) -> Self {
        Self {
            lines: lines.iter().map(AsRef::as_ref).collect(),
        }
    }

    pub fn from_source(source: &'a str) -> Self {
        Self {
            lines: source.lines().collect(),
        }
    }

    fn numbered_lines(&self) -> impl Iterator<Item = (u32, &'a str)> + '_ {
        (1u32..).zip(self.lines.iter().copied())
    }

    /// Pass one: label addresses, patch sites and total code length.
    pub fn layout(&self) -> Result<Layout, AssemblerError> {
        let scan = self.scan();
        match scan.error {
            Some(err) => Err(err),
            None => Ok(scan.layout),
        }
    }

    /// Walks every line even after a failure so labels declared further down
    /// are still known when pass two reaches the lines before the failure.
    fn scan(&self) -> Scan {
        let mut scan = Scan::default();
        let mut offset: usize = 0;

        for (number, text) in self.numbered_lines() {
            let line = match parse_line(text) {
                Ok(line) => line,
                Err(kind) => {
                    scan.fail(
                        AssemblerError::new(kind)
                            .with_line(number)
                            .with_mnemonic(first_token(text)),
                    );
                    continue;
                }
            };
            match line {
                Line::Blank => {}
                Line::Label(name) => {
                    if let Err(kind) = declare_label(&mut scan.layout, name, offset) {
                        if !scan.layout.labels.contains_key(name) {
                            scan.dropped.insert(name.to_string());
                        }
                        scan.fail(AssemblerError::new(kind).with_line(number));
                    }
                }
                Line::Instruction(instruction) => {
                    let fail = |kind: AssemblerErrorKind| {
                        AssemblerError::new(kind)
                            .with_line(number)
                            .with_mnemonic(instruction.mnemonic)
                    };
                    if isa::is_control_flow(instruction.mnemonic) && instruction.shape == Shape::Addr {
                        match instruction.operand(0) {
                            Ok(target) if !isa::is_numeric(target) => {
                                match offset.checked_add(1) {
                                    Some(at) => {
                                        scan.layout.patches.insert(at, target.to_string());
                                    }
                                    None => scan.fail(fail(AssemblerErrorKind::ProgramTooLarge)),
                                }
                            }
                            Ok(_) => {}
                            Err(kind) => scan.fail(fail(kind)),
                        }
                    }
                    offset = offset.saturating_add(instruction.shape.width());
                    if offset > CODE_SIZE {
                        scan.fail(fail(AssemblerErrorKind::ProgramTooLarge));
                    }
                }
            }
        }

        scan.layout.code_len = offset;
        tracing::debug!(
            labels = scan.layout.labels.len(),
            patches = scan.layout.patches.len(),
            bytes = scan.layout.code_len,
            failed = scan.error.is_some(),
            "layout pass complete"
        );
        scan
    }

    /// Runs both passes and returns the finished bytecode.
    ///
    /// Errors come back in source order: a pass one error only wins once
    /// pass two has encoded every line before it without failing.
    pub fn assemble(&self) -> Result<Vec<u8>, AssemblerError> {
        let scan = self.scan();
        let layout = &scan.layout;
        let mut code = Vec::with_capacity(layout.code_len.min(CODE_SIZE));

        for (number, text) in self.numbered_lines() {
            if let Some(err) = scan.error_at(number) {
                return Err(err.clone());
            }
            let Line::Instruction(instruction) = parse_line(text).map_err(|kind| {
                AssemblerError::new(kind)
                    .with_line(number)
                    .with_mnemonic(first_token(text))
            })?
            else {
                continue;
            };
            encode(&instruction, layout, &mut code).map_err(|err| {
                // The label exists further down but could not be placed.
                if let (AssemblerErrorKind::InvalidLabel(name), Some(pending)) =
                    (err.kind(), &scan.error)
                    && scan.dropped.contains(name)
                {
                    return pending.clone();
                }
                err.with_line(number).with_mnemonic(instruction.mnemonic)
            })?;
        }
        if let Some(err) = scan.error {
            return Err(err);
        }

        for (at, name) in layout.patches.iter() {
            let address = layout
                .label(name)
                .ok_or_else(|| AssemblerError::new(AssemblerErrorKind::InvalidLabel(name.clone())))?;
            let end = at
                .checked_add(2)
                .ok_or(AssemblerError::new(AssemblerErrorKind::ProgramTooLarge))?;
            let slot = code
                .get_mut(*at..end)
                .ok_or(AssemblerError::new(AssemblerErrorKind::ProgramTooLarge))?;
            slot.copy_from_slice(&address.to_be_bytes());
        }

        tracing::debug!(bytes = code.len(), "assembled program");
        Ok(code)
    }
}

/// Pass one state, including the first error it ran into.
#[derive(Default)]
struct Scan {
    layout: Layout,
    error: Option<AssemblerError>,
    dropped: BTreeSet<String>,
}

impl Scan {
    fn fail(&mut self, err: AssemblerError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    /// The pass one error, once pass two has reached its line.
    fn error_at(&self, number: u32) -> Option<&AssemblerError> {
        self.error
            .as_ref()
            .filter(|err| err.line.is_none_or(|line| line <= number))
    }
}

/// Assembles a program given as individual source lines.
pub fn assemble<S: AsRef<str>>(lines: &[S]) -> Result<Vec<u8>, AssemblerError> {
    Assembler::new(lines).assemble()
}

/// Assembles a program given as one newline separated string.
pub fn assemble_source(source: &str) -> Result<Vec<u8>, AssemblerError> {
    Assembler::from_source(source).assemble()
}

fn first_token(text: &str) -> &str {
    text.split_whitespace().next().unwrap_or_default()
}

fn parse_line(text: &str) -> Result<Line<'_>, AssemblerErrorKind> {
    // Anything from a token starting with ';' onwards is a comment.
    let mut tokens: heapless::Vec<&str, MAX_TOKENS> = heapless::Vec::new();
    for token in text
        .split_whitespace()
        .take_while(|token| !token.starts_with(';'))
    {
        tokens
            .push(token)
            .map_err(|_| AssemblerErrorKind::InvalidOperandCount)?;
    }

    let Some((&mnemonic, rest)) = tokens.split_first() else {
        return Ok(Line::Blank);
    };
    if rest.is_empty()
        && let Some(name) = mnemonic.strip_suffix(':')
    {
        return Ok(Line::Label(name));
    }

    let shape = isa::classify(mnemonic, rest).ok_or(AssemblerErrorKind::InvalidOperandCount)?;
    let operands = heapless::Vec::from_slice(rest)
        .map_err(|_| AssemblerErrorKind::InvalidOperandCount)?;
    Ok(Line::Instruction(Instruction {
        mnemonic,
        operands,
        shape,
    }))
}

fn declare_label(layout: &mut Layout, name: &str, offset: usize) -> Result<(), AssemblerErrorKind> {
    if name.is_empty() || isa::is_register_name(name) || isa::is_numeric(name) {
        return Err(AssemblerErrorKind::InvalidLabel(name.to_string()));
    }
    if layout.labels.contains_key(name) {
        return Err(AssemblerErrorKind::DuplicateLabel(name.to_string()));
    }
    // A label right after a full code segment would point past memory.
    let address = STORED_SIZE
        .checked_add(offset)
        .and_then(|address| Word::try_from(address).ok())
        .ok_or_else(|| AssemblerErrorKind::InvalidLabel(name.to_string()))?;
    layout.labels.insert(name.to_string(), address);
    Ok(())
}

fn encode(
    instruction: &Instruction<'_>,
    layout: &Layout,
    code: &mut Vec<u8>,
) -> Result<(), AssemblerError> {
    let mnemonic = instruction.mnemonic;
    let shape = instruction.shape;
    let opcode = isa::lookup(mnemonic, shape).ok_or_else(|| {
        if !isa::is_known_mnemonic(mnemonic) {
            AssemblerErrorKind::InvalidOpcode
        } else if !isa::accepts_operand_count(mnemonic, shape.operand_count()) {
            AssemblerErrorKind::InvalidOperandCount
        } else {
            AssemblerErrorKind::InvalidOpcode
        }
    })?;
    let fail = |kind: AssemblerErrorKind| AssemblerError::new(kind).with_opcode(opcode);

    code.push(u8::from(opcode));
    match shape {
        Shape::NoOperand => {}
        Shape::Reg => {
            code.push(register(instruction.operand(0).map_err(fail)?).map_err(fail)?);
        }
        Shape::Imm => {
            push_word(code, immediate(instruction.operand(0).map_err(fail)?).map_err(fail)?);
        }
        Shape::Addr => {
            let target = instruction.operand(0).map_err(fail)?;
            push_word(code, target_address(target, layout).map_err(fail)?);
        }
        Shape::RegReg => {
            code.push(register(instruction.operand(0).map_err(fail)?).map_err(fail)?);
            code.push(register(instruction.operand(1).map_err(fail)?).map_err(fail)?);
        }
        Shape::RegImm => {
            code.push(register(instruction.operand(0).map_err(fail)?).map_err(fail)?);
            push_word(code, immediate(instruction.operand(1).map_err(fail)?).map_err(fail)?);
        }
        Shape::RegAddr => {
            code.push(register(instruction.operand(0).map_err(fail)?).map_err(fail)?);
            push_word(code, address(instruction.operand(1).map_err(fail)?).map_err(fail)?);
        }
        Shape::AddrImm => {
            push_word(code, address(instruction.operand(0).map_err(fail)?).map_err(fail)?);
            push_word(code, immediate(instruction.operand(1).map_err(fail)?).map_err(fail)?);
        }
    }
    Ok(())
}

fn push_word(code: &mut Vec<u8>, value: Word) {
    code.extend_from_slice(&value.to_be_bytes());
}

fn register(token: &str) -> Result<u8, AssemblerErrorKind> {
    isa::register_index(token).ok_or(AssemblerErrorKind::InvalidRegister)
}

/// A number in `0..=65535`, or a single ASCII character standing for its
/// code.
fn immediate(token: &str) -> Result<Word, AssemblerErrorKind> {
    if let Some(value) = isa::parse_number(token) {
        return Word::try_from(value).map_err(|_| AssemblerErrorKind::InvalidValue);
    }
    let mut chars = token.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii() => Ok(Word::from(c as u8)),
        _ => Err(AssemblerErrorKind::InvalidValue),
    }
}

fn address(token: &str) -> Result<Word, AssemblerErrorKind> {
    isa::parse_number(token)
        .and_then(|value| usize::try_from(value).ok())
        .filter(|value| *value < TOTAL_SIZE)
        .and_then(|value| Word::try_from(value).ok())
        .ok_or(AssemblerErrorKind::InvalidAddress)
}

/// Literal addresses are encoded directly. Labels must already be known;
/// the bytes pushed for them are rewritten by the back-patch step.
fn target_address(token: &str, layout: &Layout) -> Result<Word, AssemblerErrorKind> {
    if isa::is_numeric(token) {
        return address(token);
    }
    if layout.label(token).is_none() {
        return Err(AssemblerErrorKind::InvalidLabel(token.to_string()));
    }
    Ok(0)
}
