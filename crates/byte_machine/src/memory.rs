//! Flat byte-addressed memory split into a data segment and a code segment.
//!
//! `[0, STORED_SIZE)` is the data segment, `[STORED_SIZE, TOTAL_SIZE)` holds
//! the bytecode. Words are two bytes, big-endian. Every accessor is bounds
//! checked; a violation is a [`MachineFault`] that ends execution.

use alloc::boxed::Box;
use alloc::vec;

use crate::{MachineFault, STORED_SIZE, TOTAL_SIZE, Word};

pub struct Memory {
    data: Box<[u8]>,
}

impl Memory {
    pub fn new() -> Self {
        Self {
            data: vec![0u8; TOTAL_SIZE].into_boxed_slice(),
        }
    }

    pub fn read(&self, address: usize) -> Result<u8, MachineFault> {
        self.data
            .get(address)
            .copied()
            .ok_or(MachineFault::OutOfBounds(address))
    }

    pub fn write(&mut self, address: usize, value: u8) -> Result<(), MachineFault> {
        let slot = self
            .data
            .get_mut(address)
            .ok_or(MachineFault::OutOfBounds(address))?;
        *slot = value;
        Ok(())
    }

    pub fn read_word(&self, address: usize) -> Result<Word, MachineFault> {
        let low_address = next_address(address)?;
        let high = self.read(address)?;
        let low = self.read(low_address)?;
        Ok(Word::from_be_bytes([high, low]))
    }

    pub fn write_word(&mut self, address: usize, value: Word) -> Result<(), MachineFault> {
        let low_address = next_address(address)?;
        // Check both bytes before touching either one.
        if low_address >= TOTAL_SIZE {
            return Err(MachineFault::OutOfBounds(low_address));
        }
        let [high, low] = value.to_be_bytes();
        self.write(address, high)?;
        self.write(low_address, low)
    }

    pub fn read_stored(&self, address: usize) -> Result<u8, MachineFault> {
        check_stored(address)?;
        self.read(address)
    }

    pub fn write_stored(&mut self, address: usize, value: u8) -> Result<(), MachineFault> {
        check_stored(address)?;
        self.write(address, value)
    }

    pub fn read_stored_word(&self, address: usize) -> Result<Word, MachineFault> {
        check_stored(address)?;
        check_stored(next_address(address)?)?;
        self.read_word(address)
    }

    pub fn write_stored_word(&mut self, address: usize, value: Word) -> Result<(), MachineFault> {
        check_stored(address)?;
        check_stored(next_address(address)?)?;
        self.write_word(address, value)
    }

    /// Copies bytecode to the start of the code segment.
    pub fn load_code(&mut self, code: &[u8]) -> Result<(), MachineFault> {
        let segment = self
            .data
            .get_mut(STORED_SIZE..)
            .ok_or(MachineFault::CodeTooLarge(code.len()))?;
        let target = segment
            .get_mut(..code.len())
            .ok_or(MachineFault::CodeTooLarge(code.len()))?;
        target.copy_from_slice(code);
        tracing::debug!(bytes = code.len(), "loaded code segment");
        Ok(())
    }

    pub fn data_segment(&self) -> &[u8] {
        self.data.get(..STORED_SIZE).unwrap_or_default()
    }

    pub fn code_segment(&self) -> &[u8] {
        self.data.get(STORED_SIZE..).unwrap_or_default()
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

fn next_address(address: usize) -> Result<usize, MachineFault> {
    address
        .checked_add(1)
        .ok_or(MachineFault::OutOfBounds(address))
}

fn check_stored(address: usize) -> Result<(), MachineFault> {
    if address >= STORED_SIZE {
        return Err(MachineFault::StoredOutOfBounds(address));
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn read_write_round_trip() -> Result<(), MachineFault> {
        let mut memory = Memory::new();
        memory.write(10, 42)?;
        assert_eq!(memory.read(10)?, 42);
        Ok(())
    }

    #[test]
    fn write_past_total_size_is_rejected() {
        let mut memory = Memory::new();
        assert!(matches!(
            memory.write(TOTAL_SIZE, 55),
            Err(MachineFault::OutOfBounds(TOTAL_SIZE))
        ));
        assert!(matches!(
            memory.read(TOTAL_SIZE + 10),
            Err(MachineFault::OutOfBounds(_))
        ));
        // Rejected every time, not just the first.
        assert!(memory.write(TOTAL_SIZE, 55).is_err());
    }

    #[test]
    fn words_are_big_endian() -> Result<(), MachineFault> {
        let mut memory = Memory::new();
        memory.write_word(100, 0x1234)?;
        assert_eq!(memory.read(100)?, 0x12);
        assert_eq!(memory.read(101)?, 0x34);
        assert_eq!(memory.read_word(100)?, 0x1234);
        Ok(())
    }

    #[test]
    fn word_straddling_the_end_is_rejected_without_partial_write() -> Result<(), MachineFault> {
        let mut memory = Memory::new();
        let last = TOTAL_SIZE - 1;
        assert!(matches!(
            memory.write_word(last, 0xffff),
            Err(MachineFault::OutOfBounds(TOTAL_SIZE))
        ));
        assert_eq!(memory.read(last)?, 0);
        assert!(memory.read_word(last).is_err());
        Ok(())
    }

    #[test]
    fn stored_accessors_stop_at_the_boundary() -> Result<(), MachineFault> {
        let mut memory = Memory::new();
        memory.write_stored(STORED_SIZE - 1, 7)?;
        assert_eq!(memory.read_stored(STORED_SIZE - 1)?, 7);
        assert!(matches!(
            memory.write_stored(STORED_SIZE, 1),
            Err(MachineFault::StoredOutOfBounds(STORED_SIZE))
        ));
        assert!(matches!(
            memory.read_stored(STORED_SIZE + 5),
            Err(MachineFault::StoredOutOfBounds(_))
        ));
        assert!(matches!(
            memory.write_stored_word(STORED_SIZE - 1, 1),
            Err(MachineFault::StoredOutOfBounds(STORED_SIZE))
        ));
        // The plain accessor may still reach the code segment.
        memory.write(STORED_SIZE, 1)?;
        Ok(())
    }

    #[test]
    fn load_code_starts_at_the_code_segment() -> Result<(), MachineFault> {
        let mut memory = Memory::new();
        memory.load_code(&[1, 2, 3])?;
        assert_eq!(memory.read(STORED_SIZE)?, 1);
        assert_eq!(memory.read(STORED_SIZE + 2)?, 3);
        assert_eq!(memory.code_segment().get(..3), Some(&[1u8, 2, 3][..]));
        assert!(memory.data_segment().iter().all(|byte| *byte == 0));
        Ok(())
    }

    #[test]
    fn load_code_rejects_oversized_programs() -> Result<(), MachineFault> {
        let mut memory = Memory::new();
        let fits = vec![0u8; TOTAL_SIZE - STORED_SIZE];
        memory.load_code(&fits)?;
        let too_big = vec![0u8; TOTAL_SIZE - STORED_SIZE + 1];
        assert!(matches!(
            memory.load_code(&too_big),
            Err(MachineFault::CodeTooLarge(_))
        ));
        Ok(())
    }
}
