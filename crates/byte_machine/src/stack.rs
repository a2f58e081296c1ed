use heapless::Vec;

use crate::{MachineFault, STACK_CAPACITY, Word};

/// Bounded LIFO of machine words used by push/pop and call/return.
#[derive(Debug, Default)]
pub struct Stack {
    words: Vec<Word, STACK_CAPACITY>,
}

impl Stack {
    pub fn new() -> Self {
        Self { words: Vec::new() }
    }

    /// Fails once the stack would reach `STACK_CAPACITY` entries.
    pub fn push(&mut self, value: Word) -> Result<(), MachineFault> {
        let next_len = self
            .words
            .len()
            .checked_add(1)
            .ok_or(MachineFault::StackOverflow)?;
        if next_len >= STACK_CAPACITY {
            return Err(MachineFault::StackOverflow);
        }
        self.words
            .push(value)
            .map_err(|_| MachineFault::StackOverflow)
    }

    pub fn pop(&mut self) -> Result<Word, MachineFault> {
        self.words.pop().ok_or(MachineFault::StackUnderflow)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn clear(&mut self) {
        self.words.clear();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn pops_in_reverse_order() -> Result<(), MachineFault> {
        let mut stack = Stack::new();
        stack.push(1)?;
        stack.push(2)?;
        assert_eq!(stack.pop()?, 2);
        assert_eq!(stack.pop()?, 1);
        assert!(stack.is_empty());
        Ok(())
    }

    #[test]
    fn pop_on_empty_underflows() {
        let mut stack = Stack::new();
        assert!(matches!(stack.pop(), Err(MachineFault::StackUnderflow)));
    }

    #[test]
    fn overflows_before_reaching_capacity() -> Result<(), MachineFault> {
        let mut stack = Stack::new();
        for value in 0..(STACK_CAPACITY - 1) {
            stack.push(value as Word)?;
        }
        assert_eq!(stack.len(), STACK_CAPACITY - 1);
        assert!(matches!(stack.push(0), Err(MachineFault::StackOverflow)));
        assert_eq!(stack.len(), STACK_CAPACITY - 1);
        Ok(())
    }
}
