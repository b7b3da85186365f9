use crate::{
    error::StateError,
    isa::{Word, MEMORY_SIZE},
    symbol::REGISTER_COUNT,
};

/// Represents complete machine state during runtime.
///
/// Instructions and data share the same memory.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct RunState {
    /// 4096 words of memory
    mem: Box<[Word; MEMORY_SIZE]>,
    /// Program counter, always the address of the next instruction to fetch
    pc: Word,
    /// 16 general purpose registers
    reg: [i32; REGISTER_COUNT],
}

impl RunState {
    /// Zeroed registers and memory, PC at 0.
    pub fn new() -> Self {
        RunState {
            mem: Box::new([0; MEMORY_SIZE]),
            pc: 0,
            reg: [0; REGISTER_COUNT],
        }
    }

    /// Copy `words` into memory starting at address 0. Registers are left as they are.
    pub fn load_program(&mut self, words: &[Word]) -> Result<(), StateError> {
        if words.len() > MEMORY_SIZE {
            return Err(StateError::ProgramTooLarge { len: words.len() });
        }
        self.mem[..words.len()].copy_from_slice(words);
        Ok(())
    }

    pub fn read_register(&self, i: usize) -> Result<i32, StateError> {
        self.reg.get(i).copied().ok_or(StateError::InvalidRegister(i))
    }

    pub fn write_register(&mut self, i: usize, val: i32) -> Result<(), StateError> {
        let slot = self.reg.get_mut(i).ok_or(StateError::InvalidRegister(i))?;
        *slot = val;
        Ok(())
    }

    pub fn read_memory(&self, addr: usize) -> Result<Word, StateError> {
        self.mem.get(addr).copied().ok_or(StateError::InvalidAddress(addr))
    }

    pub fn write_memory(&mut self, addr: usize, val: Word) -> Result<(), StateError> {
        let slot = self.mem.get_mut(addr).ok_or(StateError::InvalidAddress(addr))?;
        *slot = val;
        Ok(())
    }

    pub fn pc(&self) -> Word {
        self.pc
    }

    pub(crate) fn set_pc(&mut self, pc: Word) {
        debug_assert!((pc as usize) < MEMORY_SIZE);
        self.pc = pc;
    }

    /// Snapshot of the register file.
    pub fn registers(&self) -> &[i32; REGISTER_COUNT] {
        &self.reg
    }

    /// Snapshot of the whole memory.
    pub fn memory(&self) -> &[Word] {
        &self.mem[..]
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_program_at_zero() {
        let mut state = RunState::new();
        state.write_register(3, 7).unwrap();
        state.load_program(&[0x1105, 0xF000]).unwrap();
        assert_eq!(state.read_memory(0), Ok(0x1105));
        assert_eq!(state.read_memory(1), Ok(0xF000));
        assert_eq!(state.read_memory(2), Ok(0));
        // Registers survive a reload
        assert_eq!(state.read_register(3), Ok(7));
        assert_eq!(state.pc(), 0);
    }

    #[test]
    fn load_program_too_large() {
        let mut state = RunState::new();
        assert!(state.load_program(&vec![0xF000; MEMORY_SIZE]).is_ok());
        assert_eq!(
            state.load_program(&vec![0; MEMORY_SIZE + 1]),
            Err(StateError::ProgramTooLarge {
                len: MEMORY_SIZE + 1
            })
        );
    }

    #[test]
    fn bounds_checked_registers() {
        let mut state = RunState::new();
        assert_eq!(state.write_register(15, -4), Ok(()));
        assert_eq!(state.read_register(15), Ok(-4));
        assert_eq!(state.read_register(16), Err(StateError::InvalidRegister(16)));
        assert_eq!(
            state.write_register(usize::MAX, 1),
            Err(StateError::InvalidRegister(usize::MAX))
        );
    }

    #[test]
    fn bounds_checked_memory() {
        let mut state = RunState::new();
        assert_eq!(state.write_memory(4095, 0xBEEF), Ok(()));
        assert_eq!(state.read_memory(4095), Ok(0xBEEF));
        assert_eq!(state.read_memory(4096), Err(StateError::InvalidAddress(4096)));
        assert_eq!(
            state.write_memory(4096, 1),
            Err(StateError::InvalidAddress(4096))
        );
        assert_eq!(state.memory().len(), MEMORY_SIZE);
    }
}
