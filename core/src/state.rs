use crate::constants::{
    MAX_PROGRAM_SIZE, MEMORY_SIZE, PROGRAM_START, SPRITE_SHEET, STACK_DEPTH,
};
use crate::error::{Chip8Error, Fault};
use crate::opcode::Opcode;

/// A snapshot of the Chip8 machine state owned by the execution loop
///
/// ## CPU
/// Registers
/// - (v) 16 primary 8-bit registers (V0..VF)
///     - the first 15 (V0..VE) are general purpose registers
///     - the 16th (VF) is the carry, borrow and collision flag
/// - (i) a 12-bit memory address register
///
/// Counter
/// - (pc) a 12-bit program counter pointing at the next word to fetch
///
/// Pointer
/// - (sp) the number of return addresses on the stack
///
/// ## Memory
/// - 16 entry stack of return addresses
/// - 4096 bytes of addressable memory
///     - 0x000..0x050 holds the sprite sheet
///     - programs are loaded at 0x200
///
/// The frame buffer, keypad and timers are shared with the embedder and live
/// outside of `State`; see `Devices`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct State {
    pub v: [u8; 16],
    pub i: u16,
    pub pc: u16,
    pub sp: u8,
    pub stack: [u16; STACK_DEPTH],
    pub memory: [u8; MEMORY_SIZE],
}

impl State {
    /// Zeroed state with the sprite sheet installed at address 0.
    pub fn new() -> Self {
        let mut memory = [0; MEMORY_SIZE];
        memory[..SPRITE_SHEET.len()].copy_from_slice(&SPRITE_SHEET);

        State {
            v: [0; 16],
            i: 0,
            pc: 0,
            sp: 0,
            stack: [0; STACK_DEPTH],
            memory,
        }
    }

    /// Reset the state and copy `program` to `PROGRAM_START`.
    ///
    /// A program that doesn't fit is rejected and the state is left reset.
    pub fn load(&mut self, program: &[u8]) -> Result<(), Chip8Error> {
        *self = State::new();
        if program.len() > MAX_PROGRAM_SIZE {
            return Err(Chip8Error::ProgramTooLarge {
                size: program.len(),
                max: MAX_PROGRAM_SIZE,
            });
        }

        let start = PROGRAM_START as usize;
        self.memory[start..start + program.len()].copy_from_slice(program);
        self.pc = PROGRAM_START;
        Ok(())
    }

    /// Gets the opcode currently pointed at by the pc.
    /// Memory is stored as bytes, but opcodes are 16 bits so we combine two subsequent bytes.
    pub fn fetch(&self) -> Result<Opcode, Fault> {
        let bytes = self.memory_slice(self.pc, 2)?;
        Ok(Opcode::from_bytes(bytes[0], bytes[1]))
    }

    /// `len` bytes of memory starting at `address`
    pub fn memory_slice(&self, address: u16, len: usize) -> Result<&[u8], Fault> {
        let range = Self::range(address, len)?;
        Ok(&self.memory[range])
    }

    pub fn memory_slice_mut(&mut self, address: u16, len: usize) -> Result<&mut [u8], Fault> {
        let range = Self::range(address, len)?;
        Ok(&mut self.memory[range])
    }

    fn range(address: u16, len: usize) -> Result<std::ops::Range<usize>, Fault> {
        let start = address as usize;
        let end = start + len;
        if end > MEMORY_SIZE {
            return Err(Fault::MemoryOutOfBounds { address: start });
        }
        Ok(start..end)
    }

    /// The return addresses currently on the stack, oldest first
    pub fn call_stack(&self) -> &[u16] {
        &self.stack[..self.sp as usize]
    }
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}
