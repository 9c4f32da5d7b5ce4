use thiserror::Error;

use crate::opcode::Opcode;

/// A fatal condition raised while fetching, decoding or executing an
/// instruction. Any of these stops the execution loop.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    #[error("invalid instruction {opcode}")]
    InvalidInstruction { opcode: Opcode },

    /// `0NNN` machine code routines of the host CPU; usually means the ROM
    /// targets a different machine rather than being corrupt
    #[error("unsupported legacy host call {opcode}")]
    UnsupportedLegacyCall { opcode: Opcode },

    #[error("call stack overflow")]
    StackOverflow,

    #[error("return with an empty call stack")]
    StackUnderflow,

    #[error("key index {key:#04X} is outside 0x0..=0xF")]
    InvalidKeyIndex { key: u8 },

    #[error("memory access out of bounds at {address:#06X}")]
    MemoryOutOfBounds { address: usize },
}

/// The terminal state of an execution loop that stopped on a fault.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("{fault} (instruction at {address:#05X})")]
pub struct Trap {
    /// Address of the instruction that raised the fault
    pub address: u16,
    pub fault: Fault,
}

/// Caller errors. None of these touch a running program.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Chip8Error {
    #[error("program is {size} bytes, at most {max} bytes fit in memory")]
    ProgramTooLarge { size: usize, max: usize },

    #[error("no program loaded")]
    NoProgramLoaded,

    #[error("execution loop is already running")]
    AlreadyRunning,
}
