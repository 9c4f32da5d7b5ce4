use std::fmt;

use crate::bus::Devices;
use crate::state::State;

const BYTES_PER_LINE: usize = 16;

/// Render timers, the last key, registers and memory as text. `state` is
/// `None` while the execution loop owns it.
pub fn format(state: Option<&State>, devices: &Devices) -> String {
    Dump {
        state,
        delay: devices.timers.delay(),
        sound: devices.timers.sound(),
        key: devices.keypad.latest(),
    }
    .to_string()
}

struct Dump<'a> {
    state: Option<&'a State>,
    delay: u8,
    sound: u8,
    key: Option<u8>,
}

impl fmt::Display for Dump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DT: {}  ST: {}  Key: ", self.delay, self.sound)?;
        match self.key {
            Some(key) => writeln!(f, "{:X}", key)?,
            None => writeln!(f, "none")?,
        }

        let state = match self.state {
            Some(state) => state,
            None => return writeln!(f, "registers and memory unavailable while running"),
        };

        for (row, registers) in state.v.chunks(4).enumerate() {
            for (column, value) in registers.iter().enumerate() {
                write!(f, "V{:X}: {:#04X}  ", row * 4 + column, value)?;
            }
            writeln!(f)?;
        }
        writeln!(f, "I: {:#05X}  PC: {:#05X}  SP: {}", state.i, state.pc, state.sp)?;
        writeln!(f, "Stack: {:03X?}", state.call_stack())?;

        writeln!(f, "Memory:")?;
        for (line, bytes) in state.memory.chunks(BYTES_PER_LINE).enumerate() {
            write!(f, "{:#06X}:", line * BYTES_PER_LINE)?;
            for byte in bytes {
                write!(f, " {:02X}", byte)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
