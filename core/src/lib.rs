pub use chip8::Chip8;
pub use config::Config;
pub use constants::{DISPLAY_HEIGHT, DISPLAY_WIDTH, KEY_COUNT, TIMER_FREQUENCY_HZ};
pub use display::{frame_to_text, FrameBuffer};
pub use error::{Chip8Error, Fault, Trap};

pub mod bus;
mod chip8;
mod config;
pub mod constants;
pub mod display;
mod dump;
pub mod error;
pub mod instruction;
pub mod keypad;
pub mod opcode;
pub mod operations;
pub mod state;
pub mod timers;
