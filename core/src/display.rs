use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::constants::{DISPLAY_HEIGHT, DISPLAY_WIDTH};

/// The FrameBuffer is indexed as [y][x]; each cell is 0 or 1
pub type FrameBuffer = [[u8; DISPLAY_WIDTH]; DISPLAY_HEIGHT];

/// # Display
/// The Chip-8 display is composed of 64x32 black/white pixels.
///
/// The frame is shared between the execution loop, which draws into it, and
/// the embedder, which reads it for rendering. Both sides go through the same
/// lock, so a snapshot never observes half of a sprite.
#[derive(Debug)]
pub struct Display {
    frame: Mutex<Frame>,
}

#[derive(Debug)]
struct Frame {
    pixels: FrameBuffer,
    changed: bool,
}

impl Display {
    pub fn new() -> Self {
        Display {
            frame: Mutex::new(Frame {
                pixels: [[0; DISPLAY_WIDTH]; DISPLAY_HEIGHT],
                changed: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Frame> {
        self.frame.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Turn every pixel off
    pub fn clear(&self) {
        let mut frame = self.lock();
        frame.pixels = [[0; DISPLAY_WIDTH]; DISPLAY_HEIGHT];
        frame.changed = true;
    }

    /// XOR `sprite` onto the frame with its top left corner at (x, y).
    /// Returns whether any lit pixel was turned off.
    pub fn draw(&self, x: u8, y: u8, sprite: &[u8]) -> bool {
        let mut frame = self.lock();
        frame.changed = true;
        draw_sprite(&mut frame.pixels, x, y, sprite)
    }

    /// A copy of the current frame
    pub fn snapshot(&self) -> FrameBuffer {
        self.lock().pixels
    }

    /// A copy of the current frame if it changed since the last call
    pub fn take_changed(&self) -> Option<FrameBuffer> {
        let mut frame = self.lock();
        if frame.changed {
            frame.changed = false;
            Some(frame.pixels)
        } else {
            None
        }
    }
}

impl Default for Display {
    fn default() -> Self {
        Self::new()
    }
}

/// Columns wrap around to the left edge; rows past the bottom edge are
/// dropped.
pub fn draw_sprite(pixels: &mut FrameBuffer, x: u8, y: u8, sprite: &[u8]) -> bool {
    let mut collision = false;

    for (row, byte) in sprite.iter().enumerate() {
        let py = y as usize + row;
        if py >= DISPLAY_HEIGHT {
            break;
        }
        for bit in 0..8 {
            let px = (x as usize + bit) % DISPLAY_WIDTH;
            let pixel_value = (byte >> (7 - bit)) & 1;
            collision |= (pixel_value & pixels[py][px]) == 1;
            pixels[py][px] ^= pixel_value;
        }
    }

    collision
}

/// Render a frame as rows of `#` and `.`
pub fn frame_to_text(frame: &FrameBuffer) -> String {
    frame
        .iter()
        .map(|row| {
            row.iter()
                .map(|&cell| if cell == 1 { '#' } else { '.' })
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("\n")
}
