use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use log::debug;

use crate::constants::KEY_COUNT;
use crate::error::Fault;

/// # Keypad
/// Chip-8 input is generated with a hexadecimal keypad.
///
/// ```text
/// |1|2|3|C|
/// |4|5|6|D|
/// |7|8|9|E|
/// |A|0|B|F|
/// ```
///
/// Key events arrive from the embedder while the execution loop reads the
/// pressed state and may block in `wait_for_key` until the next press.
#[derive(Debug, Default)]
pub struct Keypad {
    keys: Mutex<Keys>,
    pressed: Condvar,
}

#[derive(Debug, Default)]
struct Keys {
    down: [bool; KEY_COUNT],
    latest: Option<u8>,
    /// Incremented by every press; lets a waiter tell a new press from a held key
    presses: u64,
    waiting: bool,
}

fn check(key: u8) -> Result<usize, Fault> {
    if (key as usize) < KEY_COUNT {
        Ok(key as usize)
    } else {
        Err(Fault::InvalidKeyIndex { key })
    }
}

impl Keypad {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Keys> {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark `key` as held and wake a pending `wait_for_key`
    pub fn press(&self, key: u8) -> Result<(), Fault> {
        let index = check(key)?;
        let mut keys = self.lock();
        keys.down[index] = true;
        keys.latest = Some(key);
        keys.presses = keys.presses.wrapping_add(1);
        debug!("key {:X} pressed", key);
        self.pressed.notify_one();
        Ok(())
    }

    pub fn release(&self, key: u8) -> Result<(), Fault> {
        let index = check(key)?;
        self.lock().down[index] = false;
        debug!("key {:X} released", key);
        Ok(())
    }

    pub fn is_pressed(&self, key: u8) -> Result<bool, Fault> {
        let index = check(key)?;
        Ok(self.lock().down[index])
    }

    /// The most recently pressed key, if any key was ever pressed
    pub fn latest(&self) -> Option<u8> {
        self.lock().latest
    }

    /// Whether some thread is parked in `wait_for_key`
    pub fn is_waiting(&self) -> bool {
        self.lock().waiting
    }

    /// Block until a key is pressed after this call and return it.
    ///
    /// Returns `None` once `cancel` is set; whoever sets it must call
    /// `interrupt` afterwards to wake the waiter.
    pub fn wait_for_key(&self, cancel: &AtomicBool) -> Option<u8> {
        let mut keys = self.lock();
        let seen = keys.presses;
        keys.waiting = true;
        debug!("waiting for a key press");

        while keys.presses == seen {
            if cancel.load(Ordering::SeqCst) {
                keys.waiting = false;
                debug!("key wait cancelled");
                return None;
            }
            keys = self
                .pressed
                .wait(keys)
                .unwrap_or_else(PoisonError::into_inner);
        }

        keys.waiting = false;
        keys.latest
    }

    /// Wake every waiter so it can observe its cancellation flag
    pub fn interrupt(&self) {
        let _keys = self.lock();
        self.pressed.notify_all();
    }
}
