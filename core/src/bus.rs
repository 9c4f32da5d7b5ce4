use std::sync::atomic::AtomicBool;

use crate::display::Display;
use crate::error::Fault;
use crate::keypad::Keypad;
use crate::timers::Timers;

/// Everything an instruction can reach outside of `State`.
///
/// Operations only talk to the display, keypad and timers through this
/// trait, so each of them can be exercised without a running loop.
pub trait Bus {
    fn clear_display(&mut self);

    /// XOR a sprite onto the display; returns whether a lit pixel was erased
    fn draw_sprite(&mut self, x: u8, y: u8, sprite: &[u8]) -> bool;

    fn is_key_pressed(&self, key: u8) -> Result<bool, Fault>;

    /// Block until the next key press. `None` means the wait was cancelled.
    fn wait_for_key(&mut self) -> Option<u8>;

    fn delay_timer(&self) -> u8;

    fn set_delay_timer(&mut self, value: u8);

    fn set_sound_timer(&mut self, value: u8);

    fn random_byte(&mut self) -> u8;
}

/// The devices shared between the execution loop and the embedder. Each one
/// carries its own lock.
#[derive(Debug, Default)]
pub struct Devices {
    pub display: Display,
    pub keypad: Keypad,
    pub timers: Timers,
}

impl Devices {
    pub fn new() -> Self {
        Self::default()
    }
}

/// `Bus` over a set of `Devices`, as seen by one execution loop.
pub struct DeviceBus<'a> {
    devices: &'a Devices,
    cancel: &'a AtomicBool,
}

impl<'a> DeviceBus<'a> {
    /// `cancel` aborts a pending `wait_for_key`
    pub fn new(devices: &'a Devices, cancel: &'a AtomicBool) -> Self {
        DeviceBus { devices, cancel }
    }
}

impl Bus for DeviceBus<'_> {
    fn clear_display(&mut self) {
        self.devices.display.clear();
    }

    fn draw_sprite(&mut self, x: u8, y: u8, sprite: &[u8]) -> bool {
        self.devices.display.draw(x, y, sprite)
    }

    fn is_key_pressed(&self, key: u8) -> Result<bool, Fault> {
        self.devices.keypad.is_pressed(key)
    }

    fn wait_for_key(&mut self) -> Option<u8> {
        self.devices.keypad.wait_for_key(self.cancel)
    }

    fn delay_timer(&self) -> u8 {
        self.devices.timers.delay()
    }

    fn set_delay_timer(&mut self, value: u8) {
        self.devices.timers.set_delay(value);
    }

    fn set_sound_timer(&mut self, value: u8) {
        self.devices.timers.set_sound(value);
    }

    fn random_byte(&mut self) -> u8 {
        rand::random()
    }
}
