use std::sync::{Mutex, MutexGuard, PoisonError};

/// The delay and sound timers.
///
/// Both count down by one per `tick`, which the embedder calls at
/// `TIMER_FREQUENCY_HZ` independently of how fast instructions execute.
#[derive(Debug, Default)]
pub struct Timers {
    counters: Mutex<Counters>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    delay: u8,
    sound: u8,
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Decrement both timers, stopping at zero
    pub fn tick(&self) {
        let mut counters = self.lock();
        counters.delay = counters.delay.saturating_sub(1);
        counters.sound = counters.sound.saturating_sub(1);
    }

    pub fn delay(&self) -> u8 {
        self.lock().delay
    }

    pub fn sound(&self) -> u8 {
        self.lock().sound
    }

    pub fn set_delay(&self, value: u8) {
        self.lock().delay = value;
    }

    pub fn set_sound(&self, value: u8) {
        self.lock().sound = value;
    }

    pub fn reset(&self) {
        *self.lock() = Counters::default();
    }
}
