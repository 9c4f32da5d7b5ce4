use std::panic;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::bus::{DeviceBus, Devices};
use crate::config::Config;
use crate::display::FrameBuffer;
use crate::dump;
use crate::error::{Chip8Error, Fault, Trap};
use crate::operations;
use crate::state::State;

/// # Chip-8
/// Chip-8 is a virtual machine and corresponding interpreted language.
///
/// Tracks:
///  - the machine `State`, which is moved into the execution loop while it runs
///  - the shared `Devices` (display, keypad, timers) with public interfaces for them
///  - the loop's lifecycle: idle, running, stopped on a `Trap`
///
/// Supplies interfaces for:
/// - loading programs
/// - starting, halting and waiting on the execution loop
/// - pressing and releasing keys
/// - advancing the timers
/// - inspecting the frame buffer for rendering by some display
///
/// Every method takes `&self`, so a `Chip8` can be shared with an `Arc` between
/// the thread that drives it and the threads that feed it input.
pub struct Chip8 {
    shared: Arc<Shared>,
    config: Config,
}

/// Everything the execution loop and the embedder touch concurrently
#[derive(Default)]
struct Shared {
    devices: Devices,
    cancel: AtomicBool,
    lifecycle: Mutex<Lifecycle>,
    /// Signalled by the execution loop once it has handed the state back
    stopped: Condvar,
}

#[derive(Default)]
struct Lifecycle {
    /// `None` while the execution loop owns the state
    state: Option<State>,
    worker: Option<JoinHandle<()>>,
    /// The fault the last loop stopped on, until someone collects it
    trap: Option<Trap>,
    loaded: bool,
    running: bool,
    /// Bumped by every `run`
    runs: u64,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until the loop started by run number `runs` has stopped, then
    /// reap its thread. The lock is released while blocked.
    fn wait_stopped<'a>(
        &self,
        mut lifecycle: MutexGuard<'a, Lifecycle>,
        runs: u64,
    ) -> MutexGuard<'a, Lifecycle> {
        while lifecycle.running && lifecycle.runs == runs {
            lifecycle = self
                .stopped
                .wait(lifecycle)
                .unwrap_or_else(PoisonError::into_inner);
        }
        if !lifecycle.running {
            reap(&mut lifecycle);
        }
        lifecycle
    }

    /// Cancel the running loop, if any, and wait for it to stop
    fn stop<'a>(&self, lifecycle: MutexGuard<'a, Lifecycle>) -> MutexGuard<'a, Lifecycle> {
        if lifecycle.running {
            debug!("halt requested");
            self.cancel.store(true, Ordering::SeqCst);
            self.devices.keypad.interrupt();
        }
        let runs = lifecycle.runs;
        self.wait_stopped(lifecycle, runs)
    }
}

/// Join a loop thread that has already handed its state back. The thread
/// only has to return at this point, so this doesn't block on the loop.
fn reap(lifecycle: &mut Lifecycle) {
    if let Some(worker) = lifecycle.worker.take() {
        if let Err(payload) = worker.join() {
            lifecycle.state = Some(State::new());
            lifecycle.loaded = false;
            panic::resume_unwind(payload);
        }
    }
}

impl Chip8 {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let shared = Shared::default();
        shared.lock().state = Some(State::new());
        Chip8 {
            shared: Arc::new(shared),
            config,
        }
    }

    /// Load a program at `PROGRAM_START`.
    ///
    /// A running loop is halted first. Registers, memory, stack, timers and
    /// display are all reset, whether or not the program fits.
    pub fn load(&self, program: &[u8]) -> Result<(), Chip8Error> {
        let mut lifecycle = self.shared.stop(self.shared.lock());
        if let Some(trap) = lifecycle.trap.take() {
            warn!("discarding {} from the previous program", trap);
        }

        let mut state = State::new();
        let loaded = state.load(program);
        self.shared.devices.display.clear();
        self.shared.devices.timers.reset();
        lifecycle.state = Some(state);
        lifecycle.loaded = loaded.is_ok();

        match &loaded {
            Ok(()) => info!("loaded {} byte program", program.len()),
            Err(e) => warn!("{}", e),
        }
        loaded
    }

    /// Start the execution loop on its own thread.
    ///
    /// A loop that already stopped on a fault is reaped first and execution
    /// resumes from the faulting instruction.
    pub fn run(&self) -> Result<(), Chip8Error> {
        let mut lifecycle = self.shared.lock();
        if lifecycle.running {
            return Err(Chip8Error::AlreadyRunning);
        }
        reap(&mut lifecycle);
        if let Some(trap) = lifecycle.trap.take() {
            warn!("unreported {}", trap);
        }
        if !lifecycle.loaded {
            return Err(Chip8Error::NoProgramLoaded);
        }
        let state = match lifecycle.state.take() {
            Some(state) => state,
            None => return Err(Chip8Error::NoProgramLoaded),
        };

        self.shared.cancel.store(false, Ordering::SeqCst);
        lifecycle.running = true;
        lifecycle.runs = lifecycle.runs.wrapping_add(1);
        let shared = Arc::clone(&self.shared);
        let cycle_delay = self.config.cycle_delay;
        lifecycle.worker = Some(thread::spawn(move || {
            let mut handback = Handback {
                shared: &shared,
                outcome: None,
            };
            handback.outcome = Some(execution_loop(&shared, state, cycle_delay));
        }));

        info!("execution loop started at {:#05X}", state.pc);
        Ok(())
    }

    /// Stop the execution loop and block until it has let go of the machine.
    ///
    /// Returns the trap if the loop had already stopped on a fault. Does
    /// nothing when the loop is idle.
    pub fn halt(&self) -> Option<Trap> {
        let mut lifecycle = self.shared.stop(self.shared.lock());
        lifecycle.trap.take()
    }

    /// Block until the execution loop stops, which it only does by itself on
    /// a fault. Returns immediately when idle.
    pub fn wait(&self) -> Option<Trap> {
        let lifecycle = self.shared.lock();
        let runs = lifecycle.runs;
        let mut lifecycle = self.shared.wait_stopped(lifecycle, runs);
        lifecycle.trap.take()
    }

    /// Halt and return the machine to its power-on state with no program
    pub fn reset(&self) {
        let mut lifecycle = self.shared.stop(self.shared.lock());
        self.shared.devices.display.clear();
        self.shared.devices.timers.reset();
        lifecycle.state = Some(State::new());
        lifecycle.trap = None;
        lifecycle.loaded = false;
        debug!("machine reset");
    }

    /// Set the pressed status of key
    ///
    /// # Arguments
    /// * `key` the 4-bit index of the key that was pressed
    pub fn press(&self, key: u8) -> Result<(), Fault> {
        self.shared.devices.keypad.press(key)
    }

    /// Unset the pressed status of key
    ///
    /// # Arguments
    /// * `key` the 4-bit index of the key that was released
    pub fn release(&self, key: u8) -> Result<(), Fault> {
        self.shared.devices.keypad.release(key)
    }

    /// Decrement the delay and sound timers; call at `TIMER_FREQUENCY_HZ`
    pub fn tick(&self) {
        self.shared.devices.timers.tick();
    }

    /// A snapshot of the frame buffer
    pub fn display(&self) -> FrameBuffer {
        self.shared.devices.display.snapshot()
    }

    /// Returns the FrameBuffer if the display changed since the last call
    pub fn frame(&self) -> Option<FrameBuffer> {
        self.shared.devices.display.take_changed()
    }

    pub fn is_program_loaded(&self) -> bool {
        self.shared.lock().loaded
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock().running
    }

    /// Whether a beeper should be sounding
    pub fn is_sound_active(&self) -> bool {
        self.shared.devices.timers.sound() > 0
    }

    /// Whether the loop is blocked on `FX0A`
    pub fn is_awaiting_key(&self) -> bool {
        self.shared.devices.keypad.is_waiting()
    }

    /// Human readable dump of the machine for debugging.
    ///
    /// Registers and memory belong to the loop while it runs, so a dump taken
    /// then only shows the devices.
    pub fn diagnostic_dump(&self) -> String {
        let lifecycle = self.shared.lock();
        dump::format(lifecycle.state.as_ref(), &self.shared.devices)
    }
}

impl Default for Chip8 {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Chip8 {
    fn drop(&mut self) {
        self.halt();
    }
}

/// Hands the loop's state back to the lifecycle and wakes everyone waiting
/// for it to stop. Runs on drop so a panicking loop still marks itself
/// stopped.
struct Handback<'a> {
    shared: &'a Shared,
    outcome: Option<(State, Option<Trap>)>,
}

impl Drop for Handback<'_> {
    fn drop(&mut self) {
        let mut lifecycle = self.shared.lock();
        if let Some((state, trap)) = self.outcome.take() {
            info!("execution loop stopped at {:#05X}", state.pc);
            lifecycle.state = Some(state);
            lifecycle.trap = trap;
        }
        lifecycle.running = false;
        self.shared.stopped.notify_all();
    }
}

/// Fetch, decode and execute until cancelled or a fault is raised.
///
/// Cancellation is checked before every fetch; `FX0A` checks it while blocked.
fn execution_loop(shared: &Shared, mut state: State, cycle_delay: Duration) -> (State, Option<Trap>) {
    let mut bus = DeviceBus::new(&shared.devices, &shared.cancel);

    let trap = loop {
        if shared.cancel.load(Ordering::SeqCst) {
            break None;
        }

        let address = state.pc;
        match operations::step(&state, &mut bus) {
            Ok(next) => state = next,
            Err(fault) => {
                let trap = Trap { address, fault };
                error!("{}", trap);
                break Some(trap);
            }
        }

        if cycle_delay > Duration::ZERO {
            thread::sleep(cycle_delay);
        }
    };

    (state, trap)
}
