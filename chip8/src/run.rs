use std::error::Error;
use std::fs;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use log::info;

use chip8_core::{frame_to_text, Chip8, Config, Trap, TIMER_FREQUENCY_HZ};

pub struct Options {
    pub instructions_per_second: u64,
    /// Run until the program faults when `None`
    pub time_limit: Option<Duration>,
    pub dump: bool,
}

/// Load `rom`, run it and tick the timers until the time limit passes or the
/// program stops on a fault. Returns the fault, if any.
pub fn run(rom: &Path, options: &Options) -> Result<Option<Trap>, Box<dyn Error>> {
    let chip8 = Chip8::with_config(Config::from_instructions_per_second(
        options.instructions_per_second,
    ));

    // Load ROM
    let program = fs::read(rom)?;
    chip8.load(&program)?;
    info!("loaded {}", rom.display());
    chip8.run()?;

    // Timers tick at a fixed rate regardless of the instruction rate
    let tick_time = Duration::from_nanos(1_000_000_000 / TIMER_FREQUENCY_HZ);
    let started = Instant::now();
    let mut last_tick = started;

    while chip8.is_running() {
        if let Some(limit) = options.time_limit {
            if started.elapsed() >= limit {
                break;
            }
        }

        chip8.tick();

        // Handle timing
        let current_time = Instant::now();
        let elapsed_tick_time = current_time - last_tick;
        if tick_time > elapsed_tick_time {
            thread::sleep(tick_time - elapsed_tick_time);
        }
        last_tick = Instant::now();
    }

    let trap = chip8.halt();
    if let Some(trap) = &trap {
        eprintln!("{}", trap);
    }

    println!("{}", frame_to_text(&chip8.display()));
    if options.dump || trap.is_some() {
        println!("{}", chip8.diagnostic_dump());
    }
    Ok(trap)
}
