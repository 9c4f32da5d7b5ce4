use std::time::Duration;

/// Tunables for the execution loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Pause between two instructions. Zero runs the program as fast as the
    /// host allows.
    pub cycle_delay: Duration,
}

impl Config {
    /// Throttle the loop to roughly `ips` instructions per second.
    /// An `ips` of 0 leaves the loop unthrottled.
    pub fn from_instructions_per_second(ips: u64) -> Self {
        let cycle_delay = if ips == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(1_000_000_000 / ips)
        };
        Config { cycle_delay }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            cycle_delay: Duration::ZERO,
        }
    }
}
