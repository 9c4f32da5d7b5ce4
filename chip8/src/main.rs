use std::error::Error;
use std::path::PathBuf;
use std::process;

use clap::Parser;

mod run;

/// Run a Chip-8 program headless and print the final frame
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Path to a raw Chip-8 ROM
    rom: PathBuf,

    /// Instructions executed per second; 0 runs unthrottled
    #[arg(long, default_value_t = 700)]
    ips: u64,

    /// Stop after this many seconds instead of running until the program faults
    #[arg(long)]
    seconds: Option<f64>,

    /// Print registers and memory when the program stops
    #[arg(long)]
    dump: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = Args::parse();

    let options = run::Options {
        instructions_per_second: args.ips,
        time_limit: args.seconds.map(std::time::Duration::from_secs_f64),
        dump: args.dump,
    };
    // run has already reported the trap
    if run::run(&args.rom, &options)?.is_some() {
        process::exit(1);
    }
    Ok(())
}
