use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use log::{error, info, warn};

use lc3vm::io::StdConsoleIo;
use lc3vm::Vm;

/// An LC-3 emulator
#[derive(Parser, Debug)]
#[command(version, about = "An LC-3 emulator")]
struct Cli {
    /// One or more object files to load before running, in order
    #[arg(required = true, num_args = 1..)]
    images: Vec<PathBuf>,
}

/// Puts the controlling terminal into non-canonical, no-echo mode for the
/// duration of the run and restores the previous mode on drop, so every
/// exit path — normal HALT, a fatal fault, or an early return — leaves the
/// terminal as it found it.
struct RawModeGuard {
    original: termios::Termios,
}

impl RawModeGuard {
    fn new() -> anyhow::Result<Self> {
        use termios::*;
        let fd = 0; // stdin
        let original = Termios::from_fd(fd).context("failed to read terminal attributes")?;
        let mut raw = original;
        raw.c_lflag &= !(ICANON | ECHO);
        tcsetattr(fd, TCSANOW, &raw).context("failed to set raw terminal mode")?;
        Ok(RawModeGuard { original })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = termios::tcsetattr(0, termios::TCSANOW, &self.original);
    }
}

fn main() -> ExitCode {
    env_logger::init();

    // `Cli::parse()` would print a missing-argument error to stderr via
    // `clap::Error::exit`; the usage message is specified to go to standard
    // output, so parse manually and print it ourselves instead.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            print!("{e}");
            let code = match e.kind() {
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => 0,
                _ => 2,
            };
            return ExitCode::from(code);
        }
    };

    let raw_mode = RawModeGuard::new()
        .map_err(|e| warn!("running without raw terminal mode: {e:#}"))
        .ok();

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = Arc::clone(&interrupted);
        if let Err(e) = ctrlc::set_handler(move || {
            interrupted.store(true, Ordering::SeqCst);
        }) {
            warn!("failed to install Ctrl-C handler: {e}");
        }
    }

    let mut vm = Vm::new(StdConsoleIo::new());

    for path in &cli.images {
        match fs::read(path) {
            Ok(bytes) => {
                let origin = vm.load_image(&bytes);
                info!("loaded {} at {origin:#06x}", path.display());
            }
            Err(e) => {
                eprintln!("Failed to load image: {}: {e}", path.display());
                drop(raw_mode);
                return ExitCode::from(1);
            }
        }
    }

    let code = run_until_halt_or_interrupt(&mut vm, &interrupted);
    drop(raw_mode);
    code
}

/// Drives the run loop one instruction's worth of work at a time so the
/// interrupted flag (set by the Ctrl-C handler) can be observed between
/// instructions, never mid-instruction.
fn run_until_halt_or_interrupt(vm: &mut Vm<StdConsoleIo>, interrupted: &AtomicBool) -> ExitCode {
    loop {
        if interrupted.load(Ordering::SeqCst) {
            return ExitCode::from(130);
        }
        match vm.step_once() {
            Ok(true) => return ExitCode::SUCCESS,
            Ok(false) => continue,
            Err(e) => {
                error!("{e}");
                return ExitCode::from(1);
            }
        }
    }
}
