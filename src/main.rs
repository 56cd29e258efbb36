use std::io;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use arduino_console::config::{DEFAULT_BAUD, DEFAULT_PORT};
use arduino_console::{signal, Console, ConsoleConfig, Editor};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Send text commands to an Arduino over a serial port and print its replies
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Serial device path
    #[arg(short, long, env = "ARDUINO_PORT", default_value = DEFAULT_PORT)]
    port: PathBuf,

    /// Bit rate
    #[arg(short, long, env = "ARDUINO_BAUD", default_value_t = DEFAULT_BAUD)]
    baud: u32,

    /// Milliseconds to wait after opening the port before the first command
    #[arg(long, env = "ARDUINO_SETTLE_MS", default_value_t = 2000)]
    settle_ms: u64,

    /// Log filter for diagnostics on stderr (trace, debug, info, warn, error)
    #[arg(short, long, env = "RUST_LOG", default_value = "warn")]
    log_level: String,

    /// Enable debug messages
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn console_config(&self) -> ConsoleConfig {
        ConsoleConfig::new(&self.port, self.baud).with_settle(Duration::from_millis(self.settle_ms))
    }
}

fn init_logging(args: &Args) {
    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);

    signal::install().context("Failed to install SIGINT handler")?;

    let config = args.console_config();
    info!(port = %config.port.display(), baud = config.baud, "connecting");
    let console = Console::open(config).context("Failed to connect to the device")?;

    let mut editor = Editor::new().context("Failed to initialize readline")?;
    console.run(&mut editor, &mut io::stdout())?;
    Ok(())
}
