use std::io;
use std::path::PathBuf;

use rustyline::error::ReadlineError;
use thiserror::Error;

/// Everything that can go wrong in a console session.
///
/// A device that stays silent is not an error, see
/// [`ExchangeOutcome::Timeout`](crate::console::ExchangeOutcome::Timeout).
#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Unsupported baud rate: {0}")]
    UnsupportedBaud(u32),

    #[error("Failed to open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The port failed moments ago and the cool-off has not passed yet.
    #[error("Port {} is reconnecting, try again shortly", .0.display())]
    Reconnecting(PathBuf),

    /// Serial port failure in the middle of a session.
    #[error("Serial port error: {0}")]
    Io(#[from] io::Error),

    #[error("Terminal output failed: {0}")]
    Terminal(#[source] io::Error),

    #[error("Operator input failed: {0}")]
    Input(#[from] ReadlineError),

    /// The operator interrupted an exchange.
    #[error("Cancelled by operator")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, ConsoleError>;
