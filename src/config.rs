use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ConsoleError, Result};
use crate::serial_port::baud_speed;

pub const DEFAULT_PORT: &str = "/dev/ttyACM0";
pub const DEFAULT_BAUD: u32 = 9600;
/// Most boards reset when the port opens and need about this long to boot.
pub const DEFAULT_SETTLE: Duration = Duration::from_secs(2);
/// Minimum time between reconnect attempts after a port failure.
pub const DEFAULT_COOLOFF: Duration = Duration::from_secs(1);

/// Where the device lives and how to talk to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleConfig {
    /// Serial device path, e.g. `/dev/ttyACM0`.
    pub port: PathBuf,
    /// Bit rate.
    pub baud: u32,
    /// Pause after opening the port before the first command is sent.
    pub settle: Duration,
    /// Wait after a port failure before reopening. `None` retries right away.
    pub cooloff: Option<Duration>,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            port: PathBuf::from(DEFAULT_PORT),
            baud: DEFAULT_BAUD,
            settle: DEFAULT_SETTLE,
            cooloff: Some(DEFAULT_COOLOFF),
        }
    }
}

impl ConsoleConfig {
    pub fn new(port: impl Into<PathBuf>, baud: u32) -> Self {
        Self {
            port: port.into(),
            baud,
            ..Self::default()
        }
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn with_cooloff(mut self, cooloff: Option<Duration>) -> Self {
        self.cooloff = cooloff;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.port.as_os_str().is_empty() {
            return Err(ConsoleError::Config("port path is empty".to_string()));
        }
        if baud_speed(self.baud).is_none() {
            return Err(ConsoleError::UnsupportedBaud(self.baud));
        }
        Ok(())
    }
}
