use std::io::{self, Write};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::config::ConsoleConfig;
use crate::device::Device;
use crate::error::{ConsoleError, Result};
use crate::input::{Input, LineSource};
use crate::signal;

/// How long the device has to answer a command.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(2);

pub const EXIT_SENTINEL: &str = "exit";
pub const PROMPT: &str = ">>> ";
pub const BANNER: &str = "连接成功，输入指令 rs [-s] <action> / set <id> <deg>：";
pub const REPLY_TAG: &str = "[Arduino]";
pub const ERROR_TAG: &str = "[ERROR]";
pub const UNRESPONSIVE: &str = "[ERROR] Arduino 无响应";
pub const DISCONNECTED: &str = "连接已断开";

/// How one command/reply exchange ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeOutcome {
    /// First non-blank line the device sent back, trimmed.
    Reply(String),
    /// Nothing arrived before the deadline.
    Timeout,
}

/// Interactive console bound to one device.
pub struct Console {
    device: Device,
    config: ConsoleConfig,
}

impl Console {
    /// Validates the configuration and opens the port. Fails fast if the
    /// port cannot be opened.
    pub fn open(config: ConsoleConfig) -> Result<Self> {
        config.validate()?;
        let device = Device::open(&config.port, config.baud).map_err(|source| ConsoleError::Open {
            path: config.port.clone(),
            source,
        })?;
        let mut console = Self { device, config };
        console.device.set_cooloff_duration(console.config.cooloff);
        Ok(console)
    }

    /// True while the port is open. False after a failure until the next
    /// exchange reopens it.
    pub fn is_connected(&self) -> bool {
        self.device.is_open()
    }

    /// Send one command and wait for a single line back.
    ///
    /// Reopens the port first if an earlier failure closed it, and waits for
    /// the board to reset. Stale input is dropped before the write. Blank
    /// reply lines are skipped. An unterminated line still buffered at the
    /// deadline counts as the reply.
    pub fn exchange(&mut self, command: &str) -> Result<ExchangeOutcome> {
        match self.device.reconnect() {
            Ok(true) => {
                info!(path = %self.config.port.display(), "serial port reopened");
                self.settle();
            }
            Ok(false) => {}
            Err(err) if err.kind() == io::ErrorKind::QuotaExceeded => {
                return Err(ConsoleError::Reconnecting(self.config.port.clone()));
            }
            Err(err) => return Err(port_error(err)),
        }
        self.device.clear_rx_buff().map_err(port_error)?;

        let write_deadline = Instant::now() + RESPONSE_TIMEOUT;
        self.device
            .transmit_str(format!("{command}\n"), write_deadline)
            .map_err(port_error)?;
        debug!(command, "command sent");

        let deadline = Instant::now() + RESPONSE_TIMEOUT;
        loop {
            let line = match self.device.receive_string(Some(b'\n'), Some(deadline)) {
                Ok(Some(line)) => line,
                Ok(None) => return Ok(ExchangeOutcome::Timeout),
                Err(err) => return Err(port_error(err)),
            };
            let line = line.trim();
            if !line.is_empty() {
                debug!(reply = line, "reply received");
                return Ok(ExchangeOutcome::Reply(line.to_string()));
            }
            if Instant::now() >= deadline {
                return Ok(ExchangeOutcome::Timeout);
            }
        }
    }

    /// Run the session until `exit`, an interrupt or end of input, then close
    /// the port. The disconnect message is printed on every way out.
    pub fn run<S, W>(mut self, input: &mut S, out: &mut W) -> Result<()>
    where
        S: LineSource,
        W: Write,
    {
        let result = self.session(input, out);
        self.device.close();
        info!(path = %self.config.port.display(), "session closed");
        emit(out, DISCONNECTED)?;
        result
    }

    fn session<S, W>(&mut self, input: &mut S, out: &mut W) -> Result<()>
    where
        S: LineSource,
        W: Write,
    {
        self.settle();
        emit(out, BANNER)?;

        loop {
            if signal::interrupted() {
                break;
            }
            let line = match input.read_line(PROMPT)? {
                Input::Line(line) => line,
                Input::Interrupted | Input::Eof => break,
            };
            let command = line.trim();
            if command == EXIT_SENTINEL {
                break;
            }
            if command.is_empty() {
                continue;
            }

            match self.exchange(command) {
                Ok(ExchangeOutcome::Reply(reply)) => emit(out, format!("{REPLY_TAG} {reply}"))?,
                Ok(ExchangeOutcome::Timeout) => {
                    debug!(command, "no response within {:?}", RESPONSE_TIMEOUT);
                    emit(out, UNRESPONSIVE)?;
                }
                Err(ConsoleError::Cancelled) => break,
                Err(ConsoleError::Io(err)) => emit(out, format!("{ERROR_TAG} {err}"))?,
                Err(err @ ConsoleError::Reconnecting(_)) => emit(out, format!("{ERROR_TAG} {err}"))?,
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Opening the port resets most boards. Give them time to boot.
    fn settle(&self) {
        if !self.config.settle.is_zero() {
            debug!(settle = ?self.config.settle, "waiting for the board to reset");
            thread::sleep(self.config.settle);
        }
    }
}

fn port_error(err: io::Error) -> ConsoleError {
    if err.kind() == io::ErrorKind::Interrupted && signal::interrupted() {
        ConsoleError::Cancelled
    } else {
        ConsoleError::Io(err)
    }
}

fn emit(out: &mut impl Write, line: impl AsRef<str>) -> Result<()> {
    writeln!(out, "{}", line.as_ref()).map_err(ConsoleError::Terminal)?;
    out.flush().map_err(ConsoleError::Terminal)
}
