use std::{
    fs::File,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use tracing::{debug, info};

use crate::serial_port::port_open;

use crate::config::DEFAULT_COOLOFF;

/// Exclusive owner of the serial port file.
///
/// The port is bound to one path and baud rate for its whole life. After a
/// failure the file is dropped and reopened lazily by the next [`Connection::open`]
/// call, but not before the cool-off period has passed. Dropping the
/// connection closes the port.
pub struct Connection {
    path: PathBuf,
    baud: u32,
    file: Option<File>,
    last_conn_attempt: Option<Instant>,
    cool_time: Option<Duration>,
}

impl Connection {
    pub fn new(path: impl AsRef<Path>, baud: u32) -> Self {
        Self {
            path: path.as_ref().into(),
            baud,
            file: None,
            last_conn_attempt: None,
            cool_time: Some(DEFAULT_COOLOFF),
        }
    }

    /// Opens the port if it is not open yet. Returns true if this call
    /// opened it, which means the board has just been reset.
    pub fn connect(&mut self) -> io::Result<bool> {
        if self.file.is_some() {
            return Ok(false);
        }
        // Skip if cool-off ongoing
        if let Some(cool_time) = self.cool_time {
            if let Some(last_conn) = self.last_conn_attempt {
                if Instant::now() < last_conn + cool_time {
                    return Err(ErrorKind::QuotaExceeded.into());
                }
            }
            self.last_conn_attempt = Some(Instant::now());
        }
        let file = port_open(&self.path, self.baud)?;
        info!(path = %self.path.display(), baud = self.baud, "serial port opened");
        self.last_conn_attempt = None;
        self.file = Some(file);
        Ok(true)
    }

    /// Returns the open port, opening it first if needed.
    pub fn open(&mut self) -> io::Result<&mut File> {
        self.connect()?;
        match self.file.as_mut() {
            Some(file) => Ok(file),
            None => Err(ErrorKind::NotConnected.into()),
        }
    }

    pub fn close(&mut self) {
        if self.file.take().is_some() {
            debug!(path = %self.path.display(), "serial port closed");
        }
    }

    /// Drop the port after an I/O failure. The next reopen waits for the cool-off.
    pub fn fail(&mut self) {
        self.close();
        self.last_conn_attempt = Some(Instant::now());
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Change the duration of cooloff after disconnecting due to an error
    /// and before a new connection attempt is made. If set to None then
    /// another connect attempt is tried without any artificial delays.
    pub fn set_cooloff_duration(&mut self, cooloff: Option<Duration>) {
        self.cool_time = cooloff;
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}
