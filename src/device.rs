use std::collections::VecDeque;
use std::io;
use std::mem;
use std::path::Path;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::connection::Connection;
use crate::serial_port::{port_recv, port_send};
use crate::signal;

/// Line transport to a device on a serial port.
///
/// Owns the [`Connection`] and a FIFO of bytes received but not yet
/// handed out. All calls block the caller; there is no background thread,
/// so at most one transaction is ever in flight.
pub struct Device {
    buff: VecDeque<u8>,
    conn: Connection,
}

impl Device {
    /// Opens the serial port right away and fails if it cannot be opened.
    pub fn open(path: impl AsRef<Path>, baud: u32) -> io::Result<Self> {
        let mut conn = Connection::new(path, baud);
        conn.open()?;
        Ok(Self {
            buff: VecDeque::new(),
            conn,
        })
    }

    /// Closes the serial port
    pub fn close(&mut self) {
        self.conn.close();
        self.buff.clear();
    }

    /// Returns true if the connection is open
    pub fn is_open(&self) -> bool {
        self.conn.is_open()
    }

    /// Make sure the port is open. Returns true if it had to be reopened,
    /// in which case anything buffered from the old connection is dropped.
    pub fn reconnect(&mut self) -> io::Result<bool> {
        let reopened = self.conn.connect()?;
        if reopened {
            self.buff.clear();
        }
        Ok(reopened)
    }

    /// Discard everything received so far, both what sits in the kernel
    /// buffer and what was already pulled into ours.
    pub fn clear_rx_buff(&mut self) -> io::Result<()> {
        let result = if self.conn.is_open() {
            self.receive_from_port(None, None)
        } else {
            Ok(())
        };
        if !self.buff.is_empty() {
            debug!(bytes = self.buff.len(), "discarding stale input");
        }
        self.buff.clear();
        result
    }

    /// Transmits data to the serial port.
    ///
    /// A signal other than the operator interrupt resumes the write where it
    /// stopped, so the device never sees a command twice.
    pub fn transmit(&mut self, tx_bytes: &[u8], deadline: Instant) -> io::Result<()> {
        let mut pending = VecDeque::from(tx_bytes.to_vec());
        loop {
            let file = self.conn.open()?;
            match port_send(file, &mut pending, &mut self.buff, deadline) {
                Err(err) if is_spurious_wakeup(&err) => continue,
                result => return self.settle_result(result),
            }
        }
    }

    /// Transmits a string to the serial port.
    pub fn transmit_str(&mut self, str: impl AsRef<str>, deadline: Instant) -> io::Result<()> {
        self.transmit(str.as_ref().as_bytes(), deadline)
    }

    /// Receives data from the serial port.
    ///
    /// With a delimiter, returns as soon as one complete chunk ending in it is
    /// buffered. Otherwise, or when the deadline passes first, returns all
    /// buffered data. `None` means nothing was received.
    pub fn receive(
        &mut self,
        until: Option<u8>,
        deadline: Option<Instant>,
    ) -> io::Result<Option<Vec<u8>>> {
        // Check if we can skip reading from port
        if let Some(delimiter) = until {
            if let Some(data) = self.collect_from_buff(CollectKind::UntilOrNothing(delimiter)) {
                return Ok(Some(data));
            }
        }

        self.receive_from_port(until, deadline)?;

        let colltype = match until {
            None => CollectKind::Everything,
            Some(delimiter) => CollectKind::UntilOrEverything(delimiter),
        };
        Ok(self.collect_from_buff(colltype))
    }

    /// Receives data from the serial port and converts to a String.
    /// Bytes that are not valid UTF-8 become U+FFFD.
    pub fn receive_string(
        &mut self,
        until: Option<u8>,
        deadline: Option<Instant>,
    ) -> io::Result<Option<String>> {
        let result = self.receive(until, deadline)?;
        Ok(result.map(|x| String::from_utf8_lossy(&x).to_string()))
    }

    /// Change the duration of cooloff after disconnecting due to an error
    /// and before a new connection attempt is made.
    pub fn set_cooloff_duration(&mut self, cooloff: Option<Duration>) {
        self.conn.set_cooloff_duration(cooloff);
    }

    fn receive_from_port(
        &mut self,
        until: Option<u8>,
        deadline: Option<Instant>,
    ) -> io::Result<()> {
        loop {
            let file = self.conn.open()?;
            match port_recv(file, &mut self.buff, until, deadline) {
                Err(err) if is_spurious_wakeup(&err) => continue,
                result => return self.settle_result(result),
            }
        }
    }

    /// Drop the connection on real I/O failures. An interrupted wait leaves
    /// the port healthy.
    fn settle_result(&mut self, result: io::Result<()>) -> io::Result<()> {
        if let Err(err) = &result {
            if err.kind() != io::ErrorKind::Interrupted {
                warn!(path = %self.conn.path().display(), error = %err, "serial port failure, closing");
                self.conn.fail();
            }
        }
        result
    }

    /// Collect data from the RX FIFO buffer.
    fn collect_from_buff(&mut self, collect: CollectKind) -> Option<Vec<u8>> {
        if self.buff.is_empty() {
            return None;
        }
        match collect {
            CollectKind::Everything => self.collect_from_buff_everything(),
            CollectKind::UntilOrEverything(delimiter) => {
                if let Some(pos) = self.buff.iter().position(|x| x == &delimiter) {
                    self.collect_from_buff_count(pos + 1)
                } else {
                    self.collect_from_buff_everything()
                }
            }
            CollectKind::UntilOrNothing(delimiter) => {
                if let Some(pos) = self.buff.iter().position(|x| x == &delimiter) {
                    self.collect_from_buff_count(pos + 1)
                } else {
                    None
                }
            }
        }
    }

    /// Collect the given count of elements from the RX FIFO buffer
    fn collect_from_buff_count(&mut self, count: usize) -> Option<Vec<u8>> {
        if self.buff.len() <= count {
            return self.collect_from_buff_everything();
        }
        let mut data = self.buff.split_off(count);
        mem::swap(&mut self.buff, &mut data);
        Some(data.into())
    }

    /// Collect all data from the RX FIFO buffer
    fn collect_from_buff_everything(&mut self) -> Option<Vec<u8>> {
        if self.buff.is_empty() {
            return None;
        }
        Some(mem::take(&mut self.buff).into())
    }
}

/// Interrupted by a signal that is not the operator's Ctrl-C.
fn is_spurious_wakeup(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::Interrupted && !signal::interrupted()
}

enum CollectKind {
    /// Consume all data from the buffer
    Everything,
    /// Consume all data from the buffer but only until the given byte.
    /// If the byte is not found then consume the whole buffer.
    UntilOrEverything(u8),
    /// Consume data from the buffer but only until the given byte.
    /// If the byte is not found then do not consume any data from the buffer.
    UntilOrNothing(u8),
}
