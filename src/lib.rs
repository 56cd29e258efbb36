//! # Arduino Console
//!
//! A Linux-only line console for a microcontroller on a serial port:
//! 1. Opens the `/dev/tty*` file non-blocking, in raw mode, at the given baud rate.
//! 2. Waits for the board to come out of its reset-on-connect.
//! 3. Reads a command from the operator, drops stale input, sends the command.
//! 4. Prints the first line the device answers, or an error after 2 seconds.
//! 5. Repeats until `exit`, Ctrl-C or end of input, then closes the port.
//!
//! Replies are waited for with `poll(2)` bounded by a deadline. Nothing spins.
//!
//! **This is an "async-less" library**, and it is intended to remain that way.

mod connection;
mod serial_port;

pub mod config;
pub mod console;
pub mod device;
pub mod error;
pub mod input;
pub mod signal;

pub use config::ConsoleConfig;
pub use console::{Console, ExchangeOutcome};
pub use device::Device;
pub use error::{ConsoleError, Result};
pub use input::{Editor, Input, LineSource, Script};
