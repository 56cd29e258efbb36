//! A pseudo-terminal that plays the board on the other end of the port.

#![allow(dead_code)]

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::os::fd::{AsRawFd, BorrowedFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use arduino_console::{Console, ConsoleConfig, Script};
use nix::fcntl::OFlag;
use nix::poll::{PollFd, PollFlags, PollTimeout};
use nix::pty::{grantpt, posix_openpt, ptsname_r, unlockpt, PtyMaster};

pub struct FakeBoard {
    master: PtyMaster,
    pub path: String,
    // Keeps the slave side alive after the console closes its handle.
    _slave: File,
}

impl FakeBoard {
    pub fn new() -> Self {
        let master = posix_openpt(OFlag::O_RDWR | OFlag::O_NOCTTY).unwrap();
        grantpt(&master).unwrap();
        unlockpt(&master).unwrap();
        let path = ptsname_r(&master).unwrap();
        let slave = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(nix::libc::O_NOCTTY)
            .open(&path)
            .unwrap();
        Self {
            master,
            path,
            _slave: slave,
        }
    }

    pub fn config(&self) -> ConsoleConfig {
        ConsoleConfig::new(&self.path, 9600).with_settle(Duration::ZERO)
    }

    pub fn console(&self) -> Console {
        Console::open(self.config()).unwrap()
    }

    /// Answer `count` commands. `respond` gets each command and returns
    /// the delay and raw bytes to send back. Returns the commands seen.
    pub fn serve<F>(self, count: usize, respond: F) -> JoinHandle<(FakeBoard, Vec<String>)>
    where
        F: FnMut(&str) -> Option<(Duration, Vec<u8>)> + Send + 'static,
    {
        thread::spawn(move || self.answer(count, respond))
    }

    /// Like [`FakeBoard::serve`], then unplug: both ends of the pty close.
    pub fn serve_then_hang_up<F>(self, count: usize, respond: F) -> JoinHandle<Vec<String>>
    where
        F: FnMut(&str) -> Option<(Duration, Vec<u8>)> + Send + 'static,
    {
        thread::spawn(move || {
            let (board, seen) = self.answer(count, respond);
            drop(board);
            seen
        })
    }

    fn answer<F>(self, count: usize, mut respond: F) -> (FakeBoard, Vec<String>)
    where
        F: FnMut(&str) -> Option<(Duration, Vec<u8>)>,
    {
        let FakeBoard { master, path, _slave } = self;
        let mut reader = BufReader::new(master);
        let mut seen = Vec::new();
        for _ in 0..count {
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            let command = line.trim_end_matches('\n').to_string();
            if let Some((delay, reply)) = respond(&command) {
                thread::sleep(delay);
                reader.get_mut().write_all(&reply).unwrap();
            }
            seen.push(command);
        }
        let board = FakeBoard {
            master: reader.into_inner(),
            path,
            _slave,
        };
        (board, seen)
    }

    /// True if the console wrote anything within the given window.
    pub fn has_pending_output(&self, within: Duration) -> bool {
        let fd = unsafe { BorrowedFd::borrow_raw(self.master.as_raw_fd()) };
        let mut pollfd = [PollFd::new(fd, PollFlags::POLLIN)];
        let timeout = PollTimeout::try_from(within).unwrap();
        nix::poll::poll(&mut pollfd, timeout).unwrap() > 0
    }

    pub fn send(&mut self, bytes: &[u8]) {
        self.master.write_all(bytes).unwrap();
    }
}

/// Point `link` at `target`, replacing whatever it pointed at before.
pub fn repoint(link: &PathBuf, target: &str) {
    let staging = link.with_extension("next");
    std::os::unix::fs::symlink(target, &staging).unwrap();
    std::fs::rename(&staging, link).unwrap();
}

/// Run a whole session and return the transcript lines.
pub fn run(console: Console, script: &mut Script) -> Vec<String> {
    let mut out = Vec::new();
    console.run(script, &mut out).unwrap();
    String::from_utf8(out)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}
