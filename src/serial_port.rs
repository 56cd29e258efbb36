use std::{collections::VecDeque, fs::File, io::{self, Error, Read, Write}, os::fd::{AsRawFd, BorrowedFd, FromRawFd}, path::Path, time::Instant};

use nix::{errno::Errno, poll::{PollFd, PollFlags, PollTimeout}};
use termios::{os::target::speed_t, Termios};


/// Size of the scratch buffer used for a single `read(2)` call.
const READ_CHUNK: usize = 4096;


/// Open the tty under the given path for non blocking direct i/o access,
/// switch it to raw mode and set the requested baud rate.
///
/// # Safety
///
/// The fd passed to `File::from_raw_fd` is an owned file descriptor and it is
/// open because we get it from the fcntl::open function call. Ownership moves
/// into the `File` right away so the fd is closed on every error path below.
pub fn port_open(path: impl AsRef<Path>, baud: u32) -> io::Result<File> {
    use nix::fcntl::OFlag;
    use nix::sys::stat::Mode;

    let speed = baud_speed(baud).ok_or_else(|| {
        Error::new(io::ErrorKind::InvalidInput, format!("unsupported baud rate {baud}"))
    })?;

    let oflag =
        // Open for reading and writing.
        OFlag::O_RDWR |
        // Do not make the board our controlling terminal.
        OFlag::O_NOCTTY |
        // Never block, neither on open nor on read/write.
        OFlag::O_NONBLOCK |
        OFlag::O_NDELAY;

    let fd = nix::fcntl::open(path.as_ref(), oflag, Mode::empty())?;
    let file = unsafe {
        File::from_raw_fd(fd)
    };

    let fd = file.as_raw_fd();
    let mut termios = Termios::from_fd(fd)?;
    termios::cfmakeraw(&mut termios);
    // Ignore modem control lines and enable the receiver.
    termios.c_cflag |= termios::CLOCAL | termios::CREAD;
    termios::cfsetspeed(&mut termios, speed)?;
    termios::tcsetattr(fd, termios::TCSANOW, &termios)?;

    Ok(file)
}


/// Map a numeric bit rate onto the termios speed constant.
pub fn baud_speed(baud: u32) -> Option<speed_t> {
    use termios::os::target as t;

    let speed = match baud {
        50 => t::B50,
        75 => t::B75,
        110 => t::B110,
        134 => t::B134,
        150 => t::B150,
        200 => t::B200,
        300 => t::B300,
        600 => t::B600,
        1200 => t::B1200,
        1800 => t::B1800,
        2400 => t::B2400,
        4800 => t::B4800,
        9600 => t::B9600,
        19200 => t::B19200,
        38400 => t::B38400,
        57600 => t::B57600,
        115200 => t::B115200,
        230400 => t::B230400,
        460800 => t::B460800,
        500000 => t::B500000,
        576000 => t::B576000,
        921600 => t::B921600,
        1000000 => t::B1000000,
        1152000 => t::B1152000,
        1500000 => t::B1500000,
        2000000 => t::B2000000,
        2500000 => t::B2500000,
        3000000 => t::B3000000,
        3500000 => t::B3500000,
        4000000 => t::B4000000,
        _ => return None,
    };
    Some(speed)
}


#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub enum PollKind {
    ForRead,
    ForWrite,
}


#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub enum PollResult {
    TimedOut,
    ReadReady,
    WriteReady,
    /// A signal arrived while waiting.
    Interrupted,
    Undocumented,
}


/// Poll the port to check if a read or write can be performed.
///
/// If deadline is provided then the call will block and wait until
/// the port becomes ready or the deadline passes. Without a deadline
/// the call returns immediately.
///
/// # Safety
///
/// The fd remains open and valid for the duration of the returned BorrowedFd object
/// because we borrow a raw pointer from the `&File` only for the duration of the function.
pub fn port_poll(port: &File, poll: PollKind, deadline: Option<Instant>) -> io::Result<PollResult> {
    let fd = unsafe {
        BorrowedFd::borrow_raw(port.as_raw_fd())
    };
    let timeout = match deadline {
        Some(deadline) => {
            let time_left = deadline.saturating_duration_since(Instant::now());
            PollTimeout::try_from(time_left).unwrap_or(PollTimeout::MAX)
        },
        None => PollTimeout::ZERO,
    };
    let input_flags = match poll {
        PollKind::ForRead => {
            PollFlags::POLLIN |
            PollFlags::POLLPRI |
            PollFlags::POLLRDNORM |
            PollFlags::POLLRDBAND
        },
        PollKind::ForWrite => {
            PollFlags::POLLPRI |
            PollFlags::POLLOUT |
            PollFlags::POLLWRNORM |
            PollFlags::POLLWRBAND
        },
    };
    let mut pollfd = [PollFd::new(fd, input_flags)];
    match nix::poll::poll(&mut pollfd, timeout) {
        // SIGINT and friends. The caller decides whether to give up.
        Err(Errno::EINTR) => Ok(PollResult::Interrupted),
        // Upon failure, poll() shall return -1 and set errno to indicate the error.
        Err(errno) => Err(Error::from(errno)),
        // Never happens in practice, errno might have info.
        Ok(rc) if rc < 0 => Err(Error::from(Errno::last())),
        // Timed out and no file descriptors have been selected.
        Ok(0) => Ok(PollResult::TimedOut),
        // Our single pollfd has selected events.
        Ok(_) => {
            let revents = match pollfd[0].revents() {
                Some(flags) => flags,
                None => return Ok(PollResult::TimedOut),
            };

            // The board was unplugged or the other end of the tty closed
            if revents.intersects(PollFlags::POLLHUP) {
                return Err(Error::other("POLLHUP: Device has been disconnected"));
            }
            if revents.intersects(PollFlags::POLLNVAL) {
                return Err(Error::other("POLLNVAL: Invalid fd member"));
            }
            if revents.intersects(PollFlags::POLLERR) {
                return Err(Error::other("POLLERR: An error has occurred"));
            }

            // Success - Write ready
            let pf_write_ready =
                PollFlags::POLLOUT |
                PollFlags::POLLWRNORM |
                PollFlags::POLLWRBAND;
            if revents.intersects(pf_write_ready) {
                return Ok(PollResult::WriteReady);
            }

            // Success - Read ready
            let pf_read_ready =
                PollFlags::POLLIN |
                PollFlags::POLLRDNORM |
                PollFlags::POLLRDBAND |
                PollFlags::POLLPRI;
            if revents.intersects(pf_read_ready) {
                return Ok(PollResult::ReadReady);
            }

            Ok(PollResult::Undocumented)
        }
    }
}


/// Read everything currently available from the port. EOF, Interrupt and
/// TimedOut errors are treated as not an error and an Ok variant is returned.
pub fn port_read(port: &mut File, data: &mut VecDeque<u8>) -> io::Result<()> {
    let mut buf = [0; READ_CHUNK];
    loop {
        match port.read(&mut buf) {
            Ok(0) => {
                // EOF - No more data
                return Ok(())
            }
            Ok(n) => {
                // OK - Data was read, try again until the port runs dry
                data.extend(&buf[0..n]);
            }
            Err(err) => match err.kind() {
                io::ErrorKind::Interrupted => {
                    // Read interrupt - Ignored. The caller polls again.
                    return Ok(())
                },
                io::ErrorKind::TimedOut => {
                    // Read timeout - Ignored. Deadlines are enforced by poll.
                    return Ok(())
                },
                io::ErrorKind::WouldBlock => {
                    // Would block - The kernel buffer is empty.
                    return Ok(())
                }
                _ => {
                    // I/O Error
                    return Err(err)
                },
            },
        }
    }
}


/// Write as much of the queued data as the port accepts right now.
/// Written bytes are drained from the front of `data`.
pub fn port_write(port: &mut File, data: &mut VecDeque<u8>) -> io::Result<()> {
    let buf = data.make_contiguous();
    match port.write(buf) {
        Ok(0) => {
            // Nothing accepted - Ignored. The caller polls again.
            Ok(())
        },
        Ok(n) => {
            // OK - Wrote some data
            let _ = data.drain(0..n);
            Ok(())
        }
        Err(err) => match err.kind() {
            io::ErrorKind::Interrupted => {
                // Write interrupt - Ignored. Nothing was written.
                Ok(())
            },
            io::ErrorKind::TimedOut => {
                // Write timeout - Ignored. Deadlines are enforced by poll.
                Ok(())
            },
            io::ErrorKind::WouldBlock => {
                // Would block - The kernel TX buffer is full.
                Ok(())
            }
            _ => {
                // I/O Error
                Err(err)
            },
        },
    }
}


/// Send the queued data to the port or timeout.
///
/// Written bytes leave `send` as they go, so an interrupted call can be
/// resumed with the same queue. Anything the device sends while we are
/// still writing lands in `recv` so the kernel RX buffer never fills up.
pub fn port_send(port: &mut File, send: &mut VecDeque<u8>, recv: &mut VecDeque<u8>, deadline: Instant) -> io::Result<()> {
    loop {
        if send.is_empty() {
            return Ok(());
        }

        // Check if the port is ready
        match port_poll(port, PollKind::ForWrite, Some(deadline))? {
            PollResult::TimedOut => {
                // Deadline is reached. Checked below.
            },
            PollResult::ReadReady => {
                // The port has out of band data in rx buffer
                port_read(port, recv)?;
            },
            PollResult::WriteReady => {
                // The port is ready for sending data
                port_write(port, send)?;
            },
            PollResult::Interrupted => {
                // A signal arrived. The caller decides whether to resume.
                return Err(io::ErrorKind::Interrupted.into());
            },
            PollResult::Undocumented => {
                tracing::trace!("poll for write returned undocumented revents");
            }
        }

        if send.is_empty() {
            return Ok(());
        }

        // Check if deadline has passed
        if deadline <= Instant::now() {
            return Err(io::ErrorKind::TimedOut.into());
        }
    }
}


/// Receive data from the port until a given byte or until deadline.
///
/// Returns `Interrupted` if a signal arrives while blocked in poll. Data
/// received so far stays in `buff`, so the call can simply be repeated.
pub fn port_recv(port: &mut File, buff: &mut VecDeque<u8>, until: Option<u8>, deadline: Option<Instant>) -> io::Result<()> {
    loop {
        // Check if the port is ready
        match port_poll(port, PollKind::ForRead, deadline)? {
            PollResult::TimedOut => {
                return Ok(());
            },
            PollResult::ReadReady => {
                port_read(port, buff)?;
            },
            PollResult::Interrupted => {
                return Err(io::ErrorKind::Interrupted.into());
            },
            PollResult::WriteReady => {
                tracing::trace!("poll for read returned write ready");
            }
            PollResult::Undocumented => {
                tracing::trace!("poll for read returned undocumented revents");
            }
        }

        // Stop as soon as the delimiter is buffered
        if let Some(delimiter) = until {
            if buff.contains(&delimiter) {
                return Ok(());
            }
        }
    }
}
