//! Ctrl-C while waiting for the board. Lives in its own test binary because
//! the interrupt flag is process-wide and never resets.

mod common;

use std::thread;
use std::time::{Duration, Instant};

use arduino_console::console::{BANNER, DISCONNECTED, RESPONSE_TIMEOUT};
use arduino_console::{signal, Script};
use common::{run, FakeBoard};
use nix::sys::pthread::{pthread_kill, pthread_self};
use nix::sys::signal::Signal;

#[test]
fn sigint_during_exchange_ends_the_session() {
    signal::install().unwrap();

    let board = FakeBoard::new();
    let console = board.console();
    let board = board.serve(1, |_| None);

    let me = pthread_self();
    let interrupter = thread::spawn(move || {
        thread::sleep(Duration::from_millis(300));
        pthread_kill(me, Signal::SIGINT).unwrap();
    });

    let mut script = Script::lines(["rs -s ping", "set 1 90", "exit"]);
    let started = Instant::now();
    let lines = run(console, &mut script);

    assert!(started.elapsed() < RESPONSE_TIMEOUT);
    assert_eq!(lines, [BANNER, DISCONNECTED]);
    assert_eq!(script.remaining(), 2);
    assert!(signal::interrupted());
    interrupter.join().unwrap();
    let (_, seen) = board.join().unwrap();
    assert_eq!(seen, ["rs -s ping"]);
}
