//! Signal handling (spec.md §4.7, §9 "signal handler does only
//! write(1 byte, pipe_wr); main loop selects on the pipe"). `signal-hook`'s
//! iterator already implements that self-pipe pattern internally, so this
//! module just bridges its blocking iterator thread onto a channel the
//! main loop can select on alongside everything else.

use crossbeam_channel::{Receiver, Sender};
use signal_hook::consts::{SIGCHLD, SIGHUP, SIGINT, SIGQUIT, SIGTERM, SIGUSR1};
use signal_hook::iterator::Signals;
use std::thread::JoinHandle;

/// The daemon-relevant subset of the signals the controller reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalEvent {
    /// SIGTERM/SIGINT/SIGQUIT: begin orderly shutdown.
    Shutdown,
    /// SIGHUP: reopen log sinks, reset the stderr error budget, refresh
    /// cached hostname (spec.md §4.7).
    Reload,
    /// SIGCHLD: reap any terminated children (module helper processes;
    /// currently unused by any shipped action, but spec.md §9 requires
    /// the reaper loop to exist regardless).
    ChildExited,
    /// SIGUSR1: toggle debug logging at runtime, if it was enabled at
    /// startup (spec.md §4.7).
    ToggleDebug,
}

/// Spawns the `signal-hook` iterator thread and returns a channel the
/// main loop can `recv`/`select` on, plus the join handle so shutdown can
/// wait for the listener thread to exit cleanly.
pub fn spawn_signal_listener() -> std::io::Result<(Receiver<SignalEvent>, JoinHandle<()>)> {
    let mut signals = Signals::new([SIGTERM, SIGINT, SIGQUIT, SIGHUP, SIGCHLD, SIGUSR1])?;
    let (tx, rx): (Sender<SignalEvent>, Receiver<SignalEvent>) = crossbeam_channel::unbounded();

    let handle = std::thread::Builder::new()
        .name("logforge-signals".into())
        .spawn(move || {
            for signal in signals.forever() {
                let event = match signal {
                    SIGTERM | SIGINT | SIGQUIT => SignalEvent::Shutdown,
                    SIGHUP => SignalEvent::Reload,
                    SIGCHLD => SignalEvent::ChildExited,
                    SIGUSR1 => SignalEvent::ToggleDebug,
                    _ => continue,
                };
                if tx.send(event).is_err() {
                    break;
                }
            }
        })
        .expect("spawning signal listener thread");

    Ok((rx, handle))
}

/// Reaps every already-terminated child with a non-blocking `waitpid`
/// loop (spec.md §9's SIGCHLD responsibility). No shipped action spawns
/// child processes today, so this only ever drains zombies left by a
/// module loaded via `-M`.
pub fn reap_children() {
    use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
    use nix::unistd::Pid;

    loop {
        match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) | Err(_) => break,
            Ok(WaitStatus::Exited(_, _)) | Ok(WaitStatus::Signaled(_, _, _)) => continue,
            Ok(_) => continue,
        }
    }
}
