//! Process lifecycle for the `logforged` binary: CLI parsing, config
//! loading, daemonization, the pidfile, signal handling, and the janitor
//! (spec.md §4.7, §6). Everything downstream of config -- the pipeline,
//! actions, and inputs -- lives in `logforge_core`/`logforge_forward`/
//! `logforge_docker`; this crate only wires them together and answers to
//! the process's signals.

pub mod capabilities;
pub mod cli;
pub mod config;
pub mod daemon;
pub mod daemonize;
pub mod janitor;
pub mod pidfile;
pub mod signals;

pub use cli::{Args, ExitCode};
pub use daemon::Daemon;
pub use pidfile::PidFile;
pub use signals::SignalEvent;
