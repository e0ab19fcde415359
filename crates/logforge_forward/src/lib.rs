//! The omfwd-style forwarder: a pool of remote targets bound as a single
//! ruleset action, each with its own TCP/UDP connection, framing,
//! compression, and suspend/resume state (spec.md §4.5).

pub mod compress;
pub mod framing;
pub mod pool;
pub mod target;

pub use pool::ForwarderAction;
pub use target::{Target, TargetStats};
