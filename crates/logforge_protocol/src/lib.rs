//! Shared message, filter, config, and error types used across the
//! Logforge daemon's crates.
//!
//! `logforge_protocol` has no runtime of its own: it is the vocabulary
//! that `logforge_core`, `logforge_forward`, `logforge_docker`, and
//! `logforge_lifecycle` all speak, so that a `Message` constructed by an
//! input crate means the same thing by the time an action crate forwards
//! it.

pub mod config;
pub mod defaults;
pub mod error;
pub mod filters;
pub mod stats;
pub mod types;

pub use error::{ErrorKind, LogforgeError, Result};
pub use filters::{ActionFilter, HostSelector, MainFilter, PriorityMask, PropertyFilter, PropertyOp, TagSelector};
pub use types::{
    Facility, FlowControl, Message, MessageFlags, OversizePolicy, Pri, PriError, Severity, Timestamp,
};
