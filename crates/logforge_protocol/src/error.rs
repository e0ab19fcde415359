//! Closed error taxonomy shared across the daemon (spec.md §7 "Error
//! Handling Design").

use thiserror::Error;

/// The fixed set of error classes the core and its satellite crates can
/// raise. Kept closed (no catch-all variant) so a `match` over it at a
/// call site is exhaustive -- new failure modes are added here, not
/// smuggled in as a string.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[error("message exceeds configured max-line and no oversize policy covers it")]
    Oversize,

    #[error("queue is full and flow control required an immediate decision")]
    QueueFull,

    #[error("ratelimiter discarded message for source")]
    RateLimited,

    #[error("action is suspended pending a resume timer")]
    ActionSuspended,

    #[error("action has been permanently disabled after exhausting retries")]
    ActionDisabled,

    #[error("connection to forwarder target failed")]
    ConnectFailed,

    #[error("write to forwarder target failed")]
    SendFailed,

    #[error("TLS handshake or certificate verification failed")]
    TlsFailed,

    #[error("peer is not in the permitted-peer list")]
    PeerNotPermitted,

    #[error("malformed message could not be parsed")]
    ParseFailed,

    #[error("requested ruleset, action, or target does not exist")]
    NotFound,

    #[error("configuration value out of range or contradictory")]
    InvalidConfig,

    #[error("requested action kind is not implemented")]
    Unsupported,

    #[error("I/O failure at the system boundary")]
    Io,

    #[error("the Docker API returned an unexpected response")]
    DockerApi,

    #[error("pidfile is already locked by a running instance")]
    AlreadyRunning,

    #[error("operation was interrupted by shutdown")]
    ShuttingDown,
}

/// The error type returned across crate boundaries: a classified `kind`
/// plus a human-readable `context` string and an optional source.
#[derive(Debug, Error)]
#[error("{kind}: {context}")]
pub struct LogforgeError {
    pub kind: ErrorKind,
    pub context: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl LogforgeError {
    pub fn new(kind: ErrorKind, context: impl Into<String>) -> Self {
        Self {
            kind,
            context: context.into(),
            source: None,
        }
    }

    pub fn with_source(
        kind: ErrorKind,
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }
}

pub type Result<T> = std::result::Result<T, LogforgeError>;
