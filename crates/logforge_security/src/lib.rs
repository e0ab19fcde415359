//! TLS for forwarder targets.
//!
//! Provides:
//! - **driver**: a `TlsDriver` trait over the concrete TLS backend, so
//!   `logforge_forward` never touches `native_tls` types directly
//! - **peers**: permitted-peer matching against a verified certificate's
//!   subject

pub mod driver;
pub mod peers;

pub use driver::{NativeTlsDriver, TlsDriver, TlsStream};
pub use peers::PermittedPeers;
