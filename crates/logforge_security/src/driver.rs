//! TLS driver trait and its `native-tls` implementation.
//!
//! `logforge_forward`'s target pool talks to this trait, not to
//! `native_tls` directly, so a second driver (e.g. an `openssl`-backed
//! one mirroring legacy gtls/ossl naming) can be added later without
//! touching the forwarder's connect/send/reconnect state machine.

use logforge_protocol::config::TlsConfig;
use logforge_protocol::error::{ErrorKind, LogforgeError, Result};
use std::fs;
use std::io::{self, Read, Write};
use std::net::TcpStream;

/// A connected, optionally-TLS-wrapped byte stream. `logforge_forward`
/// holds this, not a raw `TcpStream`, so plaintext and TLS targets share
/// one send path.
pub enum TlsStream {
    Plain(TcpStream),
    Tls(Box<native_tls::TlsStream<TcpStream>>),
}

impl Read for TlsStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            TlsStream::Plain(s) => s.read(buf),
            TlsStream::Tls(s) => s.read(buf),
        }
    }
}

impl Write for TlsStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            TlsStream::Plain(s) => s.write(buf),
            TlsStream::Tls(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            TlsStream::Plain(s) => s.flush(),
            TlsStream::Tls(s) => s.flush(),
        }
    }
}

/// Wraps (or doesn't) a freshly-connected TCP stream according to a
/// target's `TlsConfig` (spec.md §4.5 "gtls/ossl driver options", scoped
/// down to what this daemon actually offers).
pub trait TlsDriver: Send + Sync {
    fn wrap_client(&self, stream: TcpStream, target_host: &str, config: &TlsConfig) -> Result<TlsStream>;
}

#[derive(Debug, Default)]
pub struct NativeTlsDriver;

impl NativeTlsDriver {
    pub fn new() -> Self {
        Self
    }

    fn build_connector(&self, config: &TlsConfig) -> Result<native_tls::TlsConnector> {
        let mut builder = native_tls::TlsConnector::builder();

        if let Some(depth) = config.verify_depth {
            // native-tls has no direct verify-depth knob; depth 0 is
            // treated as "accept self-signed leaf", matching the
            // permitted-peer-list model where the chain itself is not
            // authoritative.
            if depth == 0 {
                builder.danger_accept_invalid_certs(true);
            }
        }

        if config.allow_expired_certs {
            builder.danger_accept_invalid_hostnames(true);
        }

        if let Some(ca_path) = &config.ca_file {
            let pem = fs::read(ca_path).map_err(|e| {
                LogforgeError::with_source(
                    ErrorKind::TlsFailed,
                    format!("reading CA file {}", ca_path.display()),
                    e,
                )
            })?;
            let cert = native_tls::Certificate::from_pem(&pem).map_err(|e| {
                LogforgeError::with_source(ErrorKind::TlsFailed, "parsing CA certificate", e)
            })?;
            builder.add_root_certificate(cert);
        }

        if let (Some(cert_path), Some(key_path)) = (&config.cert_file, &config.key_file) {
            let cert_pem = fs::read(cert_path).map_err(|e| {
                LogforgeError::with_source(
                    ErrorKind::TlsFailed,
                    format!("reading client cert {}", cert_path.display()),
                    e,
                )
            })?;
            let key_pem = fs::read(key_path).map_err(|e| {
                LogforgeError::with_source(
                    ErrorKind::TlsFailed,
                    format!("reading client key {}", key_path.display()),
                    e,
                )
            })?;
            let identity = native_tls::Identity::from_pkcs8(&cert_pem, &key_pem).map_err(|e| {
                LogforgeError::with_source(ErrorKind::TlsFailed, "building client identity", e)
            })?;
            builder.identity(identity);
        }

        builder
            .build()
            .map_err(|e| LogforgeError::with_source(ErrorKind::TlsFailed, "building TLS connector", e))
    }
}

impl TlsDriver for NativeTlsDriver {
    fn wrap_client(&self, stream: TcpStream, target_host: &str, config: &TlsConfig) -> Result<TlsStream> {
        if !config.enabled {
            return Ok(TlsStream::Plain(stream));
        }
        let connector = self.build_connector(config)?;
        let tls = connector.connect(target_host, stream).map_err(|e| {
            LogforgeError::with_source(
                ErrorKind::TlsFailed,
                format!("TLS handshake with {target_host} failed"),
                e,
            )
        })?;
        Ok(TlsStream::Tls(Box::new(tls)))
    }
}
