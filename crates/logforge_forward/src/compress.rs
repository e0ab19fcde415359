//! Payload compression (spec.md §4.5, SPEC_FULL.md supplemented feature
//! #1): either off, deflated per-message once a size threshold is hit,
//! or a single persistent deflate stream kept open for a target's
//! lifetime.

use flate2::write::ZlibEncoder;
use flate2::Compression;
use logforge_protocol::config::CompressionMode;
use logforge_protocol::error::{ErrorKind, LogforgeError, Result};
use std::io::Write;

/// Per-target compression state. `StreamAlways` carries a live encoder
/// so each message is deflated against the dictionary built by the ones
/// before it; `Single`/`None` are stateless.
pub enum Compressor {
    None,
    Single { threshold: usize, level: u8 },
    Stream(ZlibEncoder<Vec<u8>>),
}

impl Compressor {
    pub fn new(mode: CompressionMode) -> Self {
        match mode {
            CompressionMode::None => Compressor::None,
            CompressionMode::Single { threshold, level } => Compressor::Single { threshold, level },
            CompressionMode::StreamAlways { .. } => {
                Compressor::Stream(ZlibEncoder::new(Vec::new(), Compression::default()))
            }
        }
    }

    /// Returns the bytes that should actually be framed and sent.
    pub fn compress(&mut self, payload: &[u8]) -> Result<Vec<u8>> {
        match self {
            Compressor::None => Ok(payload.to_vec()),
            Compressor::Single { threshold, level } => {
                if payload.len() < *threshold {
                    return Ok(payload.to_vec());
                }
                let deflated = deflate_once(payload, *level)?;
                // spec.md §4.5: a single-message compressed frame starts
                // with a leading 'z' marker byte. If compression didn't
                // actually shrink the payload, send it uncompressed
                // instead (no marker) rather than pay the cost for
                // nothing.
                if deflated.len() + 1 < payload.len() {
                    let mut marked = Vec::with_capacity(deflated.len() + 1);
                    marked.push(b'z');
                    marked.extend_from_slice(&deflated);
                    Ok(marked)
                } else {
                    Ok(payload.to_vec())
                }
            }
            Compressor::Stream(encoder) => {
                encoder.write_all(payload).map_err(|e| {
                    LogforgeError::with_source(ErrorKind::SendFailed, "writing to compression stream", e)
                })?;
                encoder.flush().map_err(|e| {
                    LogforgeError::with_source(ErrorKind::SendFailed, "flushing compression stream", e)
                })?;
                // ZlibEncoder<Vec<u8>> accumulates into its inner buffer;
                // drain what's been produced so far for this message.
                Ok(std::mem::take(encoder.get_mut()))
            }
        }
    }
}

fn deflate_once(payload: &[u8], level: u8) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(level.min(9) as u32));
    encoder
        .write_all(payload)
        .map_err(|e| LogforgeError::with_source(ErrorKind::SendFailed, "deflating message", e))?;
    encoder
        .finish()
        .map_err(|e| LogforgeError::with_source(ErrorKind::SendFailed, "finishing deflate stream", e))
}
