//! The Docker multiplexed-log frame protocol (spec.md §4.6): each frame
//! is `[stream-type:1][0:3][len:4 big-endian][payload:len]`, with
//! stream-type in `{0: stdin (unused), 1: stdout, 2: stderr}`.
//!
//! `bollard::container::LogOutput` already performs this demultiplexing
//! for the production streaming path (`stream.rs`); this module exists
//! as the protocol's own, independently testable decoder -- a pure
//! function of (buffered bytes, decoder state) per SPEC_FULL.md's design
//! note, exercising the exact frame-boundary and partial-header
//! behaviors spec.md §8 testable property 4 names.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamType {
    Stdin,
    Stdout,
    Stderr,
}

impl StreamType {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(StreamType::Stdin),
            1 => Some(StreamType::Stdout),
            2 => Some(StreamType::Stderr),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub stream: StreamType,
    pub payload: Vec<u8>,
}

/// Decoder state across chunk boundaries: either waiting for a fresh
/// 8-byte header, or mid-payload with `remaining` bytes still due on
/// `stream`.
enum State {
    AwaitingHeader,
    InPayload { stream: StreamType, remaining: usize },
}

/// Decodes the frame stream one chunk at a time. Frames may be split
/// across chunks in either the header or the payload.
pub struct FrameDecoder {
    state: State,
    header_buf: Vec<u8>,
    /// The most recent stream-type successfully parsed, used as a
    /// fallback when a chunk ends with an incomplete header (spec.md
    /// §4.6 / §9 open question, resolved in DESIGN.md: dump the
    /// remainder into the last known stream-type rather than discard
    /// it, counting the recovery).
    last_stream: StreamType,
    pub partial_header_recoveries: u64,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            state: State::AwaitingHeader,
            header_buf: Vec::with_capacity(8),
            last_stream: StreamType::Stdout,
            partial_header_recoveries: 0,
        }
    }

    /// Feed one chunk of bytes as received from the stream, returning
    /// every complete frame (and payload-continuation) produced.
    /// Payload continuations of an already-open frame are returned as
    /// their own `Frame` with the same `stream` -- callers that need
    /// whole-frame payloads should concatenate consecutive frames of the
    /// same stream until `remaining` reaches zero, which this module
    /// tracks internally and signals by only emitting once a frame's
    /// payload is fully consumed from a chunk boundary.
    pub fn feed(&mut self, mut chunk: &[u8]) -> Vec<Frame> {
        let mut out = Vec::new();
        while !chunk.is_empty() {
            match &mut self.state {
                State::InPayload { stream, remaining } => {
                    let take = (*remaining).min(chunk.len());
                    let stream = *stream;
                    out.push(Frame {
                        stream,
                        payload: chunk[..take].to_vec(),
                    });
                    *remaining -= take;
                    chunk = &chunk[take..];
                    if *remaining == 0 {
                        self.state = State::AwaitingHeader;
                    }
                }
                State::AwaitingHeader => {
                    let need = 8 - self.header_buf.len();
                    let take = need.min(chunk.len());
                    self.header_buf.extend_from_slice(&chunk[..take]);
                    chunk = &chunk[take..];

                    if self.header_buf.len() < 8 {
                        // Header split across chunk boundary; wait for
                        // the rest on the next `feed`. If the stream
                        // ends here, `finish` handles the fallback.
                        break;
                    }

                    let header = std::mem::take(&mut self.header_buf);
                    match StreamType::from_byte(header[0]) {
                        Some(stream) => {
                            let len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;
                            self.last_stream = stream;
                            self.state = State::InPayload { stream, remaining: len };
                        }
                        None => {
                            // Invalid stream-type byte: treat the whole
                            // would-be header as payload for the last
                            // known stream rather than lose the bytes.
                            self.partial_header_recoveries += 1;
                            out.push(Frame {
                                stream: self.last_stream,
                                payload: header,
                            });
                        }
                    }
                }
            }
        }
        out
    }

    /// The connection closed. Any bytes stuck in an incomplete header
    /// are recovered into the last known stream-type (spec.md §4.6):
    /// better to deliver them than silently drop them.
    pub fn finish(&mut self) -> Option<Frame> {
        if self.header_buf.is_empty() {
            return None;
        }
        self.partial_header_recoveries += 1;
        let payload = std::mem::take(&mut self.header_buf);
        self.state = State::AwaitingHeader;
        Some(Frame {
            stream: self.last_stream,
            payload,
        })
    }
}
