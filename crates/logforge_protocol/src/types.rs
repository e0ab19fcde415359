//! The message data model (spec.md §3 "Message").

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Severity, 0 (emerg) .. 7 (debug). See spec.md GLOSSARY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Severity {
    Emerg = 0,
    Alert = 1,
    Crit = 2,
    Err = 3,
    Warning = 4,
    Notice = 5,
    Info = 6,
    Debug = 7,
}

impl Severity {
    pub const ALL: [Severity; 8] = [
        Severity::Emerg,
        Severity::Alert,
        Severity::Crit,
        Severity::Err,
        Severity::Warning,
        Severity::Notice,
        Severity::Info,
        Severity::Debug,
    ];

    pub const fn from_u8(value: u8) -> Result<Self, PriError> {
        match value {
            0 => Ok(Severity::Emerg),
            1 => Ok(Severity::Alert),
            2 => Ok(Severity::Crit),
            3 => Ok(Severity::Err),
            4 => Ok(Severity::Warning),
            5 => Ok(Severity::Notice),
            6 => Ok(Severity::Info),
            7 => Ok(Severity::Debug),
            other => Err(PriError::SeverityOutOfRange(other)),
        }
    }

    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Facility, 24 named categories 0..23. See spec.md GLOSSARY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Facility {
    Kern = 0,
    User = 1,
    Mail = 2,
    Daemon = 3,
    Auth = 4,
    Syslog = 5,
    Lpr = 6,
    News = 7,
    Uucp = 8,
    Cron = 9,
    AuthPriv = 10,
    Ftp = 11,
    Ntp = 12,
    Security = 13,
    Console = 14,
    SolarisCron = 15,
    Local0 = 16,
    Local1 = 17,
    Local2 = 18,
    Local3 = 19,
    Local4 = 20,
    Local5 = 21,
    Local6 = 22,
    Local7 = 23,
}

impl Facility {
    /// Number of facilities; used to size the priority-mask table (spec.md §4.3).
    pub const COUNT: usize = 24;

    pub const fn from_u8(value: u8) -> Result<Self, PriError> {
        use Facility::*;
        Ok(match value {
            0 => Kern,
            1 => User,
            2 => Mail,
            3 => Daemon,
            4 => Auth,
            5 => Syslog,
            6 => Lpr,
            7 => News,
            8 => Uucp,
            9 => Cron,
            10 => AuthPriv,
            11 => Ftp,
            12 => Ntp,
            13 => Security,
            14 => Console,
            15 => SolarisCron,
            16 => Local0,
            17 => Local1,
            18 => Local2,
            19 => Local3,
            20 => Local4,
            21 => Local5,
            22 => Local6,
            23 => Local7,
            other => return Err(PriError::FacilityOutOfRange(other)),
        })
    }

    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PriError {
    #[error("facility out of range 0..23: {0}")]
    FacilityOutOfRange(u8),
    #[error("severity out of range 0..7: {0}")]
    SeverityOutOfRange(u8),
}

/// `PRI`: `facility*8 + severity`, the integer at the head of a legacy
/// syslog message written as `<N>`. See spec.md GLOSSARY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pri {
    pub facility: Facility,
    pub severity: Severity,
}

impl Pri {
    pub fn new(facility: Facility, severity: Severity) -> Self {
        Self { facility, severity }
    }

    pub const fn as_u8(self) -> u8 {
        self.facility.as_u8() * 8 + self.severity.as_u8()
    }

    pub const fn from_u8(value: u8) -> Result<Self, PriError> {
        let facility = match Facility::from_u8(value / 8) {
            Ok(f) => f,
            Err(e) => return Err(e),
        };
        let severity = match Severity::from_u8(value % 8) {
            Ok(s) => s,
            Err(e) => return Err(e),
        };
        Ok(Self { facility, severity })
    }
}

impl fmt::Display for Pri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.as_u8())
    }
}

/// Flow-control class for submit/enqueue (spec.md §4.1, §4.2).
///
/// `NoDelay` bypasses enqueue backpressure (drop if full); `LightDelay` may
/// briefly block on a full queue; `FullDelay` blocks until space is free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowControl {
    NoDelay,
    LightDelay,
    FullDelay,
}

/// Per-message flags (spec.md §3 Message).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MessageFlags {
    pub needs_parsing: bool,
    pub needs_acl_check: bool,
    pub parse_hostname: bool,
    pub internal_origin: bool,
    pub mark: bool,
    pub truncated: bool,
    pub oversize: bool,
}

/// Policy applied when an incoming raw message exceeds the configured
/// `max_line` (spec.md §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OversizePolicy {
    Accept,
    Truncate,
    Split,
}

/// Monotonic receive-time stamp. Stored separately from the
/// operator-supplied `timestamp_reported` so that downstream code can
/// always fall back to "when we actually saw this" (spec.md §3: "receiver
/// timestamp" vs "reported timestamp").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        Self(secs)
    }
}

/// The structured log record (spec.md §3 "Message").
///
/// Invariant: once submitted to a queue, body content is immutable --
/// everything past `submit` only reads these fields, it never calls a
/// `set_*`. That invariant is enforced here by ownership, not by a runtime
/// flag: `submit` (in `logforge_core::queue`) takes `Message` by value and
/// never hands back a `&mut Message` to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// The untouched bytes as received, before any parsing.
    pub raw: Vec<u8>,
    pub pri: Pri,
    /// Parsed MSG body (may equal `raw` verbatim for inputs that skip
    /// legacy PRI-header parsing, e.g. imdocker).
    pub msg_body: String,
    pub app_name: Option<String>,
    pub proc_id: Option<String>,
    pub msg_id: Option<String>,
    pub structured_data: Option<String>,
    pub tag: Option<String>,
    pub hostname: Option<String>,
    /// Symbolic name of the peer the message was received from.
    pub received_from: Option<String>,
    /// Symbolic IP-form of the peer the message was received from.
    pub received_from_ip: Option<String>,
    pub input_name: String,
    pub ruleset: Option<logforge_ids::RulesetName>,
    pub timestamp_reported: Timestamp,
    pub timestamp_received: Timestamp,
    pub flags: MessageFlags,
    pub flow_control: FlowControl,
    pub metadata: HashMap<String, String>,
}

impl Message {
    /// Construct with the current time as both reported and received
    /// timestamp (spec.md §4.1 "construct(now)").
    pub fn construct(input_name: impl Into<String>, pri: Pri, msg_body: impl Into<String>) -> Self {
        let now = Timestamp::now();
        Self::construct_with_time(input_name, pri, msg_body, now)
    }

    /// Construct with an explicit reported timestamp (spec.md §4.1
    /// "construct-with-time(t)"); `timestamp_received` is always "now".
    pub fn construct_with_time(
        input_name: impl Into<String>,
        pri: Pri,
        msg_body: impl Into<String>,
        timestamp_reported: Timestamp,
    ) -> Self {
        let msg_body = msg_body.into();
        Self {
            raw: msg_body.clone().into_bytes(),
            pri,
            msg_body,
            app_name: None,
            proc_id: None,
            msg_id: None,
            structured_data: None,
            tag: None,
            hostname: None,
            received_from: None,
            received_from_ip: None,
            input_name: input_name.into(),
            ruleset: None,
            timestamp_reported,
            timestamp_received: Timestamp::now(),
            flags: MessageFlags::default(),
            flow_control: FlowControl::FullDelay,
            metadata: HashMap::new(),
        }
    }

    pub fn set_tag(&mut self, tag: impl Into<String>) -> &mut Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn set_hostname(&mut self, hostname: impl Into<String>) -> &mut Self {
        self.hostname = Some(hostname.into());
        self
    }

    pub fn set_app_name(&mut self, app_name: impl Into<String>) -> &mut Self {
        self.app_name = Some(app_name.into());
        self
    }

    pub fn set_ruleset(&mut self, ruleset: logforge_ids::RulesetName) -> &mut Self {
        self.ruleset = Some(ruleset);
        self
    }

    pub fn set_flow_control(&mut self, flow_control: FlowControl) -> &mut Self {
        self.flow_control = flow_control;
        self
    }

    pub fn set_received_from(
        &mut self,
        symbolic: impl Into<String>,
        ip: impl Into<String>,
    ) -> &mut Self {
        self.received_from = Some(symbolic.into());
        self.received_from_ip = Some(ip.into());
        self
    }

    pub fn insert_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Split the raw body into equal-sized sibling chunks of at most
    /// `chunk_size` bytes each, preserving byte order (spec.md §4.1, §8
    /// testable property #9). Used by the oversize-split policy.
    pub fn split_raw(&self, chunk_size: usize) -> Vec<Vec<u8>> {
        assert!(chunk_size > 0);
        self.raw.chunks(chunk_size).map(|c| c.to_vec()).collect()
    }

    /// First 80 bytes of the raw message, for oversize warning logs
    /// (spec.md §4.1).
    pub fn raw_preview(&self, max_bytes: usize) -> String {
        let take = self.raw.len().min(max_bytes);
        String::from_utf8_lossy(&self.raw[..take]).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pri_roundtrips_through_u8() {
        let pri = Pri::new(Facility::User, Severity::Info);
        assert_eq!(pri.as_u8(), 1 * 8 + 6);
        assert_eq!(Pri::from_u8(pri.as_u8()).unwrap(), pri);
    }

    #[test]
    fn pri_display_matches_legacy_angle_bracket_form() {
        let pri = Pri::new(Facility::User, Severity::Info);
        assert_eq!(pri.to_string(), "<14>");
    }

    #[test]
    fn facility_out_of_range_errors() {
        assert!(Facility::from_u8(24).is_err());
        assert!(Severity::from_u8(8).is_err());
    }

    #[test]
    fn split_raw_preserves_byte_order_and_sizes() {
        let msg = Message::construct("test", Pri::new(Facility::User, Severity::Info), "x".repeat(4000));
        let parts = msg.split_raw(1024);
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0].len(), 1024);
        assert_eq!(parts[1].len(), 1024);
        assert_eq!(parts[2].len(), 1024);
        assert_eq!(parts[3].len(), 928);
        let reassembled: Vec<u8> = parts.into_iter().flatten().collect();
        assert_eq!(reassembled, msg.raw);
    }

    #[test]
    fn message_immutable_fields_survive_construction() {
        let mut msg = Message::construct("imudp", Pri::new(Facility::Local0, Severity::Warning), "hello");
        msg.set_tag("app:").set_hostname("host1");
        assert_eq!(msg.tag.as_deref(), Some("app:"));
        assert_eq!(msg.hostname.as_deref(), Some("host1"));
        assert_eq!(msg.msg_body, "hello");
    }
}
