//! Per-component configuration structs, loaded from TOML by
//! `logforge_lifecycle` (spec.md §1: only the narrow interface the core
//! consumes is specified here -- the config file *syntax* is an external
//! concern).

use crate::types::{Facility, OversizePolicy, Severity};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_true() -> bool {
    true
}

/// spec.md §3 "Queue".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub capacity: usize,
    pub high_water: usize,
    pub low_water: usize,
    pub discard_mark: usize,
    pub discard_severity: u8,
    pub enqueue_timeout_ms: u64,
    pub queue_shutdown_timeout_ms: u64,
    pub action_shutdown_timeout_ms: u64,
    pub worker_shutdown_timeout_ms: u64,
    pub min_msgs_per_worker: usize,
    pub batch_size: usize,
    pub dequeue_slowdown_us: u64,
    pub num_workers: usize,
    pub persist_on_shutdown: bool,
    pub abort_on_failed_queue_startup: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            high_water: 8_000,
            low_water: 2_000,
            discard_mark: 9_750,
            discard_severity: 4,
            enqueue_timeout_ms: 2_000,
            queue_shutdown_timeout_ms: 1_500,
            action_shutdown_timeout_ms: 1_500,
            worker_shutdown_timeout_ms: 60_000,
            min_msgs_per_worker: 100,
            batch_size: 128,
            dequeue_slowdown_us: 0,
            num_workers: 2,
            persist_on_shutdown: true,
            abort_on_failed_queue_startup: false,
        }
    }
}

/// spec.md §3 "Ratelimiter".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RatelimiterConfig {
    pub name: String,
    pub interval_secs: u64,
    pub burst: u32,
    /// Out-of-range (>7) disables severity-based bypass entirely.
    pub discard_severity: u8,
    /// `None` disables per-source sub-limiting (a single global bucket).
    pub per_source_max_states: Option<usize>,
}

impl Default for RatelimiterConfig {
    fn default() -> Self {
        Self {
            name: "default".into(),
            interval_secs: 1,
            burst: 200,
            discard_severity: 8,
            per_source_max_states: None,
        }
    }
}

/// spec.md §4.5 framing mode, selected per forwarder action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FramingMode {
    OctetCounting,
    OctetStuffing { delimiter: u8 },
}

impl Default for FramingMode {
    fn default() -> Self {
        FramingMode::OctetStuffing { delimiter: b'\n' }
    }
}

/// spec.md §4.5 compression mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionMode {
    None,
    /// Each message at least `threshold` bytes is deflated standalone.
    Single { threshold: usize, level: u8 },
    /// A persistent deflate stream per target; the framed length covers
    /// the compressed bytes (SPEC_FULL.md supplemented feature #1).
    StreamAlways { flush_on_tx_end: bool },
}

impl Default for CompressionMode {
    fn default() -> Self {
        CompressionMode::None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportProtocol {
    Udp,
    Tcp,
}

/// TLS options for a TCP forwarder target (narrowed from spec.md §4.5's
/// gtls/ossl driver options to what `logforge_security`'s native-tls
/// driver consumes).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    pub enabled: bool,
    pub ca_file: Option<PathBuf>,
    pub cert_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
    pub permitted_peers: Vec<String>,
    pub verify_depth: Option<u32>,
    pub allow_expired_certs: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeepAliveConfig {
    pub enabled: bool,
    pub probes: u32,
    pub interval_secs: u32,
    pub time_secs: u32,
}

/// spec.md §4.5 "Forwarder action -- target pool".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwarderConfig {
    pub targets: Vec<String>,
    pub ports: Vec<u16>,
    pub protocol: TransportProtocol,
    pub framing: FramingMode,
    pub compression: CompressionMode,
    pub send_buffer_cap: usize,
    pub rebind_interval_messages: u64,
    pub pool_resume_interval_secs: u64,
    /// UDP only: send to every resolved address rather than the first
    /// reachable one (SPEC_FULL.md supplemented feature #2).
    pub send_to_all: bool,
    pub keep_alive: KeepAliveConfig,
    pub tls: TlsConfig,
    /// Only every Nth identical connection-class error is logged
    /// (spec.md §4.5 "conErrSkip").
    pub conn_err_skip: u32,
    pub bind_address: Option<String>,
    pub bind_port: Option<u16>,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            ports: Vec::new(),
            protocol: TransportProtocol::Udp,
            framing: FramingMode::default(),
            compression: CompressionMode::default(),
            send_buffer_cap: 16 * 1024,
            rebind_interval_messages: 0,
            pool_resume_interval_secs: 30,
            send_to_all: false,
            keep_alive: KeepAliveConfig::default(),
            tls: TlsConfig::default(),
            conn_err_skip: 10,
            bind_address: None,
            bind_port: None,
        }
    }
}

/// spec.md §4.6 "Container log input (imdocker)".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerInputConfig {
    pub polling_interval_secs: u64,
    pub api_version: String,
    /// `unix:///var/run/docker.sock` or `tcp://host:port`.
    pub endpoint: String,
    pub list_options: String,
    #[serde(default = "default_true")]
    pub retrieve_new_logs_from_start: bool,
    pub default_facility: Facility,
    pub default_severity: Severity,
    pub ruleset: Option<String>,
}

impl Default for DockerInputConfig {
    fn default() -> Self {
        Self {
            polling_interval_secs: 10,
            api_version: "v1.41".into(),
            endpoint: "unix:///var/run/docker.sock".into(),
            list_options: String::new(),
            retrieve_new_logs_from_start: true,
            default_facility: Facility::User,
            default_severity: Severity::Info,
            ruleset: None,
        }
    }
}

/// spec.md §9's tagged variant over action kinds. Only `Forward`, `File`,
/// and `Discard` are implemented (SPEC_FULL.md Non-goals); the others
/// are named so the type is complete, and constructing one returns
/// `ErrorKind::Unsupported`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ActionKind {
    Forward(ForwarderConfig),
    File { path: PathBuf },
    Discard,
    Pipe { path: PathBuf },
    Tty,
    UsersWall,
    Shell { command: String },
    Database,
}

/// spec.md §3 "Action" binding: a named action, the ruleset it is bound
/// to, its own queue settings, and which concrete action kind it drives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionConfig {
    pub name: String,
    pub ruleset: String,
    pub kind: ActionKind,
    /// Binding filter gating this action within its ruleset; an
    /// unconfigured filter matches everything (spec.md §4.3).
    #[serde(default)]
    pub filter: crate::filters::ActionFilter,
    /// Runs immediately before a dispatched message is enqueued onto
    /// this action's own sub-queue (spec.md §3 "Rate limiting per
    /// action ... runs before enqueue into the action's sub-queue").
    #[serde(default)]
    pub ratelimit: Option<RatelimiterConfig>,
    #[serde(default)]
    pub queue: QueueConfig,
}

/// spec.md §6 "CLI" / process-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub pid_file: Option<PathBuf>,
    pub foreground: bool,
    pub debug: bool,
    pub chroot: Option<PathBuf>,
    /// `-C`: skip the startup `chdir("/")` (spec.md §6).
    pub no_chdir: bool,
    pub module_path: Vec<PathBuf>,
    /// The main/ruleset queue every input submits into before dispatch
    /// (spec.md §3 "Queue").
    pub queue: QueueConfig,
    /// The daemon-wide ratelimiter consulted in `Pipeline::submit`,
    /// ahead of ruleset dispatch. Per-action limiters in
    /// `ActionConfig::ratelimit` run later, per target action.
    pub ratelimit: Option<RatelimiterConfig>,
    pub max_line: usize,
    pub oversize_policy: OversizePolicy,
    pub oversize_report_interval_secs: u64,
    pub oversize_log_file: Option<PathBuf>,
    pub janitor_interval_mins: u64,
    pub mark_interval_secs: u64,
    pub drop_capabilities: bool,
    pub max_stderr_error_lines: Option<usize>,
    pub abort_on_program_error: bool,
    pub parse_hostname_as_tag: bool,
    pub actions: Vec<ActionConfig>,
    pub docker_inputs: Vec<DockerInputConfig>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            pid_file: Some(PathBuf::from("/var/run/logforged.pid")),
            foreground: false,
            debug: false,
            chroot: None,
            no_chdir: false,
            module_path: Vec::new(),
            queue: QueueConfig::default(),
            ratelimit: None,
            max_line: 8192,
            oversize_policy: OversizePolicy::Truncate,
            oversize_report_interval_secs: 300,
            oversize_log_file: None,
            janitor_interval_mins: 10,
            mark_interval_secs: 0,
            drop_capabilities: false,
            max_stderr_error_lines: None,
            abort_on_program_error: false,
            parse_hostname_as_tag: false,
            actions: Vec::new(),
            docker_inputs: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_config_default_has_sane_queue_and_oversize_policy() {
        let cfg = SystemConfig::default();
        assert_eq!(cfg.oversize_policy, OversizePolicy::Truncate);
        assert!(cfg.actions.is_empty());
    }

    #[test]
    fn forwarder_config_default_uses_octet_stuffing_over_udp() {
        let cfg = ForwarderConfig::default();
        assert_eq!(cfg.protocol, TransportProtocol::Udp);
        assert_eq!(cfg.framing, FramingMode::OctetStuffing { delimiter: b'\n' });
    }
}
