//! Canonical default values shared across the daemon (spec.md §4-§6).

pub const DEFAULT_PID_FILE: &str = "/var/run/logforged.pid";
pub const DEFAULT_MAX_LINE: usize = 8192;
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;
pub const DEFAULT_RATELIMIT_INTERVAL_SECS: u64 = 1;
pub const DEFAULT_RATELIMIT_BURST: u32 = 200;
pub const DEFAULT_FORWARDER_SEND_BUFFER_CAP: usize = 16 * 1024;
pub const DEFAULT_FORWARDER_RESUME_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_DOCKER_POLL_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_DOCKER_API_VERSION: &str = "v1.41";
pub const DEFAULT_DOCKER_ENDPOINT: &str = "unix:///var/run/docker.sock";
pub const DEFAULT_JANITOR_INTERVAL_MINS: u64 = 10;
/// UDP datagram ceiling the forwarder truncates to (spec.md §8 boundary
/// behavior: "70000-byte message over UDP truncated to 65507").
pub const MAX_UDP_PAYLOAD: usize = 65_507;
pub const DEFAULT_CONN_ERR_SKIP: u32 = 10;
