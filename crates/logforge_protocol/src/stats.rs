//! Stat-counter names, held as constants so producers and the stats
//! reporter (spec.md §6 "impstats"-equivalent) never drift apart.

pub const MESSAGES_SUBMITTED: &str = "submitted";
pub const MESSAGES_SENT: &str = "messages.sent";
pub const BYTES_SENT: &str = "bytes.sent";
pub const RATELIMIT_DISCARDED: &str = "ratelimit.discarded";
pub const QUEUE_DISCARDED: &str = "queue.discarded";
pub const QUEUE_ENQUEUED: &str = "queue.enqueued";
pub const QUEUE_MAX_DEPTH: &str = "queue.maxqsize";
pub const CONNECTION_ERRORS: &str = "curl.errors";
pub const ACTION_FAILURES: &str = "action.failed";
pub const ACTION_SUSPENDED: &str = "action.suspended";
pub const ACTION_RESUMED: &str = "action.resumed";
