//! The action state machine (spec.md §3 "Action", §4.4): every bound
//! action is `Ready`, `Suspended` (backing off after a failure, with a
//! resume timer), or `Disabled` (permanently given up after repeated
//! failures). `logforge_forward`'s target pool implements `Action` for
//! its forwarder; this crate also ships the two in-scope non-forwarder
//! kinds named in SPEC_FULL.md: writing to a file, and discarding.

use logforge_protocol::error::{ErrorKind, LogforgeError, Result};
use logforge_protocol::types::Message;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionState {
    Ready,
    Suspended,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    Committed,
    Suspended,
    Disabled,
}

/// Anything bindable as the target of a ruleset binding. Implementors
/// own their own retry/suspend bookkeeping; the pipeline only ever calls
/// `process` and checks `state`.
pub trait Action: Send + Sync {
    fn name(&self) -> &str;
    fn state(&self) -> ActionState;
    fn process(&self, msg: &Message) -> ActionOutcome;

    /// Reopen file handles, rotate logs, and re-resolve cached hosts
    /// (spec.md §4.4 "HUP"). Default is a no-op; actions with a handle
    /// worth reopening override it. Must never tear down the action's
    /// own state machine.
    fn hup(&self) {}

    /// Final flush of any buffered-but-uncommitted data (spec.md §4.5
    /// "commitTransaction ... final flush"). Default is a no-op.
    fn flush(&self) {}
}

/// Wraps an [`Action`] with a linux-style ratelimiter consulted before
/// every `process` call (spec.md §3 "Action ... rate limiting per action:
/// the linux-like limiter runs before enqueue into the action's sub-queue;
/// discards increment a stats counter, never crash").
pub struct RateLimitedAction {
    inner: std::sync::Arc<dyn Action>,
    limiter: std::sync::Arc<crate::ratelimit::RateLimiter>,
    discarded: AtomicU32,
}

impl RateLimitedAction {
    pub fn new(inner: std::sync::Arc<dyn Action>, limiter: std::sync::Arc<crate::ratelimit::RateLimiter>) -> Self {
        Self {
            inner,
            limiter,
            discarded: AtomicU32::new(0),
        }
    }

    pub fn discarded_total(&self) -> u32 {
        self.discarded.load(Ordering::Relaxed)
    }
}

impl Action for RateLimitedAction {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn state(&self) -> ActionState {
        self.inner.state()
    }

    fn process(&self, msg: &Message) -> ActionOutcome {
        if !self.limiter.check(msg) {
            self.discarded.fetch_add(1, Ordering::Relaxed);
            return ActionOutcome::Committed;
        }
        self.inner.process(msg)
    }

    fn hup(&self) {
        self.inner.hup();
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

/// Generic suspend/resume bookkeeping shared by action implementations:
/// tracks the current state, a retry counter, and when the resume timer
/// expires (spec.md §4.4 "suspended actions retry on a resume interval
/// and give up after a fixed number of consecutive failures").
pub struct RetryPolicy {
    max_retries: u32,
    resume_after: Duration,
    state: Mutex<PolicyState>,
    failures: AtomicU32,
}

struct PolicyState {
    current: ActionState,
    resume_at: Option<Instant>,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, resume_after: Duration) -> Self {
        Self {
            max_retries,
            resume_after,
            state: Mutex::new(PolicyState {
                current: ActionState::Ready,
                resume_at: None,
            }),
            failures: AtomicU32::new(0),
        }
    }

    pub fn state(&self) -> ActionState {
        let mut guard = self.state.lock().expect("retry policy mutex poisoned");
        if guard.current == ActionState::Suspended {
            if let Some(at) = guard.resume_at {
                if Instant::now() >= at {
                    guard.current = ActionState::Ready;
                    guard.resume_at = None;
                }
            }
        }
        guard.current
    }

    pub fn record_success(&self) {
        self.failures.store(0, Ordering::Relaxed);
        let mut guard = self.state.lock().expect("retry policy mutex poisoned");
        guard.current = ActionState::Ready;
        guard.resume_at = None;
    }

    /// Returns the new state after accounting for this failure.
    pub fn record_failure(&self) -> ActionState {
        let failures = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
        let mut guard = self.state.lock().expect("retry policy mutex poisoned");
        if failures >= self.max_retries {
            guard.current = ActionState::Disabled;
        } else {
            guard.current = ActionState::Suspended;
            guard.resume_at = Some(Instant::now() + self.resume_after);
        }
        guard.current
    }
}

/// Writes each message body, newline-terminated, to a local file. The
/// in-scope non-forwarder sibling to the omfwd action.
pub struct FileAction {
    name: String,
    path: PathBuf,
    file: Mutex<File>,
    policy: RetryPolicy,
}

impl FileAction {
    pub fn open(name: impl Into<String>, path: PathBuf) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                LogforgeError::with_source(ErrorKind::Io, format!("opening action file {}", path.display()), e)
            })?;
        Ok(Self {
            name: name.into(),
            path,
            file: Mutex::new(file),
            policy: RetryPolicy::new(5, Duration::from_secs(30)),
        })
    }
}

impl Action for FileAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> ActionState {
        self.policy.state()
    }

    fn process(&self, msg: &Message) -> ActionOutcome {
        if self.policy.state() != ActionState::Ready {
            return match self.policy.state() {
                ActionState::Suspended => ActionOutcome::Suspended,
                ActionState::Disabled => ActionOutcome::Disabled,
                ActionState::Ready => unreachable!(),
            };
        }

        let mut file = self.file.lock().expect("file action mutex poisoned");
        let write_result = writeln!(file, "{}", msg.msg_body);
        drop(file);

        match write_result {
            Ok(()) => {
                self.policy.record_success();
                ActionOutcome::Committed
            }
            Err(e) => {
                warn!(action = %self.name, path = %self.path.display(), error = %e, "file action write failed");
                match self.policy.record_failure() {
                    ActionState::Disabled => ActionOutcome::Disabled,
                    _ => ActionOutcome::Suspended,
                }
            }
        }
    }

    fn hup(&self) {
        match OpenOptions::new().create(true).append(true).open(&self.path) {
            Ok(reopened) => {
                *self.file.lock().expect("file action mutex poisoned") = reopened;
            }
            Err(e) => warn!(action = %self.name, path = %self.path.display(), error = %e, "HUP failed to reopen action file"),
        }
    }

    fn flush(&self) {
        let mut file = self.file.lock().expect("file action mutex poisoned");
        let _ = file.flush();
    }
}

/// Unconditionally discards every message routed to it. Used for
/// `~`-style "stop processing here" bindings.
pub struct DiscardAction {
    name: String,
}

impl DiscardAction {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Action for DiscardAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> ActionState {
        ActionState::Ready
    }

    fn process(&self, _msg: &Message) -> ActionOutcome {
        ActionOutcome::Committed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logforge_protocol::types::{Facility, Pri, Severity};

    #[test]
    fn retry_policy_suspends_then_disables_after_max_retries() {
        let policy = RetryPolicy::new(2, Duration::from_secs(60));
        assert_eq!(policy.record_failure(), ActionState::Suspended);
        assert_eq!(policy.record_failure(), ActionState::Disabled);
    }

    #[test]
    fn retry_policy_recovers_on_success() {
        let policy = RetryPolicy::new(5, Duration::from_secs(60));
        policy.record_failure();
        assert_eq!(policy.state(), ActionState::Suspended);
        policy.record_success();
        assert_eq!(policy.state(), ActionState::Ready);
    }

    #[test]
    fn file_action_writes_message_body() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.log");
        let action = FileAction::open("file1", path.clone()).unwrap();
        let msg = Message::construct("test", Pri::new(Facility::User, Severity::Info), "hello world");
        assert_eq!(action.process(&msg), ActionOutcome::Committed);
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "hello world\n");
    }

    #[test]
    fn discard_action_always_commits() {
        let action = DiscardAction::new("discard1");
        let msg = Message::construct("test", Pri::new(Facility::User, Severity::Info), "hi");
        assert_eq!(action.process(&msg), ActionOutcome::Committed);
    }

    #[test]
    fn file_action_hup_reopens_file_after_external_rename() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.log");
        let action = FileAction::open("file1", path.clone()).unwrap();
        let msg = Message::construct("test", Pri::new(Facility::User, Severity::Info), "before rotate");
        action.process(&msg);

        std::fs::rename(&path, dir.path().join("out.log.1")).unwrap();
        action.hup();

        let msg = Message::construct("test", Pri::new(Facility::User, Severity::Info), "after rotate");
        action.process(&msg);
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "after rotate\n");
    }

    #[test]
    fn rate_limited_action_discards_without_suspending() {
        use crate::ratelimit::RateLimiter;
        use logforge_protocol::config::RatelimiterConfig;
        use std::sync::Arc;

        let discard = Arc::new(DiscardAction::new("discard1"));
        let limiter = Arc::new(RateLimiter::new(RatelimiterConfig {
            burst: 1,
            discard_severity: 8,
            ..RatelimiterConfig::default()
        }));
        let action = RateLimitedAction::new(discard, limiter);
        let msg = Message::construct("test", Pri::new(Facility::User, Severity::Info), "hi");

        assert_eq!(action.process(&msg), ActionOutcome::Committed);
        assert_eq!(action.process(&msg), ActionOutcome::Committed);
        assert_eq!(action.discarded_total(), 1);
        assert_eq!(action.state(), ActionState::Ready);
    }
}
