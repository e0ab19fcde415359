//! The message pipeline: the bounded queue, rate limiter, ruleset
//! dispatcher, and the action state machine that drives built-in
//! (non-forwarder) actions.

pub mod action;
pub mod cancel;
pub mod mark;
pub mod pipeline;
pub mod queue;
pub mod ratelimit;
pub mod ruleset;

pub use action::{Action, ActionOutcome, ActionState, DiscardAction, FileAction, RateLimitedAction, RetryPolicy};
pub use cancel::CancellationToken;
pub use mark::MarkGenerator;
pub use pipeline::{Pipeline, SubmitError};
pub use queue::{spawn_workers, DequeueError, EnqueueError, Queue};
pub use ratelimit::RateLimiter;
pub use ruleset::{Binding, Ruleset, RulesetTable};
