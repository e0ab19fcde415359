//! The submit path: apply the oversize policy, then the rate limiter,
//! then ruleset dispatch, then enqueue onto the main queue (spec.md
//! §4.1 "submit(msg)" / "multi-submit(msgs)").

use crate::queue::{EnqueueError, Queue};
use crate::ratelimit::RateLimiter;
use crate::ruleset::RulesetTable;
use logforge_ids::ActionName;
use logforge_protocol::types::{Message, OversizePolicy};
use std::sync::Arc;
use thiserror::Error;
use tracing::{trace, warn};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubmitError {
    #[error("message rejected: {0}")]
    Enqueue(#[from] EnqueueError),
    #[error("message rate-limited by {0}")]
    RateLimited(String),
}

pub struct Pipeline {
    queue: Arc<Queue>,
    ratelimiter: Option<Arc<RateLimiter>>,
    rulesets: Arc<RulesetTable>,
    max_line: usize,
    oversize_policy: OversizePolicy,
}

impl Pipeline {
    pub fn new(
        queue: Arc<Queue>,
        ratelimiter: Option<Arc<RateLimiter>>,
        rulesets: Arc<RulesetTable>,
        max_line: usize,
        oversize_policy: OversizePolicy,
    ) -> Self {
        Self {
            queue,
            ratelimiter,
            rulesets,
            max_line,
            oversize_policy,
        }
    }

    /// Submit one message through the full pipeline, returning the
    /// actions it was routed to (spec.md §4.1/§4.3). An empty vector
    /// means it matched no binding, not that it failed. A message split
    /// by the oversize policy returns the union of actions across its
    /// parts.
    pub fn submit(&self, msg: Message) -> Result<Vec<ActionName>, SubmitError> {
        let mut actions = Vec::new();
        for part in self.apply_oversize_policy(msg) {
            actions.extend(self.submit_one(part)?);
        }
        Ok(actions)
    }

    /// Submit a batch; each message is processed independently so one
    /// rejection doesn't block the rest (spec.md §4.1 "multi-submit").
    pub fn multi_submit(&self, msgs: Vec<Message>) -> Vec<Result<Vec<ActionName>, SubmitError>> {
        msgs.into_iter()
            .flat_map(|m| self.apply_oversize_policy(m))
            .map(|m| self.submit_one(m))
            .collect()
    }

    fn submit_one(&self, msg: Message) -> Result<Vec<ActionName>, SubmitError> {
        if let Some(limiter) = &self.ratelimiter {
            if !limiter.check(&msg) {
                trace!(limiter = limiter.name(), "message rate-limited");
                return Err(SubmitError::RateLimited(limiter.name().to_string()));
            }
        }

        let actions = self.rulesets.dispatch(&msg);
        if actions.is_empty() {
            trace!("message matched no ruleset binding");
        }

        self.queue.enqueue(msg)?;
        Ok(actions)
    }

    /// Apply `max_line`/oversize handling, expanding a single message
    /// into one or more per spec.md §4.1.
    fn apply_oversize_policy(&self, mut msg: Message) -> Vec<Message> {
        if msg.len() <= self.max_line {
            return vec![msg];
        }

        match self.oversize_policy {
            OversizePolicy::Accept => {
                msg.flags.oversize = true;
                vec![msg]
            }
            OversizePolicy::Truncate => {
                warn!(
                    preview = %msg.raw_preview(80),
                    len = msg.len(),
                    max_line = self.max_line,
                    "truncating oversize message"
                );
                msg.raw.truncate(self.max_line);
                msg.msg_body = String::from_utf8_lossy(&msg.raw).into_owned();
                msg.flags.truncated = true;
                msg.flags.oversize = true;
                vec![msg]
            }
            OversizePolicy::Split => {
                let chunks = msg.split_raw(self.max_line);
                chunks
                    .into_iter()
                    .map(|chunk| {
                        let body = String::from_utf8_lossy(&chunk).into_owned();
                        let mut part = Message::construct_with_time(
                            msg.input_name.clone(),
                            msg.pri,
                            body,
                            msg.timestamp_reported,
                        );
                        part.hostname = msg.hostname.clone();
                        part.tag = msg.tag.clone();
                        part.app_name = msg.app_name.clone();
                        part.ruleset = msg.ruleset.clone();
                        part.flow_control = msg.flow_control;
                        part.flags.oversize = true;
                        part
                    })
                    .collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::Queue;
    use logforge_protocol::config::QueueConfig;
    use logforge_protocol::types::{Facility, Pri, Severity};

    fn pipeline(max_line: usize, policy: OversizePolicy) -> Pipeline {
        let queue = Arc::new(Queue::new(QueueConfig::default()));
        let default: logforge_ids::RulesetName = "RSYSLOG_DefaultRuleset".parse().unwrap();
        let rulesets = Arc::new(RulesetTable::new(default));
        Pipeline::new(queue, None, rulesets, max_line, policy)
    }

    #[test]
    fn oversize_truncate_shortens_and_flags_message() {
        let pipeline = pipeline(10, OversizePolicy::Truncate);
        let msg = Message::construct("t", Pri::new(Facility::User, Severity::Info), "x".repeat(100));
        let actions = pipeline.submit(msg).unwrap();
        assert!(actions.is_empty());
        assert_eq!(pipeline.queue.len(), 1);
    }

    #[test]
    fn oversize_split_produces_multiple_enqueued_parts() {
        let pipeline = pipeline(10, OversizePolicy::Split);
        let msg = Message::construct("t", Pri::new(Facility::User, Severity::Info), "x".repeat(25));
        pipeline.submit(msg).unwrap();
        assert_eq!(pipeline.queue.len(), 3);
    }

    #[test]
    fn message_under_max_line_passes_through_unmodified() {
        let pipeline = pipeline(1024, OversizePolicy::Truncate);
        let msg = Message::construct("t", Pri::new(Facility::User, Severity::Info), "short");
        pipeline.submit(msg).unwrap();
        assert_eq!(pipeline.queue.len(), 1);
    }
}
