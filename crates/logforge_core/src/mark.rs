//! Synthetic MARK message generation (SPEC_FULL.md supplemented feature:
//! the original daemon emits a periodic `-- MARK --` message at
//! `syslog.info` so log-watchers can tell a quiet period from a dead
//! pipe). Only emitted when `mark_interval_secs` is nonzero.

use logforge_protocol::types::{Facility, Message, Pri, Severity};
use std::time::{Duration, Instant};

pub struct MarkGenerator {
    interval: Duration,
    last_emitted: Instant,
}

impl MarkGenerator {
    pub fn new(interval_secs: u64) -> Self {
        Self {
            interval: Duration::from_secs(interval_secs),
            last_emitted: Instant::now(),
        }
    }

    pub fn enabled(&self) -> bool {
        !self.interval.is_zero()
    }

    /// Returns a MARK message if the interval has elapsed since the last
    /// one, advancing the internal clock as a side effect.
    pub fn tick(&mut self) -> Option<Message> {
        if !self.enabled() {
            return None;
        }
        if self.last_emitted.elapsed() < self.interval {
            return None;
        }
        self.last_emitted = Instant::now();
        let mut msg = Message::construct(
            "mark",
            Pri::new(Facility::Syslog, Severity::Info),
            "-- MARK --",
        );
        msg.flags.mark = true;
        msg.flags.internal_origin = true;
        Some(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_generator_never_emits() {
        let mut gen = MarkGenerator::new(0);
        assert!(!gen.enabled());
        assert!(gen.tick().is_none());
    }

    #[test]
    fn enabled_generator_does_not_emit_before_interval_elapses() {
        let mut gen = MarkGenerator::new(3600);
        assert!(gen.tick().is_none());
    }
}
