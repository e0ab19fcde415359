//! The forwarder action: a pool of targets sharing one configuration,
//! implementing `logforge_core::Action` so it can be bound into a
//! ruleset like any other action (spec.md §3 "Forwarder action -- target
//! pool", §4.5).

use crate::target::Target;
use logforge_core::{Action, ActionOutcome, ActionState};
use logforge_protocol::config::ForwarderConfig;
use logforge_protocol::types::Message;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::warn;

pub struct ForwarderAction {
    name: String,
    targets: Vec<Target>,
    next: AtomicUsize,
}

impl ForwarderAction {
    pub fn new(name: impl Into<String>, config: ForwarderConfig) -> Self {
        let ports = if config.ports.is_empty() {
            vec![514u16; config.targets.len()]
        } else {
            config.ports.clone()
        };
        let targets = config
            .targets
            .iter()
            .zip(ports.into_iter().chain(std::iter::repeat(514)))
            .map(|(host, port)| Target::new(host.clone(), port, config.clone()))
            .collect();
        Self {
            name: name.into(),
            targets,
            next: AtomicUsize::new(0),
        }
    }

    /// Every target's cumulative send/error counters, in pool order --
    /// used by the stats reporter (spec.md §6 impstats-equivalent).
    pub fn target_stats(&self) -> Vec<(&str, u64, u64, u64)> {
        self.targets
            .iter()
            .map(|t| {
                let s = t.stats();
                (
                    t.host.as_str(),
                    s.messages_sent.load(Ordering::Relaxed),
                    s.bytes_sent.load(Ordering::Relaxed),
                    s.connection_errors.load(Ordering::Relaxed),
                )
            })
            .collect()
    }

    pub fn flush_all(&self) {
        for target in &self.targets {
            if let Err(e) = target.flush() {
                warn!(action = %self.name, error = %e, "failed to flush forwarder target");
            }
        }
    }

    fn ready_targets(&self) -> Vec<&Target> {
        self.targets.iter().filter(|t| t.state() == ActionState::Ready).collect()
    }
}

impl Action for ForwarderAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> ActionState {
        if self.targets.is_empty() {
            return ActionState::Disabled;
        }
        if self.targets.iter().any(|t| t.state() == ActionState::Ready) {
            ActionState::Ready
        } else if self.targets.iter().all(|t| t.state() == ActionState::Disabled) {
            ActionState::Disabled
        } else {
            ActionState::Suspended
        }
    }

    fn process(&self, msg: &Message) -> ActionOutcome {
        let ready = self.ready_targets();
        if ready.is_empty() {
            return if self.state() == ActionState::Disabled {
                ActionOutcome::Disabled
            } else {
                ActionOutcome::Suspended
            };
        }

        let payload = msg.raw.as_slice();

        // Round-robin across this pool's ready targets. `send_to_all`
        // (spec.md §4.5 / `bSendToAll`) is a per-target, per-resolved-
        // address fan-out -- see `Target::write_framed` -- not a
        // pool-wide broadcast, so it plays no part here.
        let start = self.next.fetch_add(1, Ordering::Relaxed) % ready.len();
        for offset in 0..ready.len() {
            let target = ready[(start + offset) % ready.len()];
            if target.send(payload).is_ok() {
                return ActionOutcome::Committed;
            }
        }
        ActionOutcome::Suspended
    }

    fn flush(&self) {
        self.flush_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logforge_protocol::types::{Facility, Pri, Severity};

    #[test]
    fn pool_with_no_targets_is_disabled() {
        let action = ForwarderAction::new("fwd1", ForwarderConfig::default());
        assert_eq!(action.state(), ActionState::Disabled);
    }

    #[test]
    fn process_with_no_ready_targets_reports_disabled() {
        let cfg = ForwarderConfig {
            targets: vec!["127.0.0.1".into()],
            ports: vec![1],
            ..ForwarderConfig::default()
        };
        let action = ForwarderAction::new("fwd1", cfg);
        let msg = Message::construct("t", Pri::new(Facility::User, Severity::Info), "hi");
        for _ in 0..6 {
            action.process(&msg);
        }
        assert_eq!(action.state(), ActionState::Disabled);
    }
}
