//! Wires a `SystemConfig` into a running daemon instance: builds the
//! actions and rulesets it names, starts the main-queue worker pool,
//! bridges every configured imdocker input onto the pipeline, and drives
//! the signal-based lifecycle once everything is up (spec.md §2 "Data
//! flow", §4.7).

use crate::janitor::Janitor;
use crate::signals::{self, SignalEvent};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use logforge_core::action::{DiscardAction, FileAction};
use logforge_core::{
    spawn_workers, Action, CancellationToken, MarkGenerator, Pipeline, Queue, RateLimitedAction, RateLimiter,
    Ruleset, RulesetTable,
};
use logforge_docker::DockerInput;
use logforge_forward::ForwarderAction;
use logforge_ids::{ActionName, RulesetName};
use logforge_logging::LoggingHandle;
use logforge_protocol::config::{ActionKind, SystemConfig};
use logforge_protocol::error::{ErrorKind, LogforgeError, Result};
use logforge_protocol::types::Message;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{info, warn};

pub struct Daemon {
    config: SystemConfig,
    pipeline: Arc<Pipeline>,
    queue: Arc<Queue>,
    actions: Arc<HashMap<ActionName, Arc<dyn Action>>>,
    logging: LoggingHandle,
    shutdown: CancellationToken,
    debug: AtomicBool,
    worker_handles: Vec<JoinHandle<()>>,
    docker_inputs: Vec<DockerInput>,
    docker_bridge_handles: Vec<JoinHandle<()>>,
    mark_handle: Option<JoinHandle<()>>,
    janitor_handle: JoinHandle<()>,
}

impl Daemon {
    pub fn bootstrap(config: SystemConfig, logging: LoggingHandle) -> Result<Self> {
        let actions = Arc::new(build_actions(&config)?);
        let rulesets = Arc::new(build_rulesets(&config)?);
        let queue = Arc::new(Queue::new(config.queue.clone()));
        let ratelimiter = config.ratelimit.clone().map(|c| Arc::new(RateLimiter::new(c)));
        let pipeline = Arc::new(Pipeline::new(
            Arc::clone(&queue),
            ratelimiter,
            Arc::clone(&rulesets),
            config.max_line,
            config.oversize_policy,
        ));

        let shutdown = CancellationToken::new();

        let worker_handles = {
            let rulesets = Arc::clone(&rulesets);
            let actions = Arc::clone(&actions);
            spawn_workers(Arc::clone(&queue), shutdown.clone(), move |msg: Message| {
                for name in rulesets.dispatch(&msg) {
                    match actions.get(&name) {
                        Some(action) => {
                            action.process(&msg);
                            // spec.md §4.4/§4.5 commitTransaction: this
                            // queue dequeues one message at a time, so a
                            // "batch" is a single message -- flush right
                            // after processing it instead of waiting for
                            // the janitor's idle-handle sweep, which
                            // could otherwise leave a forwarder's TCP
                            // send buffer undelivered for its whole
                            // interval under steady sub-cap traffic.
                            action.flush();
                        }
                        None => warn!(action = %name, "ruleset bound to an action that was never configured"),
                    }
                }
            })
        };

        let mut docker_inputs = Vec::new();
        let mut docker_bridge_handles = Vec::new();
        for input_config in &config.docker_inputs {
            let (tx, rx) = crossbeam_channel::unbounded();
            let input = DockerInput::start(input_config.clone(), tx)
                .map_err(|e| LogforgeError::with_source(ErrorKind::DockerApi, "starting imdocker input", e))?;
            docker_inputs.push(input);

            let ruleset_override = input_config
                .ruleset
                .clone()
                .map(RulesetName::parse)
                .transpose()
                .map_err(|e| LogforgeError::new(ErrorKind::InvalidConfig, format!("docker_inputs[].ruleset: {e}")))?;
            docker_bridge_handles.push(spawn_docker_bridge(rx, Arc::clone(&pipeline), ruleset_override, shutdown.clone()));
        }

        let mark_handle = (config.mark_interval_secs > 0)
            .then(|| spawn_mark_generator(Arc::clone(&pipeline), config.mark_interval_secs, shutdown.clone()));

        let janitor_handle = {
            let mut janitor = Janitor::new();
            let idle_actions = Arc::clone(&actions);
            janitor.register("flush-idle-action-handles", move || {
                for action in idle_actions.values() {
                    action.flush();
                }
            });
            Arc::new(janitor).spawn(Duration::from_secs(config.janitor_interval_mins.max(1) * 60), shutdown.clone())
        };

        Ok(Self {
            config,
            pipeline,
            queue,
            actions,
            logging,
            shutdown,
            debug: AtomicBool::new(false),
            worker_handles,
            docker_inputs,
            docker_bridge_handles,
            mark_handle,
            janitor_handle,
        })
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    /// Blocks, reacting to signal events, until a shutdown signal (or a
    /// disconnected signal channel) arrives (spec.md §4.7).
    pub fn run(&self, signals: Receiver<SignalEvent>) {
        loop {
            match signals.recv_timeout(Duration::from_millis(500)) {
                Ok(SignalEvent::Shutdown) => {
                    info!("shutdown signal received");
                    break;
                }
                Ok(SignalEvent::Reload) => self.hup(),
                Ok(SignalEvent::ChildExited) => signals::reap_children(),
                Ok(SignalEvent::ToggleDebug) => self.toggle_debug(),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    /// spec.md §4.7 HUP handling: reopen every action's handles and the
    /// log sink, reset stderr suppression. Must never tear down the
    /// queue or any action's retry state -- HUP is a refresh, not a
    /// restart.
    pub fn hup(&self) {
        info!("HUP: reopening action handles and log sinks");
        for action in self.actions.values() {
            action.hup();
        }
        if let Err(e) = self.logging.reopen() {
            warn!(error = %e, "failed to reopen log file on HUP");
        }
        self.logging.stderr_budget().reset();
    }

    fn toggle_debug(&self) {
        let now = !self.debug.load(Ordering::Relaxed);
        self.debug.store(now, Ordering::Relaxed);
        info!(debug = now, "toggled debug logging via SIGUSR1");
    }

    pub fn request_shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Drains the main queue up to the configured shutdown timeout,
    /// stops every background thread, flushes every action's buffered
    /// state, and joins everything before returning (spec.md §4.2, §4.7
    /// "Shutdown").
    pub fn shutdown(self) {
        let Daemon {
            config,
            pipeline: _pipeline,
            queue,
            actions,
            logging: _logging,
            shutdown,
            debug: _debug,
            worker_handles,
            mut docker_inputs,
            docker_bridge_handles,
            mark_handle,
            janitor_handle,
        } = self;

        shutdown.cancel();

        let deadline = Instant::now() + Duration::from_millis(config.queue.queue_shutdown_timeout_ms);
        while !queue.is_empty() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }
        let remaining = queue.len();
        if remaining > 0 {
            if config.queue.persist_on_shutdown {
                warn!(remaining, "shutdown timeout reached with messages still queued; persist-on-shutdown keeps them");
            } else {
                let dropped = queue.drain().len();
                warn!(dropped, "persist-on-shutdown disabled and shutdown timed out: messages dropped");
            }
        }

        for action in actions.values() {
            action.flush();
        }

        for input in docker_inputs.drain(..) {
            input.shutdown();
        }
        for handle in docker_bridge_handles {
            let _ = handle.join();
        }
        if let Some(handle) = mark_handle {
            let _ = handle.join();
        }
        for handle in worker_handles {
            let _ = handle.join();
        }
        let _ = janitor_handle.join();
    }
}

fn build_actions(config: &SystemConfig) -> Result<HashMap<ActionName, Arc<dyn Action>>> {
    let mut actions: HashMap<ActionName, Arc<dyn Action>> = HashMap::new();

    for action_config in &config.actions {
        let name = ActionName::parse(action_config.name.clone())
            .map_err(|e| LogforgeError::new(ErrorKind::InvalidConfig, format!("actions[].name: {e}")))?;

        let base: Arc<dyn Action> = match &action_config.kind {
            ActionKind::Forward(fwd_cfg) => {
                Arc::new(ForwarderAction::new(action_config.name.clone(), fwd_cfg.clone()))
            }
            ActionKind::File { path } => Arc::new(
                FileAction::open(action_config.name.clone(), path.clone()).map_err(|e| {
                    LogforgeError::new(ErrorKind::InvalidConfig, format!("action {}: {e}", action_config.name))
                })?,
            ),
            ActionKind::Discard => Arc::new(DiscardAction::new(action_config.name.clone())),
            ActionKind::Pipe { .. }
            | ActionKind::Tty
            | ActionKind::UsersWall
            | ActionKind::Shell { .. }
            | ActionKind::Database => {
                return Err(LogforgeError::new(
                    ErrorKind::Unsupported,
                    format!(
                        "action {} uses an out-of-scope action kind (spec.md §1 Non-goals)",
                        action_config.name
                    ),
                ));
            }
        };

        let action: Arc<dyn Action> = match &action_config.ratelimit {
            Some(rl_cfg) => Arc::new(RateLimitedAction::new(base, Arc::new(RateLimiter::new(rl_cfg.clone())))),
            None => base,
        };

        if actions.insert(name.clone(), action).is_some() {
            return Err(LogforgeError::new(
                ErrorKind::InvalidConfig,
                format!("duplicate action name: {name}"),
            ));
        }
    }

    Ok(actions)
}

/// Groups every configured action under its bound ruleset, building the
/// `(filter, action)` bindings `RulesetTable::dispatch` evaluates in
/// declaration order (spec.md §3 "Ruleset", §4.3).
fn build_rulesets(config: &SystemConfig) -> Result<RulesetTable> {
    let default_name =
        RulesetName::parse("RSYSLOG_DefaultRuleset").expect("literal default ruleset name is always valid");
    let mut table = RulesetTable::new(default_name);
    let mut rulesets: HashMap<String, Ruleset> = HashMap::new();

    for action_config in &config.actions {
        let ruleset_name = RulesetName::parse(action_config.ruleset.clone())
            .map_err(|e| LogforgeError::new(ErrorKind::InvalidConfig, format!("actions[].ruleset: {e}")))?;
        let action_name = ActionName::parse(action_config.name.clone())
            .map_err(|e| LogforgeError::new(ErrorKind::InvalidConfig, format!("actions[].name: {e}")))?;

        rulesets
            .entry(action_config.ruleset.clone())
            .or_insert_with(|| Ruleset::new(ruleset_name))
            .bind(action_config.filter.clone(), action_name);
    }

    for ruleset in rulesets.into_values() {
        table.insert(ruleset);
    }
    Ok(table)
}

fn spawn_docker_bridge(
    rx: crossbeam_channel::Receiver<Message>,
    pipeline: Arc<Pipeline>,
    ruleset_override: Option<RulesetName>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name("logforge-imdocker-bridge".into())
        .spawn(move || {
            while !shutdown.is_cancelled() {
                match rx.recv_timeout(Duration::from_millis(250)) {
                    Ok(mut msg) => {
                        if let Some(ruleset) = &ruleset_override {
                            msg.set_ruleset(ruleset.clone());
                        }
                        if let Err(e) = pipeline.submit(msg) {
                            warn!(error = %e, "dropping imdocker message");
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        })
        .expect("spawning imdocker bridge thread")
}

/// Periodic synthetic `-- MARK --` message (spec.md §9 "Legacy HUP-based
/// 'mark' ... logic -- retained conceptually: a periodic timer enqueues a
/// synthetic mark message when `markInterval>0`").
fn spawn_mark_generator(pipeline: Arc<Pipeline>, interval_secs: u64, shutdown: CancellationToken) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name("logforge-mark".into())
        .spawn(move || {
            let mut generator = MarkGenerator::new(interval_secs);
            while !shutdown.is_cancelled() {
                std::thread::sleep(Duration::from_secs(1));
                if let Some(mark) = generator.tick() {
                    if let Err(e) = pipeline.submit(mark) {
                        warn!(error = %e, "failed to submit MARK message");
                    }
                }
            }
        })
        .expect("spawning mark generator thread")
}

#[cfg(test)]
mod tests {
    use super::*;
    use logforge_protocol::config::{ActionConfig, QueueConfig};
    use logforge_protocol::filters::{ActionFilter, HostSelector, MainFilter, PriorityMask, TagSelector};
    use logforge_protocol::types::{Facility, Pri, Severity};

    #[test]
    fn build_actions_rejects_duplicate_names() {
        let mut config = SystemConfig::default();
        config.actions = vec![
            ActionConfig {
                name: "dup".into(),
                ruleset: "RSYSLOG_DefaultRuleset".into(),
                kind: ActionKind::Discard,
                filter: ActionFilter::default(),
                ratelimit: None,
                queue: QueueConfig::default(),
            },
            ActionConfig {
                name: "dup".into(),
                ruleset: "RSYSLOG_DefaultRuleset".into(),
                kind: ActionKind::Discard,
                filter: ActionFilter::default(),
                ratelimit: None,
                queue: QueueConfig::default(),
            },
        ];
        assert!(build_actions(&config).is_err());
    }

    #[test]
    fn build_rulesets_groups_bindings_under_shared_ruleset() {
        let mut config = SystemConfig::default();
        config.actions = vec![
            ActionConfig {
                name: "a1".into(),
                ruleset: "RSYSLOG_DefaultRuleset".into(),
                kind: ActionKind::Discard,
                filter: ActionFilter {
                    host: HostSelector::Any,
                    tag: TagSelector::Any,
                    main: MainFilter::Priority(PriorityMask::all()),
                },
                ratelimit: None,
                queue: QueueConfig::default(),
            },
            ActionConfig {
                name: "a2".into(),
                ruleset: "RSYSLOG_DefaultRuleset".into(),
                kind: ActionKind::Discard,
                filter: ActionFilter {
                    host: HostSelector::Any,
                    tag: TagSelector::Any,
                    main: MainFilter::Priority(PriorityMask::all()),
                },
                ratelimit: None,
                queue: QueueConfig::default(),
            },
        ];
        let table = build_rulesets(&config).unwrap();
        let msg = Message::construct("t", Pri::new(Facility::User, Severity::Info), "hi");
        assert_eq!(table.dispatch(&msg).len(), 2);
    }
}
