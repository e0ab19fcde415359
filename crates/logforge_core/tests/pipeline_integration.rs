//! End-to-end pipeline tests: submit -> queue -> worker -> ruleset
//! dispatch -> action (spec.md §8 testable property 1 and scenario-style
//! coverage of §4.1-§4.4).

use logforge_core::action::{Action, ActionOutcome, DiscardAction, FileAction};
use logforge_core::cancel::CancellationToken;
use logforge_core::pipeline::Pipeline;
use logforge_core::queue::{spawn_workers, Queue};
use logforge_core::ratelimit::RateLimiter;
use logforge_core::ruleset::{Ruleset, RulesetTable};
use logforge_ids::{ActionName, RulesetName};
use logforge_protocol::config::{QueueConfig, RatelimiterConfig};
use logforge_protocol::filters::{ActionFilter, HostSelector, MainFilter, PriorityMask, TagSelector};
use logforge_protocol::types::{Facility, FlowControl, Message, OversizePolicy, Pri, Severity};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn everything() -> ActionFilter {
    ActionFilter {
        host: HostSelector::Any,
        tag: TagSelector::Any,
        main: MainFilter::Priority(PriorityMask::all()),
    }
}

/// spec.md §8 property 1: every message submitted under non-discard
/// conditions is dispatched exactly once to every action whose filter
/// matches. This wires a full queue + worker pool + ruleset dispatch and
/// drives a real action, rather than only exercising `Pipeline::submit`'s
/// return value.
#[test]
fn submitted_message_is_dispatched_exactly_once_to_every_matching_action() {
    let default: RulesetName = "RSYSLOG_DefaultRuleset".parse().unwrap();
    let mut ruleset = Ruleset::new(default.clone());
    let file_action: ActionName = "audit-file".parse().unwrap();
    let discard_action: ActionName = "catch-all".parse().unwrap();
    ruleset.bind(everything(), file_action.clone());
    ruleset.bind(everything(), discard_action.clone());

    let mut table = RulesetTable::new(default);
    table.insert(ruleset);
    let rulesets = Arc::new(table);

    let queue = Arc::new(Queue::new(QueueConfig::default()));
    let pipeline = Pipeline::new(queue.clone(), None, Arc::clone(&rulesets), 8192, OversizePolicy::Truncate);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.log");
    let file = Arc::new(FileAction::open("audit-file", path.clone()).unwrap());
    let discard = Arc::new(DiscardAction::new("catch-all"));

    let mut actions: HashMap<String, Arc<dyn Action>> = HashMap::new();
    actions.insert(file_action.to_string(), file.clone());
    actions.insert(discard_action.to_string(), discard.clone());
    let actions = Arc::new(actions);

    let calls: Arc<Mutex<Vec<(String, ActionOutcome)>>> = Arc::new(Mutex::new(Vec::new()));
    let shutdown = CancellationToken::new();
    let worker_actions = Arc::clone(&actions);
    let worker_calls = Arc::clone(&calls);
    let rulesets_for_worker = Arc::clone(&rulesets);
    let workers = spawn_workers(Arc::clone(&queue), shutdown.clone(), move |msg| {
        for name in rulesets_for_worker.dispatch(&msg) {
            if let Some(action) = worker_actions.get(name.as_str()) {
                let outcome = action.process(&msg);
                worker_calls.lock().unwrap().push((name.to_string(), outcome));
            }
        }
    });

    let msg = Message::construct("test", Pri::new(Facility::User, Severity::Info), "hello world");
    pipeline.submit(msg).unwrap();

    std::thread::sleep(Duration::from_millis(300));
    shutdown.cancel();
    for w in workers {
        w.join().unwrap();
    }

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 2, "message should reach both bound actions exactly once");
    assert!(calls.iter().any(|(n, o)| n == "audit-file" && *o == ActionOutcome::Committed));
    assert!(calls.iter().any(|(n, o)| n == "catch-all" && *o == ActionOutcome::Committed));

    let contents = std::fs::read_to_string(&path).unwrap();
    assert_eq!(contents, "hello world\n");
}

/// spec.md §8 scenario E: ratelimiter(interval=1, burst=2), three
/// messages with the same key in quick succession -> 2 pass, 1 discarded.
#[test]
fn ratelimit_scenario_e_two_pass_one_discarded() {
    let cfg = RatelimiterConfig {
        interval_secs: 1,
        burst: 2,
        discard_severity: 8,
        ..RatelimiterConfig::default()
    };
    let limiter = RateLimiter::new(cfg);

    let make = || Message::construct("test", Pri::new(Facility::User, Severity::Info), "hi");
    let results: Vec<bool> = (0..3).map(|_| limiter.check(&make())).collect();
    assert_eq!(results, vec![true, true, false]);
}

/// spec.md §8 boundary behavior 12 (capacity 10, discard-mark 8,
/// discard-severity 5), read together with the enqueue rule in spec.md
/// §3/§4.2 ("severity numerically greater than or equal to
/// discard-severity, i.e. less urgent, is dropped past discard-mark"):
/// past the mark, a severity-4 (warning) message is more urgent than the
/// threshold and succeeds, while a severity-6 (info) message is less
/// urgent than the threshold and is discarded.
#[test]
fn queue_discard_boundary_matches_spec_example() {
    let cfg = QueueConfig {
        capacity: 10,
        discard_mark: 8,
        discard_severity: 5,
        ..QueueConfig::default()
    };
    let queue = Queue::new(cfg);

    for _ in 0..8 {
        let mut m = Message::construct("t", Pri::new(Facility::User, Severity::Debug), "pad");
        m.set_flow_control(FlowControl::NoDelay);
        queue.enqueue(m).unwrap();
    }

    let mut severity4 = Message::construct("t", Pri::new(Facility::User, Severity::Warning), "keep");
    severity4.set_flow_control(FlowControl::NoDelay);
    queue
        .enqueue(severity4)
        .expect("severity 4 (warning) is more urgent than the discard threshold of 5 (notice)");

    let mut severity6 = Message::construct("t", Pri::new(Facility::User, Severity::Info), "drop");
    severity6.set_flow_control(FlowControl::NoDelay);
    let err = queue.enqueue(severity6).unwrap_err();
    assert!(err.to_string().contains("discarded"));
}

proptest::proptest! {
    /// spec.md §8 property 9 (generalized): splitting a message of any
    /// length strictly greater than `chunk_size` into `chunk_size`-byte
    /// chunks preserves total byte count and order.
    #[test]
    fn oversize_split_always_preserves_bytes(len in 1025usize..20_000, chunk_size in 64usize..4096) {
        let body = "x".repeat(len);
        let msg = Message::construct("t", Pri::new(Facility::User, Severity::Info), body.clone());
        let parts = msg.split_raw(chunk_size);
        let total: usize = parts.iter().map(|p| p.len()).sum();
        prop_assert_eq!(total, body.len());
        prop_assert!(parts.iter().all(|p| p.len() <= chunk_size));
        let reassembled: Vec<u8> = parts.into_iter().flatten().collect();
        prop_assert_eq!(reassembled, msg.raw);
    }
}
