//! The bounded main/ruleset queue (spec.md §3 "Queue", §4.2).
//!
//! Backed by `crossbeam_channel`'s bounded MPMC channel: producers are
//! inputs and the ruleset dispatcher, consumers are a fixed worker pool
//! draining into actions. Watermarks and discard-by-severity are layered
//! on top of the channel's own capacity.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use logforge_protocol::config::QueueConfig;
use logforge_protocol::types::{FlowControl, Message};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EnqueueError {
    #[error("queue is at capacity and flow control forbade blocking")]
    Full,
    #[error("message discarded: queue past discard-mark and severity {0} is below the discard threshold")]
    Discarded(u8),
    #[error("queue has been shut down")]
    ShuttingDown,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DequeueError {
    #[error("queue is empty and the wait timed out")]
    Timeout,
    #[error("queue has been shut down and drained")]
    Closed,
}

#[derive(Debug, Default)]
struct QueueStats {
    enqueued: AtomicU64,
    discarded: AtomicU64,
    max_depth_seen: AtomicU64,
}

/// A bounded queue of `Message`s with rsyslog-style watermark discard
/// behavior (spec.md §4.2 "discard-mark" / "discard-severity").
pub struct Queue {
    config: QueueConfig,
    tx: Sender<Message>,
    rx: Receiver<Message>,
    stats: QueueStats,
}

impl Queue {
    pub fn new(config: QueueConfig) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(config.capacity.max(1));
        Self {
            config,
            tx,
            rx,
            stats: QueueStats::default(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    pub fn enqueued_total(&self) -> u64 {
        self.stats.enqueued.load(Ordering::Relaxed)
    }

    pub fn discarded_total(&self) -> u64 {
        self.stats.discarded.load(Ordering::Relaxed)
    }

    pub fn max_depth_seen(&self) -> u64 {
        self.stats.max_depth_seen.load(Ordering::Relaxed)
    }

    /// Submit a message, honoring its `flow_control` class and this
    /// queue's watermarks (spec.md §4.1/§4.2).
    ///
    /// Past `discard_mark`, a message whose severity is numerically
    /// greater than or equal to `discard_severity` (i.e. less urgent) is
    /// dropped outright rather than enqueued, regardless of flow control
    /// -- this is what keeps a saturated queue from wedging on low-value
    /// traffic.
    pub fn enqueue(&self, msg: Message) -> Result<(), EnqueueError> {
        let depth = self.tx.len();
        self.record_depth(depth);

        if depth >= self.config.discard_mark && msg.pri.severity.as_u8() >= self.config.discard_severity {
            self.stats.discarded.fetch_add(1, Ordering::Relaxed);
            return Err(EnqueueError::Discarded(msg.pri.severity.as_u8()));
        }

        let flow_control = msg.flow_control;
        let result = match flow_control {
            FlowControl::NoDelay => self.tx.try_send(msg).map_err(|e| match e {
                TrySendError::Full(_) => EnqueueError::Full,
                TrySendError::Disconnected(_) => EnqueueError::ShuttingDown,
            }),
            FlowControl::LightDelay => {
                let timeout = Duration::from_millis(self.config.enqueue_timeout_ms);
                self.tx.send_timeout(msg, timeout).map_err(|e| match e {
                    crossbeam_channel::SendTimeoutError::Timeout(_) => EnqueueError::Full,
                    crossbeam_channel::SendTimeoutError::Disconnected(_) => EnqueueError::ShuttingDown,
                })
            }
            FlowControl::FullDelay => self.tx.send(msg).map_err(|_| EnqueueError::ShuttingDown),
        };

        if result.is_ok() {
            self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    /// Blocking dequeue with a timeout, used by worker threads so they
    /// can periodically check a shutdown flag between waits.
    pub fn dequeue(&self, timeout: Duration) -> Result<Message, DequeueError> {
        self.rx.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => DequeueError::Timeout,
            RecvTimeoutError::Disconnected => DequeueError::Closed,
        })
    }

    /// Drain whatever remains, non-blocking (used during shutdown when
    /// `persist_on_shutdown` is false and the queue must empty
    /// synchronously instead).
    pub fn drain(&self) -> Vec<Message> {
        self.rx.try_iter().collect()
    }

    fn record_depth(&self, depth: usize) {
        let depth = depth as u64;
        let mut current = self.stats.max_depth_seen.load(Ordering::Relaxed);
        while depth > current {
            match self.stats.max_depth_seen.compare_exchange_weak(
                current,
                depth,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(seen) => current = seen,
            }
        }
    }
}

/// Spawn a fixed-size worker pool draining `queue`, calling `handler` for
/// every message (spec.md §4.2 "worker pool"). Workers poll with
/// `dequeue_slowdown_us` so a slow downstream action doesn't spin.
pub fn spawn_workers<F>(
    queue: Arc<Queue>,
    shutdown: super::cancel::CancellationToken,
    handler: F,
) -> Vec<std::thread::JoinHandle<()>>
where
    F: Fn(Message) + Send + Sync + Clone + 'static,
{
    let num_workers = queue.config.num_workers.max(1);
    let slowdown = Duration::from_micros(queue.config.dequeue_slowdown_us);
    (0..num_workers)
        .map(|idx| {
            let queue = Arc::clone(&queue);
            let shutdown = shutdown.clone();
            let handler = handler.clone();
            std::thread::Builder::new()
                .name(format!("logforge-worker-{idx}"))
                .spawn(move || {
                    while !shutdown.is_cancelled() {
                        match queue.dequeue(Duration::from_millis(250)) {
                            Ok(msg) => {
                                handler(msg);
                                if !slowdown.is_zero() {
                                    std::thread::sleep(slowdown);
                                }
                            }
                            Err(DequeueError::Timeout) => continue,
                            Err(DequeueError::Closed) => break,
                        }
                    }
                })
                .expect("spawning worker thread")
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use logforge_protocol::types::{Facility, Pri, Severity};

    fn msg(severity: Severity, flow_control: FlowControl) -> Message {
        let mut m = Message::construct("test", Pri::new(Facility::User, severity), "hi");
        m.set_flow_control(flow_control);
        m
    }

    #[test]
    fn enqueue_dequeue_roundtrips() {
        let queue = Queue::new(QueueConfig::default());
        queue.enqueue(msg(Severity::Info, FlowControl::NoDelay)).unwrap();
        let got = queue.dequeue(Duration::from_millis(100)).unwrap();
        assert_eq!(got.msg_body, "hi");
    }

    #[test]
    fn past_discard_mark_drops_low_severity_but_keeps_high_severity() {
        let mut cfg = QueueConfig::default();
        cfg.capacity = 4;
        cfg.discard_mark = 2;
        cfg.discard_severity = 4; // warning (4) and below-urgency discarded
        let queue = Queue::new(cfg);

        queue.enqueue(msg(Severity::Debug, FlowControl::NoDelay)).unwrap();
        queue.enqueue(msg(Severity::Debug, FlowControl::NoDelay)).unwrap();

        let err = queue
            .enqueue(msg(Severity::Notice, FlowControl::NoDelay))
            .unwrap_err();
        assert_eq!(err, EnqueueError::Discarded(Severity::Notice.as_u8()));

        queue
            .enqueue(msg(Severity::Crit, FlowControl::NoDelay))
            .expect("critical severity bypasses discard threshold");
    }

    #[test]
    fn no_delay_drops_on_full_queue_instead_of_blocking() {
        let mut cfg = QueueConfig::default();
        cfg.capacity = 1;
        cfg.discard_mark = usize::MAX;
        let queue = Queue::new(cfg);
        queue.enqueue(msg(Severity::Info, FlowControl::NoDelay)).unwrap();
        let err = queue.enqueue(msg(Severity::Info, FlowControl::NoDelay)).unwrap_err();
        assert_eq!(err, EnqueueError::Full);
    }
}
