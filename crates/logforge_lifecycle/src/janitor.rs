//! Periodic cleanup (spec.md §4.7 "Janitor: every `janitorInterval`
//! minutes (default 10), run registered cleanup callbacks (idle-file-
//! handle close, DNS cache trim, 'gone-away-senders' eviction)").

use logforge_core::CancellationToken;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// A bag of named cleanup callbacks, run in registration order on every
/// tick. Callbacks are `Fn` rather than `FnMut` since they close over
/// shared (`Arc`-guarded) state rather than owning it exclusively.
#[derive(Default)]
pub struct Janitor {
    callbacks: Vec<(String, Box<dyn Fn() + Send + Sync>)>,
}

impl Janitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, callback: impl Fn() + Send + Sync + 'static) {
        self.callbacks.push((name.into(), Box::new(callback)));
    }

    pub fn run_once(&self) {
        for (name, callback) in &self.callbacks {
            debug!(callback = %name, "running janitor callback");
            callback();
        }
    }

    /// Spawns a thread that calls `run_once` every `interval`, waking up
    /// in short increments so `shutdown` is honored promptly rather than
    /// at the next multi-minute boundary.
    pub fn spawn(self: Arc<Self>, interval: Duration, shutdown: CancellationToken) -> std::thread::JoinHandle<()> {
        std::thread::Builder::new()
            .name("logforge-janitor".into())
            .spawn(move || {
                let tick = Duration::from_millis(500).min(interval);
                let mut elapsed = Duration::ZERO;
                while !shutdown.is_cancelled() {
                    std::thread::sleep(tick);
                    elapsed += tick;
                    if elapsed >= interval {
                        self.run_once();
                        elapsed = Duration::ZERO;
                    }
                }
            })
            .expect("spawning janitor thread")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn run_once_invokes_every_registered_callback() {
        let mut janitor = Janitor::new();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let counter = Arc::clone(&counter);
            janitor.register("bump", move || {
                counter.fetch_add(1, Ordering::Relaxed);
            });
        }
        janitor.run_once();
        assert_eq!(counter.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn spawned_janitor_ticks_and_stops_on_shutdown() {
        let mut janitor = Janitor::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);
        janitor.register("bump", move || {
            counter_clone.fetch_add(1, Ordering::Relaxed);
        });

        let shutdown = CancellationToken::new();
        let handle = Arc::new(janitor).spawn(Duration::from_millis(50), shutdown.clone());
        std::thread::sleep(Duration::from_millis(200));
        shutdown.cancel();
        handle.join().unwrap();
        assert!(counter.load(Ordering::Relaxed) >= 2);
    }
}
