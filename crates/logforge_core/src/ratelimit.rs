//! Token-bucket rate limiting with optional per-source sub-limiting
//! (spec.md §3 "Ratelimiter", §4.2).
//!
//! Each bucket allows `burst` messages per `interval`; once exhausted,
//! messages at or below `discard_severity` are dropped until the
//! interval rolls over. When `per_source_max_states` is set, each
//! distinct source (by `received_from`) gets its own bucket, held in a
//! bounded LRU so an unbounded number of spoofed sources can't grow the
//! limiter state without bound.

use logforge_protocol::config::RatelimiterConfig;
use logforge_protocol::types::{Message, Severity};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Bucket {
    window_start: Instant,
    count: u32,
}

impl Bucket {
    fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            count: 0,
        }
    }

    fn allow(&mut self, now: Instant, interval: Duration, burst: u32) -> bool {
        if now.duration_since(self.window_start) >= interval {
            self.window_start = now;
            self.count = 0;
        }
        if self.count < burst {
            self.count += 1;
            true
        } else {
            false
        }
    }
}

/// Tracks recency so the bounded per-source table can evict the
/// least-recently-used bucket instead of growing forever.
struct LruTable {
    max_states: usize,
    buckets: HashMap<String, Bucket>,
    order: Vec<String>,
}

impl LruTable {
    fn new(max_states: usize) -> Self {
        Self {
            max_states,
            buckets: HashMap::new(),
            order: Vec::new(),
        }
    }

    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            let k = self.order.remove(pos);
            self.order.push(k);
        } else {
            self.order.push(key.to_string());
        }
    }

    fn get_or_insert(&mut self, key: &str, now: Instant) -> &mut Bucket {
        if !self.buckets.contains_key(key) {
            if self.buckets.len() >= self.max_states {
                if let Some(evicted) = self.order.first().cloned() {
                    self.buckets.remove(&evicted);
                    self.order.remove(0);
                }
            }
            self.buckets.insert(key.to_string(), Bucket::new(now));
        }
        self.touch(key);
        self.buckets.get_mut(key).expect("just inserted")
    }
}

enum Scope {
    Global(Bucket),
    PerSource(LruTable),
}

pub struct RateLimiter {
    config: RatelimiterConfig,
    scope: Mutex<Scope>,
}

impl RateLimiter {
    pub fn new(config: RatelimiterConfig) -> Self {
        let scope = match config.per_source_max_states {
            Some(max) => Scope::PerSource(LruTable::new(max.max(1))),
            None => Scope::Global(Bucket::new(Instant::now())),
        };
        Self {
            config,
            scope: Mutex::new(scope),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Returns `true` if `msg` passes the limiter (should be enqueued),
    /// `false` if it should be discarded.
    ///
    /// Messages at or more severe than `discard_severity` always pass:
    /// rate limiting exists to shed noisy, low-value traffic, not to cap
    /// genuinely critical events (spec.md §4.2).
    pub fn check(&self, msg: &Message) -> bool {
        if self.config.discard_severity <= 7 && msg.pri.severity.as_u8() < self.config.discard_severity {
            return true;
        }
        if msg.pri.severity == Severity::Emerg {
            return true;
        }

        let now = Instant::now();
        let interval = Duration::from_secs(self.config.interval_secs.max(1));
        let burst = self.config.burst;

        let mut scope = self.scope.lock().expect("ratelimiter mutex poisoned");
        match &mut *scope {
            Scope::Global(bucket) => bucket.allow(now, interval, burst),
            Scope::PerSource(table) => {
                let key = msg.received_from.as_deref().unwrap_or("<local>");
                table.get_or_insert(key, now).allow(now, interval, burst)
            }
        }
    }
}
