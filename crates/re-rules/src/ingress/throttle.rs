//! Throttle / Loop Guard (spec §4.G): a global token-bucket rate limit
//! plus a per-`domain:channel:subtopic` repeat-pattern counter.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use re_core::config::ThrottleConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    RateLimited,
    LoopDetected,
}

struct TokenBucket {
    tokens: f64,
    capacity: f64,
    rate_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(rate_per_sec: f64) -> Self {
        Self {
            tokens: rate_per_sec,
            capacity: rate_per_sec,
            rate_per_sec,
            last_refill: Instant::now(),
        }
    }

    fn try_consume(&mut self, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate_per_sec).min(self.capacity);
        self.last_refill = now;
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

struct LoopEntry {
    count: u32,
    last_seen: Instant,
}

pub struct ThrottleGuard {
    config: ThrottleConfig,
    bucket: Mutex<TokenBucket>,
    loop_state: Mutex<HashMap<String, LoopEntry>>,
}

impl ThrottleGuard {
    pub fn new(config: ThrottleConfig) -> Arc<Self> {
        let bucket = TokenBucket::new(config.rate_per_second.max(1) as f64);
        Arc::new(Self {
            config,
            bucket: Mutex::new(bucket),
            loop_state: Mutex::new(HashMap::new()),
        })
    }

    pub fn check(&self, domain: &str, channel: &str, subtopic: &str) -> Verdict {
        self.check_at(domain, channel, subtopic, Instant::now())
    }

    fn check_at(&self, domain: &str, channel: &str, subtopic: &str, now: Instant) -> Verdict {
        if !self.bucket.lock().unwrap().try_consume(now) {
            return Verdict::RateLimited;
        }

        let key = format!("{domain}:{channel}:{subtopic}");
        let mut state = self.loop_state.lock().unwrap();
        let entry = state.entry(key).or_insert(LoopEntry { count: 0, last_seen: now });

        if now.saturating_duration_since(entry.last_seen) > self.config.loop_window {
            entry.count = 1;
        } else {
            entry.count += 1;
        }
        entry.last_seen = now;

        if entry.count > self.config.loop_threshold {
            Verdict::LoopDetected
        } else {
            Verdict::Allow
        }
    }

    /// Evict entries whose last-seen timestamp is older than twice the
    /// configured window. Call periodically (e.g. every `loop_window`)
    /// from a background task.
    pub fn evict_stale(&self) {
        let cutoff = self.config.loop_window * 2;
        let now = Instant::now();
        self.loop_state
            .lock()
            .unwrap()
            .retain(|_, entry| now.saturating_duration_since(entry.last_seen) <= cutoff);
    }

    /// Spawn the background janitor loop, running every `loop_window`.
    pub fn spawn_janitor(self: &Arc<Self>) {
        let guard = self.clone();
        let interval = guard.config.loop_window.max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                guard.evict_stale();
            }
        });
    }
}
