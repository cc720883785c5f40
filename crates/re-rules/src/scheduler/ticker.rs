//! Default [`Ticker`] backed by `tokio::time::interval` (spec §4.F, §6).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::{interval, Interval};

use re_core::ports::Ticker;

/// A `tokio::time::interval`-driven ticker at a fixed resolution.
/// `stop()` is advisory: it flips a flag `tick()` checks before
/// awaiting the next interval, so a pending `tick()` call still
/// returns once, then every subsequent call returns immediately.
pub struct IntervalTicker {
    interval: AsyncMutex<Interval>,
    stopped: AtomicBool,
}

impl IntervalTicker {
    pub fn new(period: Duration) -> Self {
        Self {
            interval: AsyncMutex::new(interval(period.max(Duration::from_millis(1)))),
            stopped: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Ticker for IntervalTicker {
    async fn tick(&self) -> DateTime<Utc> {
        if !self.stopped.load(Ordering::SeqCst) {
            self.interval.lock().await.tick().await;
        }
        Utc::now()
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

/// A ticker driven by an explicit sequence of timestamps, for
/// deterministic scheduler tests.
pub struct ManualTicker {
    remaining: Mutex<std::collections::VecDeque<DateTime<Utc>>>,
}

impl ManualTicker {
    pub fn new(ticks: Vec<DateTime<Utc>>) -> Self {
        Self {
            remaining: Mutex::new(ticks.into()),
        }
    }
}

#[async_trait]
impl Ticker for ManualTicker {
    async fn tick(&self) -> DateTime<Utc> {
        loop {
            if let Some(next) = self.remaining.lock().unwrap().pop_front() {
                return next;
            }
            tokio::task::yield_now().await;
        }
    }

    fn stop(&self) {}
}
