//! Keyed sliding-window rate limiter
//!
//! Admits at most `calls` acquisitions per `period` for each key. When a key
//! is exhausted, `acquire` waits until the oldest admission leaves the window
//! instead of failing, so every caller is eventually served.
//!
//! Waiters on the same key are served in arrival order: the per-key window is
//! guarded by a `tokio::sync::Mutex`, which hands out its lock FIFO, and the
//! lock is held while waiting for a slot.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::{Instant, sleep_until};
use tracing::{debug, trace};

/// Key used when the caller does not provide one
pub const GLOBAL_KEY: &str = "*";

/// Authorization to perform one call
#[derive(Debug, Clone)]
pub struct Permit {
    pub key: String,

    /// Time spent waiting for a free slot
    pub waited: Duration,
}

type Window = Arc<tokio::sync::Mutex<VecDeque<Instant>>>;

#[derive(Debug)]
pub struct RateLimiter {
    calls: usize,
    period: Duration,
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    /// Create a limiter admitting `calls` per `period` and key.
    ///
    /// A limit of zero calls would block forever and is raised to one.
    pub fn new(calls: usize, period: Duration) -> Self {
        Self {
            calls: calls.max(1),
            period,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    fn window(&self, key: &str) -> Window {
        // never held across an await
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        windows.entry(key.to_string()).or_default().clone()
    }

    /// Wait for a free slot on `key` (or the global key) and take it
    pub async fn acquire(&self, key: Option<&str>) -> Permit {
        let key = key.unwrap_or(GLOBAL_KEY);
        let window = self.window(key);
        let started = Instant::now();

        let mut admitted = window.lock().await;

        loop {
            let now = Instant::now();
            while admitted
                .front()
                .is_some_and(|oldest| now.duration_since(*oldest) >= self.period)
            {
                admitted.pop_front();
            }

            if admitted.len() < self.calls {
                admitted.push_back(now);
                let waited = now.duration_since(started);
                if waited.is_zero() {
                    trace!(key, "permit granted");
                } else {
                    debug!(key, waited_ms = waited.as_millis() as u64, "permit granted after waiting");
                }
                return Permit {
                    key: key.to_string(),
                    waited,
                };
            }

            // the window is full, so there is an oldest admission
            if let Some(oldest) = admitted.front().copied() {
                trace!(key, "rate limit exhausted, waiting for next slot");
                sleep_until(oldest + self.period).await;
            }
        }
    }
}
