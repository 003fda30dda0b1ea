//! Short-lived cache of the aggregated series
//!
//! [`TtlCache`] holds a single value together with the instant it was
//! computed. Reads younger than the TTL are served from memory; older reads
//! run the recompute closure. The slot is guarded by an async mutex that is
//! held across recomputation, so simultaneous misses recompute once and the
//! other readers get the fresh value.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, instrument, trace};

use crate::series::AggregatedSeries;
use crate::storage::{SampleStore, StorageError};

/// Source of the current instant, replaceable in tests
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    computed_at: Instant,
}

/// Single-value cache with a fixed time-to-live
pub struct TtlCache<V> {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    slot: tokio::sync::Mutex<Option<CacheEntry<V>>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            slot: tokio::sync::Mutex::new(None),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the cached value, or compute and store a fresh one if it expired
    ///
    /// A failed recomputation leaves the slot empty and returns the error.
    pub async fn get_or_recompute<F, Fut, E>(&self, recompute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let mut slot = self.slot.lock().await;

        if let Some(entry) = slot.as_ref() {
            let age = self.clock.now().saturating_duration_since(entry.computed_at);
            if age < self.ttl {
                trace!(age_ms = age.as_millis() as u64, "cache hit");
                return Ok(entry.value.clone());
            }
        }

        debug!("cache miss, recomputing");
        *slot = None;
        let value = recompute().await?;
        *slot = Some(CacheEntry {
            value: value.clone(),
            computed_at: self.clock.now(),
        });

        Ok(value)
    }
}

/// Raised when the series could not be rebuilt from the sample store
#[derive(Debug)]
pub enum CacheError {
    Recompute(StorageError),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::Recompute(err) => write!(f, "failed to recompute series: {}", err),
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::Recompute(err) => Some(err),
        }
    }
}

/// Serves the aggregated series, rebuilding it from the store at most once per TTL
pub struct AggregationCache {
    store: Arc<dyn SampleStore>,
    cache: TtlCache<AggregatedSeries>,
}

impl AggregationCache {
    pub fn new(store: Arc<dyn SampleStore>, ttl: Duration) -> Self {
        Self::with_clock(store, ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn SampleStore>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            cache: TtlCache::with_clock(ttl, clock),
        }
    }

    #[instrument(skip(self))]
    pub async fn get_series(&self) -> Result<AggregatedSeries, CacheError> {
        self.cache
            .get_or_recompute(|| async {
                let samples = self.store.query().await.map_err(CacheError::Recompute)?;
                let series = AggregatedSeries::from_samples(&samples);
                debug!(
                    samples = samples.len(),
                    devices = series.datasets.len(),
                    "series recomputed"
                );
                Ok::<_, CacheError>(series)
            })
            .await
    }
}
