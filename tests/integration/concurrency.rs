//! Concurrency tests
//!
//! These tests verify that:
//! - Devices are probed concurrently within a cycle
//! - The rate limiter throttles repeated probes of one device
//! - Concurrent appends never lose samples
//! - Concurrent series reads share one recomputation

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use pingwatch::{
    Reachability, StatusSample,
    cache::AggregationCache,
    rate_limit::RateLimiter,
    registry::Device,
    scheduler::Monitor,
    storage::{HealthStatus, SampleStore, StorageResult, memory::MemorySampleStore},
};
use tokio::task::JoinSet;

use crate::helpers::*;

#[tokio::test(start_paused = true)]
async fn test_devices_are_probed_concurrently() {
    let mut prober = ScriptedProber::new();
    let mut devices = Vec::new();
    for i in 0..20 {
        let address = format!("10.0.1.{i}");
        prober = prober.with(&address, Behavior::Reply(Duration::from_secs(2)));
        devices.push(Device::new(format!("device-{i}"), address, 3));
    }
    let store = Arc::new(MemorySampleStore::new());
    let monitor = monitor(registry(devices), Arc::new(prober), store.clone(), dispatcher(vec![]));

    let started = tokio::time::Instant::now();
    let report = monitor.run_cycle().await;

    // sequential probing would take 40s
    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(report.reachable, 20);
    assert_eq!(store.count().await.unwrap(), 20);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_delays_next_probe_of_same_device() {
    let prober = Arc::new(ScriptedProber::new());
    let monitor = Arc::new(
        Monitor::new(
            registry(vec![test_device("router", "10.0.0.1")]),
            prober.clone(),
            Arc::new(MemorySampleStore::new()),
            dispatcher(vec![]),
        )
        .with_rate_limiter(Arc::new(RateLimiter::new(1, Duration::from_secs(60)))),
    );

    let started = tokio::time::Instant::now();
    monitor.run_cycle().await;
    assert!(started.elapsed() < Duration::from_secs(1));

    monitor.run_cycle().await;
    assert!(started.elapsed() >= Duration::from_secs(60));
    assert_eq!(prober.checks(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_is_per_device() {
    let monitor = Arc::new(
        Monitor::new(
            registry(vec![
                test_device("router", "10.0.0.1"),
                test_device("switch", "10.0.0.2"),
                test_device("nas", "10.0.0.3"),
            ]),
            Arc::new(ScriptedProber::new()),
            Arc::new(MemorySampleStore::new()),
            dispatcher(vec![]),
        )
        .with_rate_limiter(Arc::new(RateLimiter::new(1, Duration::from_secs(60)))),
    );

    let started = tokio::time::Instant::now();
    let report = monitor.run_cycle().await;

    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(report.reachable, 3);
}

#[tokio::test]
async fn test_concurrent_appends_are_all_kept() {
    let store = Arc::new(MemorySampleStore::new());
    let mut tasks = JoinSet::new();

    for i in 0..50 {
        let store = store.clone();
        tasks.spawn(async move {
            let sample = StatusSample::new(
                format!("device-{}", i % 5),
                format!("10.0.0.{}", i % 5),
                Utc::now(),
                Reachability::Reachable,
            );
            store.append(&sample).await
        });
    }

    while let Some(result) = tasks.join_next().await {
        result.unwrap().unwrap();
    }
    assert_eq!(store.count().await.unwrap(), 50);
}

/// Store that counts how often the full history is read
struct CountingStore {
    inner: MemorySampleStore,
    queries: AtomicUsize,
}

#[async_trait]
impl SampleStore for CountingStore {
    async fn append(&self, sample: &StatusSample) -> StorageResult<()> {
        self.inner.append(sample).await
    }

    async fn query(&self) -> StorageResult<Vec<StatusSample>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.inner.query().await
    }

    async fn count(&self) -> StorageResult<usize> {
        self.inner.count().await
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        self.inner.health_check().await
    }

    async fn close(&self) -> StorageResult<()> {
        self.inner.close().await
    }
}

#[tokio::test]
async fn test_concurrent_series_reads_query_store_once() {
    let store = Arc::new(CountingStore {
        inner: MemorySampleStore::new(),
        queries: AtomicUsize::new(0),
    });
    store
        .append(&StatusSample::new(
            "router",
            "10.0.0.1",
            Utc::now(),
            Reachability::Reachable,
        ))
        .await
        .unwrap();

    let cache = Arc::new(AggregationCache::new(store.clone(), Duration::from_secs(60)));
    let mut readers = JoinSet::new();
    for _ in 0..16 {
        let cache = cache.clone();
        readers.spawn(async move { cache.get_series().await.map(|s| s.labels.len()) });
    }

    while let Some(result) = readers.join_next().await {
        assert_eq!(result.unwrap().unwrap(), 1);
    }
    assert_eq!(store.queries.load(Ordering::SeqCst), 1);
}
