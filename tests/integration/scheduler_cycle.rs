//! End-to-end behavior of monitoring cycles
//!
//! These tests verify that:
//! - Every cycle leaves exactly one sample per device
//! - Unreachable devices are stored as 0 and notified once per cycle
//! - Reachable devices are stored as 100 and never notified
//! - The scheduler actor runs cycles on its interval and on demand

use std::sync::Arc;
use std::time::Duration;

use pingwatch::{
    Reachability,
    prober::ProbeError,
    scheduler::{AlertOutcome, SchedulerHandle},
    storage::{SampleStore, memory::MemorySampleStore},
};
use pretty_assertions::assert_eq;

use crate::helpers::*;

#[tokio::test]
async fn test_n_cycles_store_n_samples_per_device() {
    let devices = vec![
        test_device("router", "10.0.0.1"),
        test_device("switch", "10.0.0.2"),
        test_device("nas", "10.0.0.3"),
    ];
    let prober = ScriptedProber::new().with(
        "10.0.0.2",
        Behavior::Fail(ProbeError::Execution("host unreachable".to_string())),
    );
    let store = Arc::new(MemorySampleStore::new());
    let monitor = monitor(
        registry(devices),
        Arc::new(prober),
        store.clone(),
        dispatcher(vec![]),
    );

    const CYCLES: usize = 5;
    for _ in 0..CYCLES {
        monitor.run_cycle().await;
    }

    let samples = store.query().await.unwrap();
    assert_eq!(samples.len(), 3 * CYCLES);
    for id in ["router", "switch", "nas"] {
        let count = samples.iter().filter(|s| s.device_id == id).count();
        assert_eq!(count, CYCLES, "device {id}");
    }

    // timestamps never go backwards
    assert!(samples.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_device_is_stored_and_notified_once() {
    let notifier = RecordingNotifier::new();
    let prober = ScriptedProber::new().with("192.168.1.50", Behavior::Hang);
    let store = Arc::new(MemorySampleStore::new());
    let monitor = monitor(
        registry(vec![test_device("printer", "192.168.1.50")]),
        Arc::new(prober),
        store.clone(),
        dispatcher(vec![notifier.clone()]),
    );

    let started = tokio::time::Instant::now();
    let report = monitor.run_cycle().await;

    assert!(started.elapsed() <= PROBE_TIMEOUT);
    assert_eq!(report.unreachable, 1);
    assert_eq!(report.alerts_sent, 1);

    let samples = store.query().await.unwrap();
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].status, Reachability::Unreachable);
    assert_eq!(samples[0].status.value(), 0);

    let events = notifier.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].device_id, "printer");
    assert_eq!(events[0].address, "192.168.1.50");
    assert!(events[0].body().contains("printer"));
    assert!(events[0].body().contains("192.168.1.50"));
}

#[tokio::test]
async fn test_reachable_device_is_stored_and_not_notified() {
    let notifier = RecordingNotifier::new();
    let prober = ScriptedProber::new().with("10.0.0.1", Behavior::Reply(Duration::from_millis(5)));
    let store = Arc::new(MemorySampleStore::new());
    let monitor = monitor(
        registry(vec![test_device("router", "10.0.0.1")]),
        Arc::new(prober),
        store.clone(),
        dispatcher(vec![notifier.clone()]),
    );

    let report = monitor.run_cycle().await;

    let outcome = report.outcome("router").unwrap();
    assert_eq!(outcome.status, Reachability::Reachable);
    assert_eq!(outcome.alert, AlertOutcome::NotNeeded);
    assert_eq!(outcome.latency, Some(Duration::from_millis(5)));

    let samples = store.query().await.unwrap();
    assert_eq!(samples[0].status.value(), 100);
    assert!(notifier.events().is_empty());
}

#[tokio::test]
async fn test_every_failed_cycle_notifies_again() {
    let notifier = RecordingNotifier::new();
    let prober = ScriptedProber::new().with(
        "10.0.0.9",
        Behavior::Fail(ProbeError::Timeout(PROBE_TIMEOUT)),
    );
    let monitor = monitor(
        registry(vec![test_device("camera", "10.0.0.9")]),
        Arc::new(prober),
        Arc::new(MemorySampleStore::new()),
        dispatcher(vec![notifier.clone()]),
    );

    for _ in 0..3 {
        monitor.run_cycle().await;
    }

    assert_eq!(notifier.events().len(), 3);
    assert_eq!(monitor.consecutive_failures("camera"), 3);
}

#[tokio::test(start_paused = true)]
async fn test_scheduler_sleeps_interval_between_cycles() {
    let prober = Arc::new(ScriptedProber::new());
    let store = Arc::new(MemorySampleStore::new());
    let monitor = monitor(
        registry(vec![test_device("router", "10.0.0.1")]),
        prober.clone(),
        store.clone(),
        dispatcher(vec![]),
    );

    let handle = SchedulerHandle::spawn(monitor.clone(), Duration::from_secs(60));

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(monitor.cycles(), 1);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(monitor.cycles(), 2);

    handle.shutdown().await.unwrap();
    assert_eq!(store.count().await.unwrap(), 2);
    assert_eq!(prober.checks(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_run_now_does_not_wait_for_interval() {
    let store = Arc::new(MemorySampleStore::new());
    let monitor = monitor(
        registry(vec![test_device("router", "10.0.0.1")]),
        Arc::new(ScriptedProber::new()),
        store.clone(),
        dispatcher(vec![]),
    );

    let handle = SchedulerHandle::spawn(monitor, Duration::from_secs(3600));
    let started = tokio::time::Instant::now();

    let report = handle.run_now().await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(report.reachable, 1);
    assert_eq!(store.count().await.unwrap(), 2);

    handle.shutdown().await.unwrap();
}
