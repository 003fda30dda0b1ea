//! SQLite persistence tests
//!
//! These tests verify that samples written by monitoring cycles survive a
//! restart and come back in order with their device, address and status.

use std::sync::Arc;

use chrono::{DateTime, Duration};
use pingwatch::{
    Reachability, StatusSample,
    cache::AggregationCache,
    config::StorageConfig,
    prober::ProbeError,
    storage::{self, SampleStore, sqlite::SqliteSampleStore},
};
use pretty_assertions::assert_eq;
use tempfile::tempdir;

use crate::helpers::*;

#[tokio::test]
async fn test_cycle_samples_survive_restart() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("samples.db");

    {
        let store = Arc::new(SqliteSampleStore::new(&db_path).await.unwrap());
        let prober = ScriptedProber::new().with(
            "10.0.0.2",
            Behavior::Fail(ProbeError::Execution("host unreachable".to_string())),
        );
        let monitor = monitor(
            registry(vec![
                test_device("router", "10.0.0.1"),
                test_device("switch", "10.0.0.2"),
            ]),
            Arc::new(prober),
            store.clone(),
            dispatcher(vec![]),
        );

        for _ in 0..3 {
            monitor.run_cycle().await;
        }
        store.close().await.unwrap();
    }

    let store = SqliteSampleStore::new(&db_path).await.unwrap();
    let samples = store.query().await.unwrap();

    assert_eq!(samples.len(), 6);
    assert!(samples.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    for sample in &samples {
        match sample.device_id.as_str() {
            "router" => {
                assert_eq!(sample.address, "10.0.0.1");
                assert_eq!(sample.status, Reachability::Reachable);
            }
            "switch" => {
                assert_eq!(sample.address, "10.0.0.2");
                assert_eq!(sample.status, Reachability::Unreachable);
            }
            other => panic!("unexpected device {other}"),
        }
    }
}

#[tokio::test]
async fn test_append_then_query_is_identical() {
    let dir = tempdir().unwrap();
    let store = SqliteSampleStore::new(dir.path().join("samples.db"))
        .await
        .unwrap();
    let t0 = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();

    let written = vec![
        StatusSample::new("router", "10.0.0.1", t0, Reachability::Reachable),
        StatusSample::new(
            "switch",
            "10.0.0.2",
            t0 + Duration::milliseconds(1),
            Reachability::Unreachable,
        ),
        StatusSample::new(
            "router",
            "10.0.0.1",
            t0 + Duration::seconds(60),
            Reachability::Unreachable,
        ),
    ];
    for sample in &written {
        store.append(sample).await.unwrap();
    }

    assert_eq!(store.query().await.unwrap(), written);
}

#[tokio::test]
async fn test_series_is_built_from_persisted_samples() {
    let dir = tempdir().unwrap();
    let config = StorageConfig::Sqlite {
        path: dir.path().join("samples.db"),
    };
    let store = storage::open(&config).await.unwrap();
    let t0 = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();

    for (i, status) in [Reachability::Reachable, Reachability::Unreachable]
        .into_iter()
        .enumerate()
    {
        store
            .append(&StatusSample::new(
                "router",
                "10.0.0.1",
                t0 + Duration::seconds(60 * i as i64),
                status,
            ))
            .await
            .unwrap();
    }

    let cache = AggregationCache::new(store, std::time::Duration::from_secs(60));
    let series = cache.get_series().await.unwrap();

    assert_eq!(series.labels, vec![t0, t0 + Duration::seconds(60)]);
    assert_eq!(series.dataset("router"), Some(&[100u8, 0][..]));
}
