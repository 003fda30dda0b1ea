//! Integration tests for API endpoints
//!
//! These tests verify that:
//! - The series endpoint serves the aggregated history from the cache
//! - Cached reads stay stable within the TTL
//! - Store failures surface as HTTP 500 with an error body
//! - Health and device listings reflect the running configuration

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use chrono::DateTime;
use pingwatch::{
    Reachability, StatusSample,
    api::{ApiConfig, ApiState, spawn_api_server},
    cache::AggregationCache,
    registry::DeviceRegistry,
    storage::{SampleStore, memory::MemorySampleStore},
};
use serde_json::Value;

use crate::helpers::*;

async fn spawn_test_api(store: Arc<dyn SampleStore>, ttl: Duration) -> SocketAddr {
    let registry = registry(vec![
        test_device("router", "10.0.0.1"),
        test_device("switch", "10.0.0.2"),
    ]);
    spawn_with_registry(store, registry, ttl).await
}

async fn spawn_with_registry(
    store: Arc<dyn SampleStore>,
    registry: Arc<DeviceRegistry>,
    ttl: Duration,
) -> SocketAddr {
    let cache = Arc::new(AggregationCache::new(store.clone(), ttl));
    let state = ApiState::new(cache, registry, store);

    let config = ApiConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(), // Random port
        enable_cors: true,
    };

    spawn_api_server(config, state).await.unwrap()
}

async fn get_json(addr: SocketAddr, path: &str) -> (StatusCode, Value) {
    let response = reqwest::get(format!("http://{addr}{path}")).await.unwrap();
    let status = StatusCode::from_u16(response.status().as_u16()).unwrap();
    (status, response.json().await.unwrap())
}

fn sample(device: &str, address: &str, millis: i64, status: Reachability) -> StatusSample {
    StatusSample::new(
        device,
        address,
        DateTime::from_timestamp_millis(millis).unwrap(),
        status,
    )
}

#[tokio::test]
async fn test_series_endpoint_returns_labels_and_datasets() {
    let store = Arc::new(MemorySampleStore::new());
    store
        .append(&sample("router", "10.0.0.1", 1_700_000_000_000, Reachability::Reachable))
        .await
        .unwrap();
    store
        .append(&sample("switch", "10.0.0.2", 1_700_000_000_001, Reachability::Unreachable))
        .await
        .unwrap();
    store
        .append(&sample("router", "10.0.0.1", 1_700_000_060_000, Reachability::Unreachable))
        .await
        .unwrap();

    let addr = spawn_test_api(store, Duration::from_secs(60)).await;
    let (status, body) = get_json(addr, "/api/v1/series").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["labels"].as_array().unwrap().len(), 3);
    assert_eq!(body["datasets"][0]["device_id"], "router");
    assert_eq!(body["datasets"][0]["data"], serde_json::json!([100, 0]));
    assert_eq!(body["datasets"][1]["device_id"], "switch");
    assert_eq!(body["datasets"][1]["data"], serde_json::json!([0]));
}

#[tokio::test]
async fn test_series_is_cached_within_ttl() {
    let store = Arc::new(MemorySampleStore::new());
    store
        .append(&sample("router", "10.0.0.1", 1_700_000_000_000, Reachability::Reachable))
        .await
        .unwrap();

    let addr = spawn_test_api(store.clone(), Duration::from_secs(3600)).await;

    let (_, first) = get_json(addr, "/api/v1/series").await;
    store
        .append(&sample("router", "10.0.0.1", 1_700_000_060_000, Reachability::Unreachable))
        .await
        .unwrap();
    let (_, second) = get_json(addr, "/api/v1/series").await;

    assert_eq!(first, second);
    assert_eq!(second["labels"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_series_recomputes_after_ttl() {
    let store = Arc::new(MemorySampleStore::new());
    let addr = spawn_test_api(store.clone(), Duration::from_millis(100)).await;

    let (_, empty) = get_json(addr, "/api/v1/series").await;
    assert!(empty["labels"].as_array().unwrap().is_empty());

    store
        .append(&sample("router", "10.0.0.1", 1_700_000_000_000, Reachability::Reachable))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    let (_, fresh) = get_json(addr, "/api/v1/series").await;
    assert_eq!(fresh["labels"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_store_failure_is_server_error() {
    let addr = spawn_test_api(Arc::new(FailingStore), Duration::from_secs(60)).await;

    let (status, body) = get_json(addr, "/api/v1/series").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(
        body["error"]
            .as_str()
            .unwrap()
            .contains("database is locked")
    );
}

#[tokio::test]
async fn test_health_endpoint() {
    let addr = spawn_test_api(Arc::new(MemorySampleStore::new()), Duration::from_secs(60)).await;

    let (status, body) = get_json(addr, "/api/v1/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["storage"]["healthy"], true);
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_health_reports_degraded_store() {
    let addr = spawn_test_api(Arc::new(FailingStore), Duration::from_secs(60)).await;

    let (status, body) = get_json(addr, "/api/v1/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["storage"]["healthy"], false);
}

#[tokio::test]
async fn test_devices_endpoint_lists_registry() {
    let addr = spawn_test_api(Arc::new(MemorySampleStore::new()), Duration::from_secs(60)).await;

    let (status, body) = get_json(addr, "/api/v1/devices").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);
    assert_eq!(body["devices"][0]["id"], "router");
    assert_eq!(body["devices"][0]["address"], "10.0.0.1");
    assert_eq!(body["devices"][1]["threshold"], 3);
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let addr = spawn_with_registry(
        Arc::new(MemorySampleStore::new()),
        registry(vec![]),
        Duration::from_secs(60),
    )
    .await;

    let response = reqwest::get(format!("http://{addr}/api/v1/servers"))
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
}
