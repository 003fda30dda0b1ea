//! In-memory sample store (no persistence)
//!
//! Useful for:
//! - Testing without database dependencies
//! - Ephemeral deployments where history may be lost on restart
//!
//! "Durable" here means visible to every later `query` of this process.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::backend::{HealthStatus, SampleStore};
use super::error::StorageResult;
use crate::StatusSample;

/// In-memory sample store
///
/// Samples are kept in append order; `query` performs a stable sort by
/// timestamp so ties keep insertion order, matching the SQLite backend.
#[derive(Debug, Default)]
pub struct MemorySampleStore {
    samples: RwLock<Vec<StatusSample>>,
}

impl MemorySampleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SampleStore for MemorySampleStore {
    async fn append(&self, sample: &StatusSample) -> StorageResult<()> {
        self.samples.write().await.push(sample.clone());
        Ok(())
    }

    async fn query(&self) -> StorageResult<Vec<StatusSample>> {
        let mut samples = self.samples.read().await.clone();
        samples.sort_by_key(|sample| sample.timestamp);
        debug!("in-memory query returned {} samples", samples.len());
        Ok(samples)
    }

    async fn count(&self) -> StorageResult<usize> {
        Ok(self.samples.read().await.len())
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let total = self.samples.read().await.len();
        Ok(HealthStatus {
            healthy: true,
            message: "In-memory sample store operational".to_string(),
            metadata: HashMap::from([
                ("backend".to_string(), "memory".to_string()),
                ("total_samples".to_string(), total.to_string()),
            ]),
        })
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("closing in-memory sample store (no-op)");
        Ok(())
    }
}
