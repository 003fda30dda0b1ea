//! Sample store trait definition

use std::collections::HashMap;

use async_trait::async_trait;

use super::error::StorageResult;
use crate::StatusSample;

/// Health status of the storage backend
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Is the backend operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,

    /// Additional backend-specific metadata
    pub metadata: HashMap<String, String>,
}

/// Durable append-only log of status samples
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync`: one store is shared by every
/// concurrent per-device check and by the read API. Concurrent appends must
/// never interleave partial records.
///
/// ## Error Handling
///
/// Methods return `StorageResult<T>`. Failures are always reported to the
/// caller, never swallowed.
#[async_trait]
pub trait SampleStore: Send + Sync {
    /// Append one sample
    ///
    /// Returning `Ok` is a commit guarantee: the sample is durable and will be
    /// part of every later `query`.
    async fn append(&self, sample: &StatusSample) -> StorageResult<()>;

    /// Read back all samples across all devices
    ///
    /// Results are ordered by timestamp (oldest first); samples with equal
    /// timestamps keep their append order.
    async fn query(&self) -> StorageResult<Vec<StatusSample>>;

    /// Number of stored samples
    async fn count(&self) -> StorageResult<usize>;

    /// Check backend health
    ///
    /// Performs a lightweight operation to verify the backend is operational.
    async fn health_check(&self) -> StorageResult<HealthStatus>;

    /// Close the backend and release resources
    async fn close(&self) -> StorageResult<()>;
}
