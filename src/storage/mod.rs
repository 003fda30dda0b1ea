//! Sample store backends
//!
//! This module provides a trait-based abstraction for the append-only log of
//! status samples that feeds the dashboard series.
//!
//! ## Design
//!
//! - **Trait-based**: `SampleStore` allows swapping implementations
//! - **Async**: All operations are async for compatibility with the scheduler tasks
//! - **Injected**: Components receive an `Arc<dyn SampleStore>`, there is no global handle
//!
//! ## Backends
//!
//! - **SQLite** (default): Embedded database, durable across restarts
//! - **In-Memory** (fallback): No persistence, for testing or ephemeral runs
//!
//! ## Usage
//!
//! ```no_run
//! use pingwatch::storage::{SampleStore, sqlite::SqliteSampleStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = SqliteSampleStore::new("./samples.db").await?;
//!     let samples = store.query().await?;
//!     println!("{} samples stored", samples.len());
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod error;
pub mod memory;
pub mod schema;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

use std::sync::Arc;

use tracing::info;

use crate::config::StorageConfig;

pub use backend::{HealthStatus, SampleStore};
pub use error::{StorageError, StorageResult};
pub use schema::SampleRow;

/// Open the configured sample store
pub async fn open(config: &StorageConfig) -> StorageResult<Arc<dyn SampleStore>> {
    match config {
        StorageConfig::None => {
            info!("using in-memory sample store (no persistence)");
            Ok(Arc::new(memory::MemorySampleStore::new()))
        }
        #[cfg(feature = "storage-sqlite")]
        StorageConfig::Sqlite { path } => {
            let store = sqlite::SqliteSampleStore::new(path).await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "storage-sqlite"))]
        StorageConfig::Sqlite { .. } => Err(StorageError::InvalidConfig(
            "SQLite storage requested but the storage-sqlite feature is disabled".to_string(),
        )),
    }
}
