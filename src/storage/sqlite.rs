//! SQLite sample store
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Readers (the dashboard cache) don't block the appending scheduler
//! - **Connection pooling**: Efficient resource usage
//! - **Migrations**: Automatic schema versioning with sqlx
//!
//! Each `append` is a single autocommit `INSERT`; SQLite serializes writers, so
//! concurrent appends from the per-device tasks never interleave.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument, warn};

use super::backend::{HealthStatus, SampleStore};
use super::error::{StorageError, StorageResult};
use super::schema::SampleRow;
use crate::StatusSample;

/// SQLite-backed sample store
pub struct SqliteSampleStore {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteSampleStore {
    /// Open (or create) the database and run migrations
    ///
    /// ```no_run
    /// # use pingwatch::storage::sqlite::SqliteSampleStore;
    /// # async fn example() -> anyhow::Result<()> {
    /// let store = SqliteSampleStore::new("./samples.db").await?;
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite sample store at: {}", db_path_str);

        // FULL sync: a successful append must survive a crash
        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;

        info!("database migrations complete");

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }
}

#[async_trait]
impl SampleStore for SqliteSampleStore {
    #[instrument(skip(self, sample), fields(device = %sample.device_id))]
    async fn append(&self, sample: &StatusSample) -> StorageResult<()> {
        let row = SampleRow::from_sample(sample);

        sqlx::query(
            r#"
            INSERT INTO samples (device_name, device_ip, timestamp, status)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&row.device_name)
        .bind(&row.device_ip)
        .bind(row.timestamp)
        .bind(row.status)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::WriteFailed(e.to_string()))?;

        debug!("sample appended");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn query(&self) -> StorageResult<Vec<StatusSample>> {
        let rows = sqlx::query(
            r#"
            SELECT id, device_name, device_ip, timestamp, status
            FROM samples
            ORDER BY timestamp ASC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::ReadFailed(e.to_string()))?;

        let samples = rows
            .into_iter()
            .map(|row| {
                SampleRow {
                    id: row.get("id"),
                    device_name: row.get("device_name"),
                    device_ip: row.get("device_ip"),
                    timestamp: row.get("timestamp"),
                    status: row.get("status"),
                }
                .into_sample()
            })
            .collect::<StorageResult<Vec<_>>>()?;

        debug!("query returned {} samples", samples.len());
        Ok(samples)
    }

    async fn count(&self) -> StorageResult<usize> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM samples")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::ReadFailed(e.to_string()))?;

        Ok(row.0 as usize)
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<HealthStatus> {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => Ok(HealthStatus {
                healthy: true,
                message: "SQLite sample store operational".to_string(),
                metadata: HashMap::from([
                    ("backend".to_string(), "sqlite".to_string()),
                    ("db_path".to_string(), self.db_path.clone()),
                ]),
            }),
            Err(e) => {
                warn!("health check failed: {}", e);
                Ok(HealthStatus {
                    healthy: false,
                    message: format!("health check failed: {}", e),
                    metadata: HashMap::new(),
                })
            }
        }
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing SQLite sample store");
        self.pool.close().await;
        Ok(())
    }
}
