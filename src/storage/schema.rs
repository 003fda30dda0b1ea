//! Persisted sample layout
//!
//! Samples live in a single append-only `samples` table keyed by an
//! auto-incrementing id:
//!
//! | column        | type    | notes                          |
//! |---------------|---------|--------------------------------|
//! | `id`          | INTEGER | primary key, autoincrement     |
//! | `device_name` | TEXT    | device id                      |
//! | `device_ip`   | TEXT    | address that was probed        |
//! | `timestamp`   | INTEGER | Unix milliseconds (UTC)        |
//! | `status`      | INTEGER | 0 (unreachable) or 100         |

use chrono::{DateTime, Utc};

use super::error::{StorageError, StorageResult};
use crate::{Reachability, StatusSample};

/// A single row of the `samples` table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleRow {
    pub id: Option<i64>,
    pub device_name: String,
    pub device_ip: String,
    pub timestamp: i64,
    pub status: i64,
}

impl SampleRow {
    pub fn from_sample(sample: &StatusSample) -> Self {
        Self {
            id: None,
            device_name: sample.device_id.clone(),
            device_ip: sample.address.clone(),
            timestamp: sample.timestamp.timestamp_millis(),
            status: i64::from(sample.status.value()),
        }
    }

    /// Decode the row back into a sample, rejecting corrupt values
    pub fn into_sample(self) -> StorageResult<StatusSample> {
        let timestamp = DateTime::<Utc>::from_timestamp_millis(self.timestamp).ok_or_else(|| {
            StorageError::InvalidData(format!("timestamp {} out of range", self.timestamp))
        })?;

        let status = u8::try_from(self.status)
            .map_err(|_| StorageError::InvalidData(format!("status {} out of range", self.status)))
            .and_then(|value| Reachability::try_from(value).map_err(StorageError::InvalidData))?;

        Ok(StatusSample {
            device_id: self.device_name,
            address: self.device_ip,
            timestamp,
            status,
        })
    }
}
