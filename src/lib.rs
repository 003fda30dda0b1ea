pub mod alerts;
pub mod api;
pub mod cache;
pub mod config;
pub mod discord;
pub mod prober;
pub mod rate_limit;
pub mod registry;
pub mod scheduler;
pub mod series;
pub mod storage;
pub mod util;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reachability of a device as observed by a single probe.
///
/// Serialized as the integer status the dashboard charts: `100` for
/// reachable and `0` for unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Reachability {
    Unreachable,
    Reachable,
}

impl Reachability {
    pub const REACHABLE_VALUE: u8 = 100;
    pub const UNREACHABLE_VALUE: u8 = 0;

    pub fn value(self) -> u8 {
        match self {
            Reachability::Reachable => Self::REACHABLE_VALUE,
            Reachability::Unreachable => Self::UNREACHABLE_VALUE,
        }
    }

    pub fn is_reachable(self) -> bool {
        self == Reachability::Reachable
    }
}

impl From<Reachability> for u8 {
    fn from(status: Reachability) -> Self {
        status.value()
    }
}

impl TryFrom<u8> for Reachability {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            Reachability::REACHABLE_VALUE => Ok(Reachability::Reachable),
            Reachability::UNREACHABLE_VALUE => Ok(Reachability::Unreachable),
            other => Err(format!("invalid status value {other}, expected 0 or 100")),
        }
    }
}

impl std::fmt::Display for Reachability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reachability::Reachable => write!(f, "reachable"),
            Reachability::Unreachable => write!(f, "unreachable"),
        }
    }
}

/// One reachability observation for one device at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSample {
    pub device_id: String,
    pub address: String,
    pub timestamp: DateTime<Utc>,
    pub status: Reachability,
}

impl StatusSample {
    pub fn new(
        device_id: impl Into<String>,
        address: impl Into<String>,
        timestamp: DateTime<Utc>,
        status: Reachability,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            address: address.into(),
            timestamp,
            status,
        }
    }
}
