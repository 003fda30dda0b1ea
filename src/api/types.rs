//! API response types

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthResponse {
    /// "ok" or "degraded"
    pub status: String,
    pub timestamp: String,
    pub storage: StorageHealth,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageHealth {
    pub healthy: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceInfo {
    pub id: String,
    pub address: String,
    pub threshold: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DevicesResponse {
    pub devices: Vec<DeviceInfo>,
    pub count: usize,
}
