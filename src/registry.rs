//! Static set of monitored devices
//!
//! The registry is built once at startup from the configuration and never
//! changes for the lifetime of the process.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A monitored network device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Unique identity of the device (also used as display name)
    pub id: String,

    /// Host name or IP address to probe
    pub address: String,

    /// Consecutive unreachable samples before a threshold warning is emitted
    /// (0 disables the warning, max 100)
    #[serde(default)]
    pub threshold: u8,
}

impl Device {
    pub fn new(id: impl Into<String>, address: impl Into<String>, threshold: u8) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            threshold,
        }
    }
}

/// Errors raised while building the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    DuplicateId(String),
    EmptyId,
    EmptyAddress(String),
    ThresholdOutOfRange { id: String, threshold: u8 },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::DuplicateId(id) => write!(f, "duplicate device id '{id}'"),
            RegistryError::EmptyId => write!(f, "device id must not be empty"),
            RegistryError::EmptyAddress(id) => write!(f, "device '{id}' has no address"),
            RegistryError::ThresholdOutOfRange { id, threshold } => write!(
                f,
                "device '{id}' has threshold {threshold}, expected a value between 0 and 100"
            ),
        }
    }
}

impl std::error::Error for RegistryError {}

/// Immutable mapping of device id to device
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    devices: Vec<Arc<Device>>,
}

impl DeviceRegistry {
    /// Validate and freeze the given device list. Configuration order is kept.
    pub fn new(devices: Vec<Device>) -> Result<Self, RegistryError> {
        let mut seen = HashSet::new();

        for device in &devices {
            if device.id.trim().is_empty() {
                return Err(RegistryError::EmptyId);
            }
            if device.address.trim().is_empty() {
                return Err(RegistryError::EmptyAddress(device.id.clone()));
            }
            if device.threshold > 100 {
                return Err(RegistryError::ThresholdOutOfRange {
                    id: device.id.clone(),
                    threshold: device.threshold,
                });
            }
            if !seen.insert(device.id.clone()) {
                return Err(RegistryError::DuplicateId(device.id.clone()));
            }
        }

        Ok(Self {
            devices: devices.into_iter().map(Arc::new).collect(),
        })
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Device>> {
        self.devices.iter().find(|device| device.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Device>> {
        self.devices.iter()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
