//! Device listing endpoint

use axum::{Json, extract::State};

use crate::api::state::ApiState;
use crate::api::types::{DeviceInfo, DevicesResponse};

/// GET /api/v1/devices
pub async fn list_devices(State(state): State<ApiState>) -> Json<DevicesResponse> {
    let devices: Vec<DeviceInfo> = state
        .registry
        .iter()
        .map(|device| DeviceInfo {
            id: device.id.clone(),
            address: device.address.clone(),
            threshold: device.threshold,
        })
        .collect();

    Json(DevicesResponse {
        count: devices.len(),
        devices,
    })
}
