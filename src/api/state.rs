//! Shared state handed to every API handler

use std::sync::Arc;

use crate::cache::AggregationCache;
use crate::registry::DeviceRegistry;
use crate::storage::SampleStore;

#[derive(Clone)]
pub struct ApiState {
    /// Cached series served by `/series`
    pub cache: Arc<AggregationCache>,

    pub registry: Arc<DeviceRegistry>,

    /// Used for health checks only; series reads go through the cache
    pub store: Arc<dyn SampleStore>,
}

impl ApiState {
    pub fn new(
        cache: Arc<AggregationCache>,
        registry: Arc<DeviceRegistry>,
        store: Arc<dyn SampleStore>,
    ) -> Self {
        Self {
            cache,
            registry,
            store,
        }
    }
}
