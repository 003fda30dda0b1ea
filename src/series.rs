//! Chart-ready time series built from the sample history

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::StatusSample;

/// Status values of one device, in the order they were sampled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    pub device_id: String,
    pub data: Vec<u8>,
}

/// Full sample history shaped for charting
///
/// `labels` holds the timestamp of every sample across all devices, while
/// each dataset only holds the values of its own device. The two are not
/// required to have the same length.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedSeries {
    pub labels: Vec<DateTime<Utc>>,

    /// One dataset per device, in first-seen order
    pub datasets: Vec<Dataset>,
}

impl AggregatedSeries {
    /// Build the series from samples already ordered by timestamp
    pub fn from_samples(samples: &[StatusSample]) -> Self {
        let mut series = AggregatedSeries {
            labels: Vec::with_capacity(samples.len()),
            datasets: Vec::new(),
        };

        for sample in samples {
            series.labels.push(sample.timestamp);

            let value = sample.status.value();
            match series
                .datasets
                .iter_mut()
                .find(|dataset| dataset.device_id == sample.device_id)
            {
                Some(dataset) => dataset.data.push(value),
                None => series.datasets.push(Dataset {
                    device_id: sample.device_id.clone(),
                    data: vec![value],
                }),
            }
        }

        series
    }

    pub fn dataset(&self, device_id: &str) -> Option<&[u8]> {
        self.datasets
            .iter()
            .find(|dataset| dataset.device_id == device_id)
            .map(|dataset| dataset.data.as_slice())
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
