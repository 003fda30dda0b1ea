use std::collections::HashMap;
use std::sync::Mutex;

/// Where a device stands relative to its failure threshold after one sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdEvaluation {
    /// Reachable, no streak in progress
    Ok,

    /// Unreachable, but the streak is still below the threshold
    Failing { consecutive: u32 },

    /// This sample brought the streak up to the threshold
    StartsToExceed { consecutive: u32 },

    /// Still unreachable past the threshold
    Exceeding { consecutive: u32 },

    /// Reachable again after a streak that had reached the threshold
    BackToOk { after: u32 },
}

impl ThresholdEvaluation {
    /// Whether the streak is at or above the threshold
    pub fn is_exceeded(&self) -> bool {
        matches!(
            self,
            ThresholdEvaluation::StartsToExceed { .. } | ThresholdEvaluation::Exceeding { .. }
        )
    }

    /// Length of the failure streak after this sample
    pub fn consecutive_failures(&self) -> u32 {
        match *self {
            ThresholdEvaluation::Ok | ThresholdEvaluation::BackToOk { .. } => 0,
            ThresholdEvaluation::Failing { consecutive }
            | ThresholdEvaluation::StartsToExceed { consecutive }
            | ThresholdEvaluation::Exceeding { consecutive } => consecutive,
        }
    }
}

/// Classify a sample given the failure streak that preceded it
///
/// A threshold of 0 never exceeds.
pub fn evaluate(reachable: bool, threshold: u8, previous_failures: u32) -> ThresholdEvaluation {
    let threshold = u32::from(threshold);

    if reachable {
        return if threshold > 0 && previous_failures >= threshold {
            ThresholdEvaluation::BackToOk {
                after: previous_failures,
            }
        } else {
            ThresholdEvaluation::Ok
        };
    }

    let consecutive = previous_failures.saturating_add(1);
    if threshold == 0 || consecutive < threshold {
        ThresholdEvaluation::Failing { consecutive }
    } else if consecutive == threshold {
        ThresholdEvaluation::StartsToExceed { consecutive }
    } else {
        ThresholdEvaluation::Exceeding { consecutive }
    }
}

/// Consecutive unreachable samples per device
#[derive(Debug, Default)]
pub struct FailureStreaks {
    streaks: Mutex<HashMap<String, u32>>,
}

impl FailureStreaks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one sample into the device's streak and classify it
    pub fn record(&self, device_id: &str, reachable: bool, threshold: u8) -> ThresholdEvaluation {
        let mut streaks = self.streaks.lock().unwrap_or_else(|e| e.into_inner());
        let previous = streaks.get(device_id).copied().unwrap_or_default();
        let evaluation = evaluate(reachable, threshold, previous);

        match evaluation.consecutive_failures() {
            0 => {
                streaks.remove(device_id);
            }
            n => {
                streaks.insert(device_id.to_string(), n);
            }
        }

        evaluation
    }

    pub fn current(&self, device_id: &str) -> u32 {
        self.streaks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(device_id)
            .copied()
            .unwrap_or_default()
    }
}
