//! Commands and reports exchanged with the scheduler actor

use std::time::Duration;

use tokio::sync::oneshot;

use crate::Reachability;

/// Commands that can be sent to the scheduler
#[derive(Debug)]
pub enum SchedulerCommand {
    /// Run a cycle right away, outside the interval timer
    RunNow {
        respond_to: oneshot::Sender<CycleReport>,
    },

    /// Stop the loop; answered once no cycle is running anymore
    Shutdown { respond_to: oneshot::Sender<()> },
}

/// What happened to one device during a cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceOutcome {
    pub device_id: String,
    pub status: Reachability,
    pub latency: Option<Duration>,

    /// The sample could not be persisted
    pub store_failed: bool,

    pub alert: AlertOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlertOutcome {
    /// Device was reachable
    #[default]
    NotNeeded,

    /// At least one channel accepted the alert
    Sent,

    /// Unreachable, but no notification channel is configured
    NoChannels,

    /// Suppressed by the alert policy
    Suppressed,

    /// Every channel failed
    Failed,
}

/// Summary of one monitoring cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// 1-based cycle number
    pub cycle: u64,

    pub reachable: usize,
    pub unreachable: usize,
    pub store_failures: usize,
    pub alerts_sent: usize,
    pub alerts_failed: usize,
    pub alerts_suppressed: usize,

    /// Per-device outcomes, in completion order
    pub outcomes: Vec<DeviceOutcome>,
}

impl CycleReport {
    pub fn new(cycle: u64) -> Self {
        Self {
            cycle,
            ..Self::default()
        }
    }

    pub fn record(&mut self, outcome: DeviceOutcome) {
        match outcome.status {
            Reachability::Reachable => self.reachable += 1,
            Reachability::Unreachable => self.unreachable += 1,
        }
        if outcome.store_failed {
            self.store_failures += 1;
        }
        match outcome.alert {
            AlertOutcome::NotNeeded | AlertOutcome::NoChannels => {}
            AlertOutcome::Sent => self.alerts_sent += 1,
            AlertOutcome::Suppressed => self.alerts_suppressed += 1,
            AlertOutcome::Failed => self.alerts_failed += 1,
        }
        self.outcomes.push(outcome);
    }

    pub fn devices(&self) -> usize {
        self.outcomes.len()
    }

    pub fn outcome(&self, device_id: &str) -> Option<&DeviceOutcome> {
        self.outcomes.iter().find(|o| o.device_id == device_id)
    }
}
