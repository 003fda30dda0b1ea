//! The monitoring loop
//!
//! A [`Monitor`] owns everything a cycle needs: the device registry, the
//! prober, the rate limiter, the sample store and the alert dispatcher. One
//! cycle fans out one unit per device on a [`JoinSet`] and joins all of them
//! before returning, so a failing device never cancels its siblings.
//!
//! The [`Scheduler`] actor drives cycles at a fixed interval and can be
//! controlled through a [`SchedulerHandle`]:
//!
//! ```text
//! spawn → cycle → sleep(interval) → cycle → …
//!                   ↑
//!                   └─── Commands (RunNow, Shutdown)
//! ```

mod messages;
mod threshold;

pub use messages::{AlertOutcome, CycleReport, DeviceOutcome, SchedulerCommand};
pub use threshold::{FailureStreaks, ThresholdEvaluation, evaluate};

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::alerts::{AlertDispatcher, AlertEvent};
use crate::prober::{ProbeError, ProbeReport, Prober, SampleClock, probe};
use crate::rate_limit::RateLimiter;
use crate::registry::{Device, DeviceRegistry};
use crate::storage::SampleStore;
use crate::{Reachability, StatusSample};

const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs monitoring cycles over a fixed set of devices
pub struct Monitor {
    registry: Arc<DeviceRegistry>,
    prober: Arc<dyn Prober>,
    limiter: Arc<RateLimiter>,
    store: Arc<dyn SampleStore>,
    dispatcher: Arc<AlertDispatcher>,
    probe_timeout: Duration,
    clock: SampleClock,
    streaks: FailureStreaks,
    cycles: AtomicU64,
}

impl Monitor {
    /// Create a monitor with one probe per device and minute, and a 10s probe timeout
    pub fn new(
        registry: Arc<DeviceRegistry>,
        prober: Arc<dyn Prober>,
        store: Arc<dyn SampleStore>,
        dispatcher: Arc<AlertDispatcher>,
    ) -> Self {
        Self {
            registry,
            prober,
            limiter: Arc::new(RateLimiter::new(1, Duration::from_secs(60))),
            store,
            dispatcher,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            clock: SampleClock::new(),
            streaks: FailureStreaks::new(),
            cycles: AtomicU64::new(0),
        }
    }

    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }

    /// Current failure streak of a device
    pub fn consecutive_failures(&self, device_id: &str) -> u32 {
        self.streaks.current(device_id)
    }

    /// Probe every device once and wait for all of them
    #[instrument(skip(self))]
    pub async fn run_cycle(self: &Arc<Self>) -> CycleReport {
        let cycle = self.cycles.fetch_add(1, Ordering::SeqCst) + 1;
        info!(cycle, devices = self.registry.len(), "starting monitoring cycle");

        let mut units = JoinSet::new();
        let mut progress: HashMap<&str, Progress> = HashMap::new();
        for device in self.registry.iter() {
            let slot = Progress::default();
            progress.insert(device.id.as_str(), Arc::clone(&slot));
            let monitor = Arc::clone(self);
            let device = Arc::clone(device);
            units.spawn(async move { monitor.check_device(&device, &slot).await });
        }

        let mut report = CycleReport::new(cycle);
        let mut pending: HashSet<&str> = progress.keys().copied().collect();
        join_units(&mut units, &mut pending, &mut report).await;

        // units that died before storing their sample get a synthesized one,
        // each in its own task so a second crash cannot take the cycle down
        let mut recovery = JoinSet::new();
        for device_id in pending.clone() {
            if let Some(outcome) = progress.get(device_id).and_then(take_progress) {
                warn!(device = device_id, "device unit failed after storing its sample");
                pending.remove(device_id);
                report.record(outcome);
                continue;
            }
            let Some(device) = self.registry.get(device_id) else {
                continue;
            };
            let monitor = Arc::clone(self);
            let device = Arc::clone(device);
            let slot = Arc::clone(&progress[device_id]);
            recovery.spawn(async move {
                let failure = ProbeError::Unexpected("device unit aborted".to_string());
                monitor.record_unexpected(&device, failure, &slot).await
            });
        }
        join_units(&mut recovery, &mut pending, &mut report).await;

        for device_id in pending {
            let outcome = match progress.get(device_id).and_then(take_progress) {
                Some(outcome) => outcome,
                None => {
                    error!(device = device_id, "no sample could be recorded for device");
                    DeviceOutcome {
                        device_id: device_id.to_string(),
                        status: Reachability::Unreachable,
                        latency: None,
                        store_failed: true,
                        alert: AlertOutcome::Failed,
                    }
                }
            };
            report.record(outcome);
        }

        info!(
            cycle,
            reachable = report.reachable,
            unreachable = report.unreachable,
            store_failures = report.store_failures,
            alerts_sent = report.alerts_sent,
            alerts_failed = report.alerts_failed,
            "monitoring cycle finished"
        );

        report
    }

    #[instrument(
        skip(self, device, progress),
        fields(device = %device.id, address = %device.address)
    )]
    async fn check_device(&self, device: &Device, progress: &Progress) -> DeviceOutcome {
        let permit = self.limiter.acquire(Some(&device.id)).await;
        trace!(waited_ms = permit.waited.as_millis() as u64, "permit acquired");

        let report = probe(self.prober.as_ref(), device, self.probe_timeout, &self.clock).await;
        log_probe_result(&report);

        self.finish(device, report, progress).await
    }

    async fn record_unexpected(
        &self,
        device: &Device,
        failure: ProbeError,
        progress: &Progress,
    ) -> DeviceOutcome {
        let report = ProbeReport {
            sample: StatusSample::new(
                device.id.clone(),
                device.address.clone(),
                self.clock.now(),
                Reachability::Unreachable,
            ),
            latency: None,
            failure: Some(failure),
        };
        log_probe_result(&report);

        self.finish(device, report, progress).await
    }

    async fn finish(
        &self,
        device: &Device,
        report: ProbeReport,
        progress: &Progress,
    ) -> DeviceOutcome {
        let store_failed = match self.store.append(&report.sample).await {
            Ok(()) => false,
            Err(e) => {
                error!(device = %device.id, "failed to store sample: {e}");
                true
            }
        };

        // the sample exists from here on, so a crash while alerting must not add another
        let mut outcome = DeviceOutcome {
            device_id: device.id.clone(),
            status: report.sample.status,
            latency: report.latency,
            store_failed,
            alert: AlertOutcome::Failed,
        };
        set_progress(progress, &outcome);
        self.check_threshold(device, report.sample.status);

        outcome.alert = self.dispatch(&report).await;
        outcome
    }

    async fn dispatch(&self, report: &ProbeReport) -> AlertOutcome {
        let Some(event) = AlertEvent::from_report(report) else {
            self.dispatcher.resolve(&report.sample.device_id);
            return AlertOutcome::NotNeeded;
        };

        match self.dispatcher.notify(&event).await {
            Ok(ack) if ack.suppressed => AlertOutcome::Suppressed,
            Ok(ack) if ack.delivered > 0 => AlertOutcome::Sent,
            Ok(_) => AlertOutcome::NoChannels,
            Err(e) => {
                error!(device = %event.device_id, "failed to dispatch alert: {e}");
                AlertOutcome::Failed
            }
        }
    }

    fn check_threshold(&self, device: &Device, status: Reachability) {
        let evaluation = self
            .streaks
            .record(&device.id, status.is_reachable(), device.threshold);

        match evaluation {
            ThresholdEvaluation::StartsToExceed { consecutive }
            | ThresholdEvaluation::Exceeding { consecutive } => warn!(
                device = %device.id,
                consecutive,
                threshold = device.threshold,
                "device unreachable for {consecutive} consecutive checks"
            ),
            ThresholdEvaluation::BackToOk { after } => info!(
                device = %device.id,
                "device reachable again after {after} failed checks"
            ),
            ThresholdEvaluation::Failing { consecutive } => {
                debug!(device = %device.id, consecutive, "device unreachable")
            }
            ThresholdEvaluation::Ok => {}
        }
    }
}

fn log_probe_result(report: &ProbeReport) {
    match (&report.failure, report.latency) {
        (Some(ProbeError::Timeout(after)), _) => warn!("probe timed out after {after:?}"),
        (Some(ProbeError::Execution(msg)), _) => warn!("probe execution failed: {msg}"),
        (Some(ProbeError::Unexpected(msg)), _) => error!("unexpected probe error: {msg}"),
        (None, Some(rtt)) => debug!(latency_ms = rtt.as_millis() as u64, "device reachable"),
        (None, None) => {}
    }
}

/// Outcome of a device unit, filled in once its sample was appended
type Progress = Arc<Mutex<Option<DeviceOutcome>>>;

fn set_progress(progress: &Progress, outcome: &DeviceOutcome) {
    *progress.lock().unwrap_or_else(|e| e.into_inner()) = Some(outcome.clone());
}

fn take_progress(progress: &Progress) -> Option<DeviceOutcome> {
    progress.lock().unwrap_or_else(|e| e.into_inner()).take()
}

/// Record every unit that returned and log the ones that did not
async fn join_units(
    units: &mut JoinSet<DeviceOutcome>,
    pending: &mut HashSet<&str>,
    report: &mut CycleReport,
) {
    while let Some(joined) = units.join_next().await {
        match joined {
            Ok(outcome) => {
                pending.remove(outcome.device_id.as_str());
                report.record(outcome);
            }
            Err(e) => error!("device unit failed: {e}"),
        }
    }
}

/// Actor that runs a cycle, sleeps `interval`, and repeats until shut down
pub struct Scheduler {
    monitor: Arc<Monitor>,
    interval: Duration,
    command_rx: mpsc::Receiver<SchedulerCommand>,
}

impl Scheduler {
    pub fn new(
        monitor: Arc<Monitor>,
        interval: Duration,
        command_rx: mpsc::Receiver<SchedulerCommand>,
    ) -> Self {
        Self {
            monitor,
            interval,
            command_rx,
        }
    }

    /// Run the actor's main loop
    ///
    /// Runs until a Shutdown command is received or the command channel is closed.
    #[instrument(skip(self), fields(interval = ?self.interval))]
    pub async fn run(mut self) {
        debug!("starting scheduler");

        'cycles: loop {
            self.monitor.run_cycle().await;

            let sleep = tokio::time::sleep(self.interval);
            tokio::pin!(sleep);

            loop {
                tokio::select! {
                    _ = &mut sleep => break,

                    cmd = self.command_rx.recv() => match cmd {
                        Some(SchedulerCommand::RunNow { respond_to }) => {
                            debug!("received RunNow command");
                            let report = self.monitor.run_cycle().await;
                            let _ = respond_to.send(report);
                        }

                        Some(SchedulerCommand::Shutdown { respond_to }) => {
                            debug!("received shutdown command");
                            let _ = respond_to.send(());
                            break 'cycles;
                        }

                        None => {
                            warn!("command channel closed, shutting down");
                            break 'cycles;
                        }
                    }
                }
            }
        }

        info!(cycles = self.monitor.cycles(), "scheduler stopped");
    }
}

/// Handle for controlling a [`Scheduler`]
#[derive(Clone)]
pub struct SchedulerHandle {
    sender: mpsc::Sender<SchedulerCommand>,
}

impl SchedulerHandle {
    /// Spawn the scheduler; its first cycle starts right away
    pub fn spawn(monitor: Arc<Monitor>, interval: Duration) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);

        let scheduler = Scheduler::new(monitor, interval, cmd_rx);
        tokio::spawn(scheduler.run());

        Self { sender: cmd_tx }
    }

    /// Run a cycle immediately, once the current one (if any) finished
    pub async fn run_now(&self) -> Result<CycleReport> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SchedulerCommand::RunNow { respond_to: tx })
            .await
            .context("failed to send RunNow command")?;

        rx.await.context("failed to receive cycle report")
    }

    /// Stop the scheduler and wait until it is idle
    pub async fn shutdown(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SchedulerCommand::Shutdown { respond_to: tx })
            .await
            .context("failed to send Shutdown command")?;

        rx.await.context("scheduler stopped before acknowledging shutdown")
    }
}
