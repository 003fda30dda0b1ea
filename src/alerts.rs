//! Alert dispatch for unreachable devices
//!
//! The [`AlertDispatcher`] fans one [`AlertEvent`] out to every configured
//! notification channel. Each channel is bounded by a timeout and its failure
//! is logged on its own, so one broken channel never hides the others and
//! no dispatch error ever escapes into the monitoring cycle.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use lettre::message::{Mailbox, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use reqwest::Client;
use serde_json::json;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{AlertConfig, AlertPolicy, Channel, Email, Webhook};
use crate::discord::DiscordNotifier;
use crate::prober::ProbeReport;

/// A device was found unreachable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertEvent {
    pub device_id: String,
    pub address: String,
    pub reason: String,
}

impl AlertEvent {
    pub fn new(
        device_id: impl Into<String>,
        address: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            address: address.into(),
            reason: reason.into(),
        }
    }

    /// Build the event for a failed probe, `None` if the device was reachable
    pub fn from_report(report: &ProbeReport) -> Option<Self> {
        if report.sample.status.is_reachable() {
            return None;
        }

        let reason = report
            .failure
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "no reply".to_string());

        Some(Self::new(
            report.sample.device_id.clone(),
            report.sample.address.clone(),
            reason,
        ))
    }

    pub fn subject(&self) -> String {
        format!("Device {} is unreachable", self.device_id)
    }

    pub fn body(&self) -> String {
        format!(
            "Device {} at address {} is unreachable.\nReason: {}",
            self.device_id, self.address, self.reason
        )
    }
}

/// Result of a dispatch that did not fail outright
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ack {
    /// Channels that accepted the notification
    pub delivered: usize,

    /// Channels that failed (already logged)
    pub failed: usize,

    /// The policy decided not to notify for this event
    pub suppressed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// Connection, TLS or protocol failure
    Transport { channel: String, message: String },

    /// The channel answered but refused the notification
    Rejected { channel: String, status: u16 },

    /// The channel did not answer in time
    Timeout { channel: String },

    /// The notification could not be built (bad address, etc.)
    Build { channel: String, message: String },

    /// Every channel failed; the first error is kept
    AllChannelsFailed { attempted: usize, first: Box<DispatchError> },
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::Transport { channel, message } => {
                write!(f, "{channel}: transport error: {message}")
            }
            DispatchError::Rejected { channel, status } => {
                write!(f, "{channel}: notification rejected with status {status}")
            }
            DispatchError::Timeout { channel } => write!(f, "{channel}: notification timed out"),
            DispatchError::Build { channel, message } => {
                write!(f, "{channel}: failed to build notification: {message}")
            }
            DispatchError::AllChannelsFailed { attempted, first } => {
                write!(f, "all {attempted} notification channels failed, first: {first}")
            }
        }
    }
}

impl std::error::Error for DispatchError {}

/// A channel able to deliver an [`AlertEvent`]
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, event: &AlertEvent) -> Result<(), DispatchError>;
}

/// Posts a JSON payload to a generic webhook
pub struct WebhookNotifier {
    client: Client,
    webhook: Webhook,
}

impl WebhookNotifier {
    pub fn new(client: Client, webhook: Webhook) -> Self {
        Self { client, webhook }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    #[instrument(skip(self, event), fields(device = %event.device_id))]
    async fn send(&self, event: &AlertEvent) -> Result<(), DispatchError> {
        let payload = json!({
            "subject": event.subject(),
            "message": event.body(),
            "device": event.device_id,
            "address": event.address,
            "reason": event.reason,
            "timestamp": Utc::now().to_rfc3339()
        });

        let response = self
            .client
            .post(&self.webhook.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| DispatchError::Transport {
                channel: self.name().to_string(),
                message: e.to_string(),
            })?;

        if response.status().is_success() {
            info!("Successfully sent webhook alert");
            Ok(())
        } else {
            Err(DispatchError::Rejected {
                channel: self.name().to_string(),
                status: response.status().as_u16(),
            })
        }
    }
}

/// Sends plain-text mails over SMTP
#[derive(Debug)]
pub struct EmailNotifier {
    from: Mailbox,
    to: Vec<Mailbox>,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl EmailNotifier {
    pub fn new(config: &Email, timeout: Duration) -> Result<Self, DispatchError> {
        let build_error = |message: String| DispatchError::Build {
            channel: "email".to_string(),
            message,
        };

        let from = config
            .from
            .parse::<Mailbox>()
            .map_err(|e| build_error(format!("invalid sender '{}': {e}", config.from)))?;
        let to = config
            .to
            .iter()
            .map(|address| {
                address
                    .parse::<Mailbox>()
                    .map_err(|e| build_error(format!("invalid recipient '{address}': {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        if to.is_empty() {
            return Err(build_error("no recipients configured".to_string()));
        }

        let builder = if config.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
                .map_err(|e| build_error(e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
        };
        let mut builder = builder.port(config.smtp_port).timeout(Some(timeout));

        let password = config.password.clone().or_else(crate::util::get_smtp_password);
        if let (Some(user), Some(pass)) = (&config.username, password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass));
        }

        Ok(Self {
            from,
            to,
            transport: builder.build(),
        })
    }

    pub fn build_message(&self, event: &AlertEvent) -> Result<Message, DispatchError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(event.subject())
            .header(ContentType::TEXT_PLAIN);
        for recipient in &self.to {
            builder = builder.to(recipient.clone());
        }

        builder.body(event.body()).map_err(|e| DispatchError::Build {
            channel: self.name().to_string(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    fn name(&self) -> &str {
        "email"
    }

    #[instrument(skip(self, event), fields(device = %event.device_id))]
    async fn send(&self, event: &AlertEvent) -> Result<(), DispatchError> {
        let message = self.build_message(event)?;

        self.transport
            .send(message)
            .await
            .map_err(|e| DispatchError::Transport {
                channel: self.name().to_string(),
                message: e.to_string(),
            })?;

        info!(recipients = self.to.len(), "Successfully sent alert email");
        Ok(())
    }
}

/// Sends alerts for unreachable devices to every configured channel
pub struct AlertDispatcher {
    notifiers: Vec<Arc<dyn Notifier>>,
    policy: AlertPolicy,
    timeout: Duration,

    /// Devices with an ongoing failure streak that was already notified
    alerted: Mutex<HashSet<String>>,
}

impl AlertDispatcher {
    pub fn new(notifiers: Vec<Arc<dyn Notifier>>, policy: AlertPolicy, timeout: Duration) -> Self {
        Self {
            notifiers,
            policy,
            timeout,
            alerted: Mutex::new(HashSet::new()),
        }
    }

    /// Build the notifiers described by the alert configuration
    ///
    /// Channels that cannot be set up are logged and skipped.
    pub fn from_config(config: &AlertConfig) -> Self {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .unwrap_or_else(|e| {
                warn!("failed to build HTTP client with timeout, using defaults: {e}");
                Client::new()
            });

        let mut notifiers: Vec<Arc<dyn Notifier>> = Vec::new();
        for channel in &config.channels {
            match channel {
                Channel::Webhook(webhook) => notifiers.push(Arc::new(WebhookNotifier::new(
                    client.clone(),
                    webhook.clone(),
                ))),
                Channel::Discord(discord) => notifiers.push(Arc::new(DiscordNotifier::new(
                    client.clone(),
                    discord.clone(),
                ))),
                Channel::Email(email) => match EmailNotifier::new(email, config.timeout()) {
                    Ok(notifier) => notifiers.push(Arc::new(notifier)),
                    Err(e) => error!("skipping email channel: {e}"),
                },
            }
        }

        info!(channels = notifiers.len(), policy = ?config.policy, "alert dispatcher ready");
        Self::new(notifiers, config.policy, config.timeout())
    }

    pub fn channels(&self) -> usize {
        self.notifiers.len()
    }

    fn should_notify(&self, device_id: &str) -> bool {
        let mut alerted = self.alerted.lock().unwrap_or_else(|e| e.into_inner());
        let first_of_streak = alerted.insert(device_id.to_string());
        match self.policy {
            AlertPolicy::EveryCycle => true,
            AlertPolicy::OnTransition => first_of_streak,
        }
    }

    /// Mark the device as recovered, ending its failure streak
    pub fn resolve(&self, device_id: &str) {
        let mut alerted = self.alerted.lock().unwrap_or_else(|e| e.into_inner());
        if alerted.remove(device_id) {
            debug!(device = device_id, "failure streak ended");
        }
    }

    /// Deliver the event to every channel, at most once each
    #[instrument(skip(self, event), fields(device = %event.device_id))]
    pub async fn notify(&self, event: &AlertEvent) -> Result<Ack, DispatchError> {
        if !self.should_notify(&event.device_id) {
            debug!("alert suppressed, device already notified for this failure streak");
            return Ok(Ack {
                suppressed: true,
                ..Ack::default()
            });
        }

        if self.notifiers.is_empty() {
            debug!("no notification channels configured");
            return Ok(Ack::default());
        }

        let sends = self.notifiers.iter().map(|notifier| async move {
            match tokio::time::timeout(self.timeout, notifier.send(event)).await {
                Ok(result) => result,
                Err(_) => Err(DispatchError::Timeout {
                    channel: notifier.name().to_string(),
                }),
            }
        });

        let mut ack = Ack::default();
        let mut first_error = None;
        for result in join_all(sends).await {
            match result {
                Ok(()) => ack.delivered += 1,
                Err(e) => {
                    error!("failed to send alert: {e}");
                    ack.failed += 1;
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(first) if ack.delivered == 0 => {
                // nothing got through, so the next failure of this streak must alert again
                self.forget(&event.device_id);
                Err(DispatchError::AllChannelsFailed {
                    attempted: ack.failed,
                    first: Box::new(first),
                })
            }
            _ => Ok(ack),
        }
    }

    fn forget(&self, device_id: &str) {
        let mut alerted = self.alerted.lock().unwrap_or_else(|e| e.into_inner());
        alerted.remove(device_id);
    }
}
