use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use tracing::trace;

use crate::registry::{Device, DeviceRegistry};

/// Storage backend configuration
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence)
    #[serde(rename = "none")]
    None,

    /// SQLite database (default for most deployments)
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./samples.db")
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub devices: Vec<Device>,

    /// Seconds to sleep between two monitoring cycles
    #[serde(default = "default_interval")]
    pub interval: u64,

    #[serde(default)]
    pub probe: ProbeConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub alert: AlertConfig,

    /// Storage configuration (optional - defaults to SQLite)
    pub storage: Option<StorageConfig>,

    #[serde(default)]
    pub api: ApiSettings,
}

impl Config {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }

    /// Build the validated device registry from the configured devices
    pub fn registry(&self) -> anyhow::Result<DeviceRegistry> {
        DeviceRegistry::new(self.devices.clone()).context("invalid device configuration")
    }

    fn validate(&self) -> anyhow::Result<()> {
        self.registry()?;
        anyhow::ensure!(self.interval > 0, "interval must be at least one second");
        anyhow::ensure!(
            self.rate_limit.calls > 0,
            "rate_limit.calls must be at least 1"
        );
        anyhow::ensure!(self.probe.count > 0, "probe.count must be at least 1");
        anyhow::ensure!(self.probe.timeout > 0, "probe.timeout must be at least 1");
        Ok(())
    }
}

/// Reachability probe settings
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ProbeConfig {
    /// Echo requests sent per probe
    #[serde(default = "default_probe_count")]
    pub count: u16,

    /// Hard timeout for a whole probe, in seconds
    #[serde(default = "default_probe_timeout")]
    pub timeout: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            count: default_probe_count(),
            timeout: default_probe_timeout(),
        }
    }
}

impl ProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct RateLimitConfig {
    /// Calls admitted per period and key
    #[serde(default = "default_rate_limit_calls")]
    pub calls: usize,

    /// Window length in seconds
    #[serde(default = "default_rate_limit_period")]
    pub period: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            calls: default_rate_limit_calls(),
            period: default_rate_limit_period(),
        }
    }
}

impl RateLimitConfig {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period)
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct CacheConfig {
    /// Time-to-live of the aggregated series, in seconds
    #[serde(default = "default_cache_ttl")]
    pub ttl: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: default_cache_ttl(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl)
    }
}

/// When alerts are sent for a device that keeps failing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertPolicy {
    /// Alert on every unreachable sample
    #[default]
    EveryCycle,

    /// Alert only on the first unreachable sample of a failure streak
    OnTransition,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct AlertConfig {
    #[serde(default)]
    pub policy: AlertPolicy,

    /// Timeout for a single notification delivery, in seconds
    #[serde(default = "default_alert_timeout")]
    pub timeout: u64,

    #[serde(default)]
    pub channels: Vec<Channel>,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            policy: AlertPolicy::default(),
            timeout: default_alert_timeout(),
            channels: Vec::new(),
        }
    }
}

impl AlertConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email(Email),
    Discord(Discord),
    Webhook(Webhook),
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Webhook {
    pub url: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Discord {
    pub url: String,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Email {
    pub smtp_host: String,

    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    /// Use STARTTLS; disable only for local relays
    #[serde(default = "default_true")]
    pub starttls: bool,

    pub from: String,

    pub to: Vec<String>,

    pub username: Option<String>,

    /// Falls back to the `SMTP_PASSWORD` environment variable
    pub password: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ApiSettings {
    #[serde(default = "crate::util::get_default_bind_addr")]
    pub bind: SocketAddr,

    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            bind: crate::util::get_default_bind_addr(),
            enable_cors: true,
        }
    }
}

fn default_interval() -> u64 {
    60
}

fn default_probe_count() -> u16 {
    4
}

fn default_probe_timeout() -> u64 {
    10
}

fn default_rate_limit_calls() -> usize {
    1
}

fn default_rate_limit_period() -> u64 {
    60
}

fn default_cache_ttl() -> u64 {
    60
}

fn default_alert_timeout() -> u64 {
    30
}

fn default_smtp_port() -> u16 {
    587
}

fn default_true() -> bool {
    true
}

pub fn parse_config(content: &str) -> anyhow::Result<Config> {
    let config: Config =
        serde_json::from_str(content).context("Invalid configuration file provided!")?;
    config.validate()?;
    trace!("loaded config: {config:?}");
    Ok(config)
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read configuration file {path}"))?;
    parse_config(&file_content)
}
