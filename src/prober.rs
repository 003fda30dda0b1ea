//! Reachability probes
//!
//! [`Prober`] is the network primitive: it checks one address and reports
//! either a round-trip time or why it failed. [`probe`] wraps it into the
//! contract used by the scheduler: it always yields a [`StatusSample`], with
//! every failure collapsed into an unreachable status plus a reason for the
//! logs. Probing never persists or alerts by itself.

use std::fmt;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::random;
use surge_ping::{Client, Config, ICMP, PingIdentifier, PingSequence, SurgeError};
use tracing::{debug, instrument, trace, warn};

use crate::registry::Device;
use crate::{Reachability, StatusSample};

/// Why a probe did not get a reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// No reply within the hard timeout
    Timeout(Duration),

    /// The check could not be executed or completed unsuccessfully
    Execution(String),

    /// The probe task itself failed (panic, cancellation)
    Unexpected(String),
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeError::Timeout(after) => write!(f, "probe timed out after {:?}", after),
            ProbeError::Execution(msg) => write!(f, "probe failed: {}", msg),
            ProbeError::Unexpected(msg) => write!(f, "unexpected probe error: {}", msg),
        }
    }
}

impl std::error::Error for ProbeError {}

/// Executes one reachability check against an address
#[async_trait]
pub trait Prober: Send + Sync {
    /// Returns the round-trip time of the first reply
    async fn check(&self, address: &str) -> Result<Duration, ProbeError>;
}

/// Hands out strictly increasing millisecond timestamps
///
/// Wall-clock time is used as long as it moves forward; if it stalls or
/// jumps back, the previous timestamp is bumped by one millisecond instead.
#[derive(Debug, Default)]
pub struct SampleClock {
    last_millis: Mutex<i64>,
}

impl SampleClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> DateTime<Utc> {
        let mut last = self.last_millis.lock().unwrap_or_else(|e| e.into_inner());
        let next = Utc::now().timestamp_millis().max(*last + 1);
        *last = next;
        DateTime::from_timestamp_millis(next).unwrap_or_else(Utc::now)
    }
}

/// Outcome of [`probe`]
#[derive(Debug, Clone)]
pub struct ProbeReport {
    pub sample: StatusSample,

    /// Round-trip time, if a reply was received
    pub latency: Option<Duration>,

    /// Failure reason, if the device was deemed unreachable
    pub failure: Option<ProbeError>,
}

/// Probe `device` and turn the outcome into a sample
///
/// The check is bounded by `timeout` regardless of the prober implementation.
#[instrument(skip(prober, clock), fields(device = %device.id, address = %device.address))]
pub async fn probe(
    prober: &dyn Prober,
    device: &Device,
    timeout: Duration,
    clock: &SampleClock,
) -> ProbeReport {
    let result = match tokio::time::timeout(timeout, prober.check(&device.address)).await {
        Ok(result) => result,
        Err(_) => Err(ProbeError::Timeout(timeout)),
    };

    let (status, latency, failure) = match result {
        Ok(rtt) => {
            trace!(rtt_ms = rtt.as_millis() as u64, "reply received");
            (Reachability::Reachable, Some(rtt), None)
        }
        Err(e) => {
            debug!("no reply: {e}");
            (Reachability::Unreachable, None, Some(e))
        }
    };

    ProbeReport {
        sample: StatusSample::new(device.id.clone(), device.address.clone(), clock.now(), status),
        latency,
        failure,
    }
}

const PAYLOAD: [u8; 56] = [0; 56];

/// ICMP echo prober
///
/// Sends up to `count` echo requests and succeeds on the first reply. Each
/// request waits `timeout / count` for its reply.
pub struct IcmpProber {
    v4: Client,
    v6: Option<Client>,
    count: u16,
    per_request: Duration,
}

impl IcmpProber {
    pub fn new(count: u16, timeout: Duration) -> std::io::Result<Self> {
        let count = count.max(1);
        let v4 = Client::new(&Config::default())?;
        let v6 = match Client::new(&Config::builder().kind(ICMP::V6).build()) {
            Ok(client) => Some(client),
            Err(e) => {
                warn!("IPv6 ICMP unavailable, IPv6 devices will be reported unreachable: {e}");
                None
            }
        };

        Ok(Self {
            v4,
            v6,
            count,
            per_request: timeout / u32::from(count),
        })
    }

    async fn resolve(address: &str) -> Result<IpAddr, ProbeError> {
        if let Ok(ip) = address.parse::<IpAddr>() {
            return Ok(ip);
        }

        tokio::net::lookup_host((address, 0))
            .await
            .map_err(|e| ProbeError::Execution(format!("failed to resolve {address}: {e}")))?
            .next()
            .map(|addr| addr.ip())
            .ok_or_else(|| ProbeError::Execution(format!("{address} resolved to no addresses")))
    }
}

#[async_trait]
impl Prober for IcmpProber {
    async fn check(&self, address: &str) -> Result<Duration, ProbeError> {
        let ip = Self::resolve(address).await?;

        let client = match ip {
            IpAddr::V4(_) => &self.v4,
            IpAddr::V6(_) => self
                .v6
                .as_ref()
                .ok_or_else(|| ProbeError::Execution("IPv6 ICMP unavailable".to_string()))?,
        };

        let mut pinger = client.pinger(ip, PingIdentifier(random())).await;
        pinger.timeout(self.per_request);

        let mut last_error = None;
        for seq in 0..self.count {
            match pinger.ping(PingSequence(seq), &PAYLOAD).await {
                Ok((_reply, rtt)) => return Ok(rtt),
                Err(e) => {
                    trace!(seq, "echo request failed: {e}");
                    last_error = Some(e);
                }
            }
        }

        Err(match last_error {
            Some(SurgeError::Timeout { .. }) => ProbeError::Timeout(self.per_request * u32::from(self.count)),
            Some(e) => ProbeError::Execution(e.to_string()),
            None => ProbeError::Execution("no echo request sent".to_string()),
        })
    }
}
