//! Endpoint probing
//!
//! A [`Reachability`] primitive answers "is this address alive, and how
//! fast?". [`Prober`] wraps a primitive with a deadline and timeout unit
//! conversion, [`DedupPlanner`] turns a node list into unique targets and
//! [`TaskScheduler`] runs the probes with bounded concurrency.

mod http_ping;
mod icmp;
mod planner;
mod prober;
mod scheduler;
mod tcp;

pub use http_ping::HttpPing;
pub use icmp::{parse_ping_latency, IcmpPing, PingPlatform};
pub use planner::{DedupPlanner, ProbePlan};
pub use prober::{Prober, PROBE_GRACE};
pub use scheduler::TaskScheduler;
pub use tcp::TcpConnect;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// Per-target probe failure.
///
/// Never surfaces past [`Prober`]; every variant means "not alive".
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("probe timed out")]
    Timeout,

    #[error("target {0} has no port to connect to")]
    MissingPort(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("ping command failed: {0}")]
    Command(String),

    #[error("ping service error: {0}")]
    Service(String),
}

/// Unit a primitive expects its timeout argument in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutUnit {
    Millis,
    Seconds,
}

impl TimeoutUnit {
    /// Convert a millisecond budget to this unit. Never returns 0;
    /// seconds round up.
    pub fn convert(&self, timeout_ms: u64) -> u64 {
        match self {
            TimeoutUnit::Millis => timeout_ms.max(1),
            TimeoutUnit::Seconds => timeout_ms.div_ceil(1000).max(1),
        }
    }

    /// Duration of `value` expressed in this unit
    pub fn to_duration(&self, value: u64) -> Duration {
        match self {
            TimeoutUnit::Millis => Duration::from_millis(value),
            TimeoutUnit::Seconds => Duration::from_secs(value),
        }
    }
}

/// Host to probe, plus a port taken from the first node using it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeTarget {
    pub address: String,
    pub port: Option<u16>,
}

impl ProbeTarget {
    pub fn new(address: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }
}

/// Result of one probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeOutcome {
    pub address: String,
    pub alive: bool,
    pub latency_ms: Option<u64>,
}

impl ProbeOutcome {
    pub fn alive(address: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            address: address.into(),
            alive: true,
            latency_ms: Some(latency_ms),
        }
    }

    pub fn dead(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            alive: false,
            latency_ms: None,
        }
    }
}

/// Pluggable reachability check.
///
/// `timeout` is already expressed in [`Reachability::timeout_unit`].
/// `Ok(Some(latency))` means alive, `Ok(None)` means the target answered
/// nothing within the timeout.
#[async_trait]
pub trait Reachability: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    fn timeout_unit(&self) -> TimeoutUnit;

    async fn check(&self, target: &ProbeTarget, timeout: u64) -> Result<Option<Duration>, ProbeError>;
}

/// Probe method selected by configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProbeMethod {
    #[default]
    Icmp,
    Tcp,
    Http,
}

impl ProbeMethod {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "icmp" | "ping" => Some(Self::Icmp),
            "tcp" | "connect" => Some(Self::Tcp),
            "http" | "http_meta" | "service" => Some(Self::Http),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Icmp => "icmp",
            Self::Tcp => "tcp",
            Self::Http => "http",
        }
    }
}

/// Build the reachability primitive for a probe method
pub fn create_reachability(method: ProbeMethod, ping_service: &url::Url) -> Arc<dyn Reachability> {
    match method {
        ProbeMethod::Icmp => Arc::new(IcmpPing::for_current_platform()),
        ProbeMethod::Tcp => Arc::new(TcpConnect::new()),
        ProbeMethod::Http => Arc::new(HttpPing::new(ping_service.clone())),
    }
}
