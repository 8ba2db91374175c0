//! ICMP echo through the system `ping` binary
//!
//! The binary's timeout flag differs per platform:
//!
//! | platform        | command                     | unit         |
//! |-----------------|-----------------------------|--------------|
//! | Windows         | `ping -n 1 -w <ms> host`    | milliseconds |
//! | Linux           | `ping -c 1 -W <s> host`     | seconds      |
//! | macOS / BSD     | `ping -c 1 -t <s> host`     | seconds      |

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::tcp::bare_host;
use super::{ProbeError, ProbeTarget, Reachability, TimeoutUnit};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingPlatform {
    Windows,
    Linux,
    Bsd,
}

impl PingPlatform {
    pub fn current() -> Self {
        Self::from_os(std::env::consts::OS)
    }

    /// Map a `std::env::consts::OS` value; unknown systems get the Linux flags
    pub fn from_os(os: &str) -> Self {
        match os {
            "windows" => PingPlatform::Windows,
            "macos" | "ios" | "freebsd" | "openbsd" | "netbsd" | "dragonfly" => PingPlatform::Bsd,
            _ => PingPlatform::Linux,
        }
    }

    pub fn timeout_unit(&self) -> TimeoutUnit {
        match self {
            PingPlatform::Windows => TimeoutUnit::Millis,
            PingPlatform::Linux | PingPlatform::Bsd => TimeoutUnit::Seconds,
        }
    }

    /// Arguments for a single echo request; `timeout` is in [`Self::timeout_unit`]
    pub fn args(&self, host: &str, timeout: u64) -> Vec<String> {
        let (count_flag, timeout_flag) = match self {
            PingPlatform::Windows => ("-n", "-w"),
            PingPlatform::Linux => ("-c", "-W"),
            PingPlatform::Bsd => ("-c", "-t"),
        };
        vec![
            count_flag.to_string(),
            "1".to_string(),
            timeout_flag.to_string(),
            timeout.to_string(),
            host.to_string(),
        ]
    }
}

/// Runs the platform `ping` command once per probe
#[derive(Debug, Clone)]
pub struct IcmpPing {
    platform: PingPlatform,
    program: String,
}

impl IcmpPing {
    pub fn new(platform: PingPlatform) -> Self {
        Self {
            platform,
            program: "ping".to_string(),
        }
    }

    pub fn for_current_platform() -> Self {
        Self::new(PingPlatform::current())
    }

    pub fn platform(&self) -> PingPlatform {
        self.platform
    }
}

/// Extract the round-trip time from `ping` output.
///
/// Understands `time=12.3 ms`, `time=14ms` and `time<1ms`.
pub fn parse_ping_latency(output: &str) -> Option<Duration> {
    let start = output
        .find("time=")
        .or_else(|| output.find("time<"))
        .map(|i| i + "time=".len())?;

    let number: String = output[start..]
        .chars()
        .skip_while(|c| c.is_whitespace())
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();

    let millis: f64 = number.parse().ok()?;
    if !millis.is_finite() || millis < 0.0 {
        return None;
    }
    Some(Duration::from_micros((millis * 1000.0).round() as u64))
}

#[async_trait]
impl Reachability for IcmpPing {
    fn name(&self) -> &'static str {
        "icmp"
    }

    fn timeout_unit(&self) -> TimeoutUnit {
        self.platform.timeout_unit()
    }

    async fn check(&self, target: &ProbeTarget, timeout: u64) -> Result<Option<Duration>, ProbeError> {
        let output = Command::new(&self.program)
            .args(self.platform.args(bare_host(&target.address), timeout))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ProbeError::Command(format!("{}: {}", self.program, e)))?;

        if !output.status.success() {
            return Ok(None);
        }

        Ok(parse_ping_latency(&String::from_utf8_lossy(&output.stdout)))
    }
}
