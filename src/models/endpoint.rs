use chrono::{DateTime, Utc};
use serde::Serialize;

/// Protocol recorded when a node does not declare one
pub const UNKNOWN_PROTOCOL: &str = "unknown";

/// Normalize an address for comparison (trimmed, lowercase)
pub fn normalize_address(address: &str) -> String {
    address.trim().to_lowercase()
}

/// Statistics key: (address, port, protocol) in normalized form.
///
/// Fields are private so every key goes through [`EndpointKey::new`].
/// Ordering is address, then numeric port, then protocol.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EndpointKey {
    address: String,
    port: u16,
    protocol: String,
}

impl EndpointKey {
    pub fn new(address: &str, port: u16, protocol: Option<&str>) -> Self {
        let protocol = protocol
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| UNKNOWN_PROTOCOL.to_string());

        EndpointKey {
            address: normalize_address(address),
            port,
            protocol,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }
}

impl std::fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{},{}", self.address, self.port, self.protocol)
    }
}

/// Cumulative probe counters for one endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct EndpointStat {
    pub pass: u64,
    pub fail: u64,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
}

impl EndpointStat {
    /// A single observation made at `now`
    pub fn observation(alive: bool, now: DateTime<Utc>) -> Self {
        EndpointStat {
            pass: u64::from(alive),
            fail: u64::from(!alive),
            first_seen: Some(now),
            last_seen: Some(now),
        }
    }

    pub fn total(&self) -> u64 {
        self.pass.saturating_add(self.fail)
    }

    /// Success rate as a percentage; 0 when nothing was observed
    pub fn success_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            (self.pass as f64 / total as f64) * 100.0
        }
    }

    /// Additive merge of `delta` into `existing`.
    ///
    /// Counters add up, `first_seen` keeps the existing value once set and
    /// `last_seen` takes the delta's timestamp.
    pub fn merge_increment(existing: Option<&EndpointStat>, delta: &EndpointStat) -> EndpointStat {
        match existing {
            None => *delta,
            Some(current) => EndpointStat {
                pass: current.pass.saturating_add(delta.pass),
                fail: current.fail.saturating_add(delta.fail),
                first_seen: current.first_seen.or(delta.first_seen),
                last_seen: delta.last_seen.or(current.last_seen),
            },
        }
    }

    /// Merge two stored rows for the same endpoint.
    ///
    /// Counters add up and the timestamps widen to the span covering both
    /// rows, whatever order the rows were written in.
    pub fn merge_rows(existing: Option<&EndpointStat>, row: &EndpointStat) -> EndpointStat {
        match existing {
            None => *row,
            Some(current) => EndpointStat {
                pass: current.pass.saturating_add(row.pass),
                fail: current.fail.saturating_add(row.fail),
                first_seen: earliest(current.first_seen, row.first_seen),
                last_seen: latest(current.last_seen, row.last_seen),
            },
        }
    }
}

fn earliest(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn latest(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}
