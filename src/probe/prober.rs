use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, instrument};

use super::{ProbeOutcome, ProbeTarget, Reachability};

/// Slack added on top of the primitive's own timeout before the call is abandoned
pub const PROBE_GRACE: Duration = Duration::from_millis(500);

/// Runs a [`Reachability`] primitive within a time budget.
///
/// Owns the millisecond to primitive-unit conversion and turns every
/// failure into a dead outcome.
#[derive(Clone)]
pub struct Prober {
    primitive: Arc<dyn Reachability>,
}

impl Prober {
    pub fn new(primitive: Arc<dyn Reachability>) -> Self {
        Self { primitive }
    }

    pub fn primitive_name(&self) -> &'static str {
        self.primitive.name()
    }

    /// Hard upper bound on a single probe for the given budget
    pub fn deadline(&self, timeout_ms: u64) -> Duration {
        let unit = self.primitive.timeout_unit();
        unit.to_duration(unit.convert(timeout_ms)) + PROBE_GRACE
    }

    /// Probe one target. Never fails: errors and timeouts read as not alive.
    #[instrument(skip(self, target), fields(primitive = self.primitive.name(), address = %target.address))]
    pub async fn probe(&self, target: &ProbeTarget, timeout_ms: u64) -> ProbeOutcome {
        let unit = self.primitive.timeout_unit();
        let value = unit.convert(timeout_ms);

        match timeout(self.deadline(timeout_ms), self.primitive.check(target, value)).await {
            Ok(Ok(Some(latency))) => {
                let latency_ms = round_millis(latency);
                debug!(latency_ms, "Target is alive");
                ProbeOutcome::alive(target.address.clone(), latency_ms)
            }
            Ok(Ok(None)) => {
                debug!("Target did not answer");
                ProbeOutcome::dead(target.address.clone())
            }
            Ok(Err(e)) => {
                debug!(error = %e, "Probe failed");
                ProbeOutcome::dead(target.address.clone())
            }
            Err(_) => {
                debug!("Probe deadline elapsed");
                ProbeOutcome::dead(target.address.clone())
            }
        }
    }
}

/// Nearest whole millisecond, halves rounding up
fn round_millis(latency: Duration) -> u64 {
    let micros = latency.as_micros().saturating_add(500);
    u64::try_from(micros / 1000).unwrap_or(u64::MAX)
}
