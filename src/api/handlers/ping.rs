//! On-demand ping endpoint
//!
//! `GET /ping?server=<addr>&timeout=<ms>` answers with the round-trip time
//! in milliseconds as plain text, or `0` when the host did not reply or no
//! server was given. Timeouts above [`MAX_PING_TIMEOUT_MS`] are clamped.

use axum::extract::{Query, State};
use serde::Deserialize;
use tracing::debug;

use crate::api::AppState;
use crate::error::{NodeProbeError, Result};
use crate::probe::ProbeTarget;

/// Upper bound on the per-request timeout a caller may ask for
pub const MAX_PING_TIMEOUT_MS: u64 = 10_000;

const DEAD: &str = "0";

#[derive(Debug, Deserialize)]
pub struct PingParams {
    pub server: Option<String>,
    pub timeout: Option<String>,
}

/// Ping one host
pub async fn ping(State(state): State<AppState>, Query(params): Query<PingParams>) -> Result<String> {
    let Some(server) = params.server.as_deref().map(str::trim).filter(|s| !s.is_empty()) else {
        debug!("Ping without server");
        return Ok(DEAD.to_string());
    };

    let timeout_ms = match params.timeout.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        Some(raw) => raw
            .parse::<u64>()
            .map_err(|_| NodeProbeError::InvalidRequest(format!("invalid timeout `{}`", raw)))?,
        None => state.default_timeout_ms,
    }
    .min(MAX_PING_TIMEOUT_MS);

    let outcome = state
        .prober
        .probe(&ProbeTarget::new(server, None), timeout_ms)
        .await;
    debug!(server, alive = outcome.alive, latency_ms = ?outcome.latency_ms, "Ping answered");

    // 0 is reserved for "dead", so a sub-millisecond reply reads as 1
    Ok(match outcome.latency_ms {
        Some(ms) if outcome.alive => ms.max(1).to_string(),
        _ => DEAD.to_string(),
    })
}
