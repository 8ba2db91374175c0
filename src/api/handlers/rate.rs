//! Success rate lookup

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use crate::api::AppState;
use crate::error::{NodeProbeError, Result};
use crate::models::EndpointKey;
use crate::stats::RateView;

#[derive(Debug, Deserialize)]
pub struct RateParams {
    pub server: String,
    pub port: u16,
    pub protocol: Option<String>,
}

/// Persisted counters and success rate for one endpoint
pub async fn get_rate(State(state): State<AppState>, Query(params): Query<RateParams>) -> Result<Json<RateView>> {
    if params.server.trim().is_empty() {
        return Err(NodeProbeError::InvalidRequest("server is required".into()));
    }

    let key = EndpointKey::new(&params.server, params.port, params.protocol.as_deref());
    state
        .engine
        .get_rate(&key)?
        .map(Json)
        .ok_or_else(|| NodeProbeError::EndpointNotFound(key.to_string()))
}
