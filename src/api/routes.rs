//! Ping service route definitions

use axum::routing::get;
use axum::Router;

use super::handlers;
use super::server::AppState;

/// Create the router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/ping", get(handlers::ping::ping))
        .route("/rate", get(handlers::rate::get_rate))
        .with_state(state)
}
