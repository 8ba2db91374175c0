//! Request logging middleware

use axum::body::Body;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use tracing::{debug, info};

use crate::timing::Stopwatch;

/// Request logging middleware
pub struct RequestLogging;

impl RequestLogging {
    /// Log method, path, status and elapsed time of every request
    pub async fn log_request(req: Request<Body>, next: Next) -> Response {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let stopwatch = Stopwatch::start();

        debug!(%method, %path, "Request started");

        let response = next.run(req).await;

        info!(
            %method,
            %path,
            status = response.status().as_u16(),
            elapsed = %stopwatch.elapsed_display(),
            "Request finished"
        );

        response
    }
}
