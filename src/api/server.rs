//! Ping service using Axum

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

use crate::config::ServerConfig;
use crate::error::{NodeProbeError, Result};
use crate::probe::Prober;
use crate::services::ProbeEngine;

use super::middleware::RequestLogging;
use super::routes;

/// Shared state for handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ProbeEngine>,
    /// Prober answering `/ping`
    pub prober: Prober,
    /// Timeout used when `/ping` has none
    pub default_timeout_ms: u64,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(engine: Arc<ProbeEngine>, prober: Prober) -> Self {
        let default_timeout_ms = engine.config().timeout_ms;
        Self {
            engine,
            prober,
            default_timeout_ms,
            started_at: Instant::now(),
        }
    }
}

/// HTTP ping service
pub struct PingServer {
    config: ServerConfig,
    state: AppState,
}

impl PingServer {
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Build the router
    pub fn build_router(&self) -> Router {
        routes::create_router(self.state.clone())
            .layer(axum::middleware::from_fn(RequestLogging::log_request))
            .layer(TraceLayer::new_for_http())
    }

    /// Bind the configured address and serve until `shutdown` flips
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let listener = TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener
    pub async fn serve(&self, listener: TcpListener, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let router = self.build_router();

        info!(
            addr = %listener.local_addr()?,
            primitive = self.state.prober.primitive_name(),
            "Ping service listening"
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.changed().await;
            })
            .await
            .map_err(|e| NodeProbeError::Internal(e.to_string()))?;

        info!("Ping service shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::testing::{state_with, Answers};
    use crate::probe::{HttpPing, ProbeTarget, Reachability};
    use std::time::Duration;
    use url::Url;

    #[tokio::test]
    async fn test_http_ping_against_ping_service() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with(dir.path(), Answers::new(&[("1.1.1.1", Some(12)), ("2.2.2.2", None)]));
        let server = PingServer::new(
            ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            state,
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move { server.serve(listener, shutdown_rx).await });

        let client = HttpPing::new(Url::parse(&format!("http://{}", addr)).unwrap());
        let alive = client.check(&ProbeTarget::new("1.1.1.1", None), 500).await.unwrap();
        assert_eq!(alive, Some(Duration::from_millis(12)));

        let dead = client.check(&ProbeTarget::new("2.2.2.2", None), 500).await.unwrap();
        assert_eq!(dead, None);

        let no_server = client.check(&ProbeTarget::new("", None), 500).await.unwrap();
        assert_eq!(no_server, None);

        shutdown_tx.send(true).unwrap();
        task.await.unwrap().unwrap();
    }
}
