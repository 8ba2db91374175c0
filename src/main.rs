//! nodeprobe - Entry Point
//!
//! `nodeprobe run` (default) probes a JSON node list once and writes the
//! alive nodes; `nodeprobe serve` starts the ping service with graceful
//! shutdown support.

use std::path::Path;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nodeprobe::api::{AppState, PingServer};
use nodeprobe::config::{Config, LogConfig};
use nodeprobe::error::{NodeProbeError, Result};
use nodeprobe::models::parse_nodes;
use nodeprobe::probe::{create_reachability, ProbeMethod, Prober};
use nodeprobe::services::{NodePipeline, ProbeEngine};

enum Command {
    Run,
    Serve,
}

impl Command {
    fn from_args() -> Result<Self> {
        match std::env::args().nth(1).as_deref() {
            None | Some("run") => Ok(Command::Run),
            Some("serve") => Ok(Command::Serve),
            Some(other) => Err(NodeProbeError::InvalidConfig(format!(
                "unknown command `{}`, expected `run` or `serve`",
                other
            ))),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing(&LogConfig::from_env());

    let command = Command::from_args()?;
    let config = Config::from_env().map_err(|e| {
        error!("Invalid configuration: {}", e);
        e
    })?;
    info!(
        method = config.probe.method.as_str(),
        stats_path = %config.probe.stats_path.display(),
        "Configuration loaded"
    );

    match command {
        Command::Run => run(&config).await,
        Command::Serve => serve(&config).await,
    }
}

fn init_tracing(log: &LogConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("nodeprobe={},tower_http=info", log.level).into());

    let registry = tracing_subscriber::registry().with(filter);
    if log.format.eq_ignore_ascii_case("pretty") {
        registry
            .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    }
}

/// One probe cycle over the configured node list
async fn run(config: &Config) -> Result<()> {
    let primitive = create_reachability(config.probe.method, &config.probe.ping_service);
    let engine = ProbeEngine::new(config.cycle(), primitive)?;

    let raw = read_nodes(config.pipeline.nodes_path.as_deref()).await?;
    let nodes = parse_nodes(&raw).map_err(|e| NodeProbeError::InvalidNodes(e.to_string()))?;
    info!(nodes = nodes.len(), "Node list loaded");

    let report = engine.run_probe_cycle(&nodes).await;

    let pipeline = NodePipeline::from_config(&config.pipeline);
    let alive = if pipeline.is_noop() {
        report.alive
    } else if report.stats_error.is_some() {
        warn!("Skipping rate filter and rename, statistics are unavailable");
        report.alive
    } else {
        let alive = report.alive;
        engine.with_table(|table| pipeline.apply(alive, table))?
    };

    let mut output = serde_json::to_string_pretty(&alive)?;
    output.push('\n');
    match &config.pipeline.output_path {
        Some(path) => {
            tokio::fs::write(path, output).await?;
            info!(path = %path.display(), nodes = alive.len(), "Alive nodes written");
        }
        None => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(output.as_bytes()).await?;
            stdout.flush().await?;
        }
    }

    match report.stats_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

async fn read_nodes(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => Ok(tokio::fs::read_to_string(path).await?),
        None => {
            let mut raw = String::new();
            tokio::io::stdin().read_to_string(&mut raw).await?;
            Ok(raw)
        }
    }
}

/// Run the ping service until a shutdown signal arrives
async fn serve(config: &Config) -> Result<()> {
    // The service is what the `http` method talks to, so it cannot use it itself
    let method = match config.probe.method {
        ProbeMethod::Http => {
            warn!("PROBE_METHOD=http cannot back the ping service, using icmp");
            ProbeMethod::Icmp
        }
        other => other,
    };
    let primitive = create_reachability(method, &config.probe.ping_service);
    let engine = Arc::new(ProbeEngine::new(config.cycle(), primitive.clone())?);
    let server = PingServer::new(
        config.server.clone(),
        AppState::new(engine, Prober::new(primitive)),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server_task = tokio::spawn(async move {
        if let Err(e) = server.run(shutdown_rx).await {
            error!("Ping service error: {}", e);
        }
    });

    info!("Ping service started on {}", config.server_addr());

    shutdown_signal().await;
    info!("Shutdown signal received");

    let _ = shutdown_tx.send(true);
    let _ = server_task.await;

    info!("nodeprobe stopped");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
