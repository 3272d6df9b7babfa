//! Startup orchestration.
//!
//! Config first, then the orchestrator and its background loop, listeners
//! last so traffic only arrives once everything is ready. Any error here is
//! fatal.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::config::OrchestratorConfig;
use crate::http::HttpServer;
use crate::lifecycle::{signals, Shutdown};
use crate::observability::metrics;
use crate::orchestrator::Orchestrator;

pub async fn run(config: OrchestratorConfig) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(
        providers = config.providers.len(),
        personas = config.personas.len(),
        bind_address = %config.server.bind_address,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let orchestrator = Arc::new(Orchestrator::from_config(config.clone())?);
    if orchestrator.registry().is_empty() {
        tracing::warn!("No AI providers available, serving research and static answers only");
    }

    let shutdown = Shutdown::new();
    let sweeper = orchestrator.spawn_health_loop(shutdown.subscribe());

    let listener = TcpListener::bind(&config.server.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    tokio::spawn(signals::wait_for_signal(shutdown.clone()));

    let server = HttpServer::new(Arc::clone(&orchestrator), &config);
    server
        .run(listener, Shutdown::wait(shutdown.subscribe()))
        .await?;

    shutdown.trigger();
    if let Err(e) = sweeper.await {
        tracing::warn!(error = %e, "Circuit sweeper task ended abnormally");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
