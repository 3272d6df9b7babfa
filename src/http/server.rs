//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the public and admin handlers
//! - Wire up middleware (tracing, request ID, timeout)
//! - Serve until the shutdown future resolves

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::HeaderName,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::admin;
use crate::config::OrchestratorConfig;
use crate::http::handlers::{self, X_REQUEST_ID};
use crate::orchestrator::Orchestrator;

/// Headroom on top of the Solve ceiling before the HTTP layer gives up.
const REQUEST_TIMEOUT_SLACK: Duration = Duration::from_secs(5);

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub admin_api_key: Arc<str>,
}

/// HTTP surface for the orchestrator.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(orchestrator: Arc<Orchestrator>, config: &OrchestratorConfig) -> Self {
        let state = AppState {
            orchestrator,
            admin_api_key: Arc::from(config.server.admin_api_key.as_str()),
        };
        let timeout = config.solve.hard_ceiling() + REQUEST_TIMEOUT_SLACK;
        Self {
            router: Self::build_router(state, timeout),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(state: AppState, request_timeout: Duration) -> Router {
        let request_id = HeaderName::from_static(X_REQUEST_ID);

        Router::new()
            .route("/v1/solve", post(handlers::solve))
            .route("/v1/status", get(handlers::status))
            .route("/health", get(handlers::health))
            .merge(admin::router(state.clone()))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::new(request_id))
                    .layer(TimeoutLayer::new(request_timeout)),
            )
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve on `listener` until `shutdown` completes.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
