//! AI provider orchestrator.
//!
//! ```text
//!     POST /v1/solve {problem, persona}
//!             │
//!             ▼
//!     ┌───────────────────────────────────────────────────────────┐
//!     │                      ORCHESTRATOR                          │
//!     │                                                            │
//!     │  fallback chain:                                           │
//!     │   knowledge base → web search → AI providers → static      │
//!     │                                    │                       │
//!     │                     ┌──────────────┼──────────────┐        │
//!     │                     ▼              ▼              ▼        │
//!     │              circuit breaker   usage governor   timeout    │
//!     │               (per provider)   (per persona)   + deadline  │
//!     │                                                            │
//!     │  every attempt → outcome recorder → trust weights          │
//!     │  background sweeper: Open → Half-Open after cooldown       │
//!     └───────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use provider_orchestrator::config::load_from_env;
use provider_orchestrator::lifecycle::startup;
use provider_orchestrator::observability::logging;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);

    let config = match load_from_env(config_path) {
        Ok(config) => config,
        Err(e) => {
            // Logging is not configured yet; report on stderr and exit.
            eprintln!("provider-orchestrator: {e}");
            std::process::exit(1);
        }
    };

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "provider-orchestrator starting");

    startup::run(config).await
}
