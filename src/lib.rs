//! AI provider orchestration and resilience layer.

pub mod admin;
pub mod clock;
pub mod config;
pub mod error;
pub mod fallback;
pub mod health;
pub mod http;
pub mod learning;
pub mod lifecycle;
pub mod observability;
pub mod orchestrator;
pub mod providers;
pub mod quota;
pub mod resilience;

pub use config::OrchestratorConfig;
pub use error::{ErrorClass, ProviderError, SolveError};
pub use fallback::Source;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use orchestrator::{Orchestrator, ResultEnvelope, SolveOptions, StatusReport};
