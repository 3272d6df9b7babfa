//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML) + ORCHESTRATOR_* env overrides
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks, all errors collected)
//!     → OrchestratorConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the provider set never changes at runtime
//! - All fields have defaults to allow minimal configs
//! - Any validation failure is fatal at startup

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_from_env, ConfigError};
pub use schema::{
    ApiKind, CircuitConfig, FallbackConfig, HealthCheckConfig, KnowledgeConfig, KnowledgeEntry,
    LearningConfig, ObservabilityConfig, OrchestratorConfig, PersonaConfig, ProviderConfig,
    ServerConfig, SolveConfig, UsageConfig, WebSearchConfig,
};
