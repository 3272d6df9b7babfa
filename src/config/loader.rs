//! Configuration loading from disk and environment.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::schema::OrchestratorConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "ORCHESTRATOR_CONFIG";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),

    #[error("Invalid provider '{id}': {reason}")]
    Provider { id: String, reason: String },
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<OrchestratorConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut config = parse_config(&content)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Parse configuration text without validating it.
pub fn parse_config(content: &str) -> Result<OrchestratorConfig, ConfigError> {
    toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
}

/// Resolve the config path from an explicit argument or `ORCHESTRATOR_CONFIG`,
/// falling back to defaults when neither is set.
pub fn load_from_env(explicit: Option<PathBuf>) -> Result<OrchestratorConfig, ConfigError> {
    let path = explicit.or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from));
    match path {
        Some(path) => {
            tracing::info!(path = %path.display(), "Loading configuration file");
            load_config(&path)
        }
        None => {
            tracing::warn!("No configuration file given, using defaults");
            let mut config = OrchestratorConfig::default();
            apply_env_overrides(&mut config, |key| std::env::var(key).ok());
            validate_config(&config).map_err(ConfigError::Validation)?;
            Ok(config)
        }
    }
}

/// Apply `ORCHESTRATOR_*` environment overrides.
pub fn apply_env_overrides<F>(config: &mut OrchestratorConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(level) = lookup("ORCHESTRATOR_LOG_LEVEL") {
        config.observability.log_level = level;
    }
    if let Some(bind) = lookup("ORCHESTRATOR_BIND") {
        config.server.bind_address = bind;
    }
    if let Some(key) = lookup("ORCHESTRATOR_ADMIN_API_KEY") {
        config.server.admin_api_key = key;
    }
}
