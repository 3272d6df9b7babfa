//! Configuration validation.
//!
//! Serde handles syntax; this pass checks semantics and returns every
//! problem it finds rather than stopping at the first one. A failure here
//! is fatal at startup.

use std::collections::HashSet;
use thiserror::Error;
use url::Url;

use crate::config::schema::OrchestratorConfig;
use crate::quota::usage::UNLISTED_PERSONA;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("provider #{0} has an empty id")]
    EmptyProviderId(usize),

    #[error("duplicate provider id '{0}'")]
    DuplicateProvider(String),

    #[error("provider '{0}' has no endpoint")]
    MissingEndpoint(String),

    #[error("provider '{id}' endpoint '{endpoint}' is not a valid http(s) URL")]
    InvalidEndpoint { id: String, endpoint: String },

    #[error("provider '{0}' has an empty api_key_env")]
    MissingCredentialRef(String),

    #[error("provider '{0}' timeout must be greater than zero")]
    ZeroTimeout(String),

    #[error("{what} share {value} is outside [0, 1]")]
    ShareOutOfRange { what: String, value: f64 },

    #[error("provider usage shares sum to {0:.3}, above 1.0")]
    ProviderShareSum(f64),

    #[error("persona ceilings sum to {0:.3}, above 1.0")]
    PersonaShareSum(f64),

    #[error("duplicate persona '{0}'")]
    DuplicatePersona(String),

    #[error("persona name '{0}' is reserved for unlisted personas")]
    ReservedPersona(String),

    #[error("provider '{id}' timeout ({timeout}s) must be below solve.hard_ceiling_secs ({ceiling}s)")]
    TimeoutAboveCeiling { id: String, timeout: u64, ceiling: u64 },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("max cooldown ({max}s) is below base cooldown ({base}s)")]
    CooldownOrder { base: u64, max: u64 },

    #[error("{what} {value} is outside {range}")]
    OutOfRange {
        what: &'static str,
        value: f64,
        range: &'static str,
    },
}

/// Small tolerance so that e.g. 0.1 + 0.2 + 0.7 is not rejected.
const SHARE_EPSILON: f64 = 1e-9;

/// Validate a parsed configuration.
pub fn validate_config(config: &OrchestratorConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let mut seen = HashSet::new();
    let mut provider_sum = 0.0;
    for (i, provider) in config.providers.iter().enumerate() {
        if provider.id.trim().is_empty() {
            errors.push(ValidationError::EmptyProviderId(i));
        } else if !seen.insert(provider.id.as_str()) {
            errors.push(ValidationError::DuplicateProvider(provider.id.clone()));
        }

        if provider.endpoint.trim().is_empty() {
            errors.push(ValidationError::MissingEndpoint(provider.id.clone()));
        } else if !is_http_url(&provider.endpoint) {
            errors.push(ValidationError::InvalidEndpoint {
                id: provider.id.clone(),
                endpoint: provider.endpoint.clone(),
            });
        }

        if provider.api_key_env.trim().is_empty() {
            errors.push(ValidationError::MissingCredentialRef(provider.id.clone()));
        }
        if provider.timeout_secs == 0 {
            errors.push(ValidationError::ZeroTimeout(provider.id.clone()));
        } else if provider.timeout_secs >= config.solve.hard_ceiling_secs {
            errors.push(ValidationError::TimeoutAboveCeiling {
                id: provider.id.clone(),
                timeout: provider.timeout_secs,
                ceiling: config.solve.hard_ceiling_secs,
            });
        }
        check_share(&mut errors, format!("provider '{}'", provider.id), provider.max_usage_share);
        provider_sum += provider.max_usage_share;
    }
    if provider_sum > 1.0 + SHARE_EPSILON {
        errors.push(ValidationError::ProviderShareSum(provider_sum));
    }

    let mut personas = HashSet::new();
    let mut persona_sum = 0.0;
    for persona in &config.personas {
        if persona.name == UNLISTED_PERSONA {
            errors.push(ValidationError::ReservedPersona(persona.name.clone()));
        } else if !personas.insert(persona.name.as_str()) {
            errors.push(ValidationError::DuplicatePersona(persona.name.clone()));
        }
        check_share(&mut errors, format!("persona '{}'", persona.name), persona.max_ai_share);
        persona_sum += persona.max_ai_share;
    }
    if persona_sum > 1.0 + SHARE_EPSILON {
        errors.push(ValidationError::PersonaShareSum(persona_sum));
    }
    check_share(&mut errors, "default persona".to_string(), config.usage.default_share);

    if config.circuit.failure_threshold == 0 {
        errors.push(ValidationError::Zero("circuit.failure_threshold"));
    }
    if config.circuit.cooldown_secs == 0 {
        errors.push(ValidationError::Zero("circuit.cooldown_secs"));
    }
    if config.circuit.max_cooldown_secs < config.circuit.cooldown_secs {
        errors.push(ValidationError::CooldownOrder {
            base: config.circuit.cooldown_secs,
            max: config.circuit.max_cooldown_secs,
        });
    }

    if config.usage.window_secs == 0 {
        errors.push(ValidationError::Zero("usage.window_secs"));
    }
    if config.usage.buckets == 0 {
        errors.push(ValidationError::Zero("usage.buckets"));
    }

    let threshold = config.knowledge.confidence_threshold;
    if !(0.0..=1.0).contains(&threshold) {
        errors.push(ValidationError::OutOfRange {
            what: "knowledge.confidence_threshold",
            value: threshold,
            range: "[0, 1]",
        });
    }

    let alpha = config.learning.trust_alpha;
    if !(alpha > 0.0 && alpha <= 1.0) {
        errors.push(ValidationError::OutOfRange {
            what: "learning.trust_alpha",
            value: alpha,
            range: "(0, 1]",
        });
    }
    let initial = config.learning.initial_trust;
    if !(0.0..=1.0).contains(&initial) {
        errors.push(ValidationError::OutOfRange {
            what: "learning.initial_trust",
            value: initial,
            range: "[0, 1]",
        });
    }
    if config.learning.max_records == 0 {
        errors.push(ValidationError::Zero("learning.max_records"));
    }

    if config.solve.hard_ceiling_secs == 0 {
        errors.push(ValidationError::Zero("solve.hard_ceiling_secs"));
    }
    if config.health_check.enabled && config.health_check.interval_secs == 0 {
        errors.push(ValidationError::Zero("health_check.interval_secs"));
    }
    if config.web_search.enabled && !is_http_url(&config.web_search.endpoint) {
        errors.push(ValidationError::InvalidEndpoint {
            id: "web_search".to_string(),
            endpoint: config.web_search.endpoint.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_share(errors: &mut Vec<ValidationError>, what: String, value: f64) {
    if !(0.0..=1.0).contains(&value) {
        errors.push(ValidationError::ShareOutOfRange { what, value });
    }
}

fn is_http_url(raw: &str) -> bool {
    Url::parse(raw)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host().is_some())
        .unwrap_or(false)
}
