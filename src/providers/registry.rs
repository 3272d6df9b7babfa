//! Provider registry.
//!
//! Immutable after startup. Descriptors are built from validated config;
//! a provider whose credential variable is unset is left out with a warning
//! rather than failing the process.

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use url::Url;

use crate::config::{ApiKind, ConfigError, ProviderConfig};

/// Static description of one AI provider.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderDescriptor {
    pub id: String,
    pub display_name: String,
    pub endpoint: Url,
    pub api_kind: ApiKind,
    pub model: String,
    /// Name of the environment variable holding the secret. The secret itself
    /// never lives here.
    pub credential_env: String,
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
    pub max_usage_share: f64,
    pub priority: u32,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl ProviderDescriptor {
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ConfigError> {
        let endpoint = Url::parse(&config.endpoint).map_err(|e| ConfigError::Provider {
            id: config.id.clone(),
            reason: format!("invalid endpoint: {e}"),
        })?;
        let display_name = if config.display_name.is_empty() {
            config.id.clone()
        } else {
            config.display_name.clone()
        };

        Ok(Self {
            id: config.id.clone(),
            display_name,
            endpoint,
            api_kind: config.api_kind,
            model: config.model.clone(),
            credential_env: config.api_key_env.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            max_usage_share: config.max_usage_share,
            priority: config.priority,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }
}

/// Read-only set of providers, in configuration order.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<ProviderDescriptor>,
    index: HashMap<String, usize>,
}

impl ProviderRegistry {
    pub fn new(providers: Vec<ProviderDescriptor>) -> Self {
        let index = providers
            .iter()
            .enumerate()
            .map(|(i, p)| (p.id.clone(), i))
            .collect();
        Self { providers, index }
    }

    /// Build from config, keeping only providers whose credential resolves.
    ///
    /// Returns the registry along with the resolved secrets keyed by id.
    pub fn from_config<F>(
        configs: &[ProviderConfig],
        lookup: F,
    ) -> Result<(Self, HashMap<String, String>), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut providers = Vec::with_capacity(configs.len());
        let mut secrets = HashMap::new();
        for config in configs {
            let descriptor = ProviderDescriptor::from_config(config)?;
            match lookup(&descriptor.credential_env).filter(|v| !v.trim().is_empty()) {
                Some(secret) => {
                    secrets.insert(descriptor.id.clone(), secret.trim().to_string());
                    providers.push(descriptor);
                }
                None => tracing::warn!(
                    provider = %descriptor.id,
                    env = %descriptor.credential_env,
                    "Provider credential not set, provider disabled"
                ),
            }
        }
        Ok((Self::new(providers), secrets))
    }

    pub fn list(&self) -> &[ProviderDescriptor] {
        &self.providers
    }

    pub fn get(&self, id: &str) -> Option<&ProviderDescriptor> {
        self.index.get(id).map(|&i| &self.providers[i])
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
