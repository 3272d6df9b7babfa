//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! orchestrator. All types derive Serde traits for deserialization from
//! config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the orchestrator.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// AI provider definitions.
    pub providers: Vec<ProviderConfig>,

    /// Caller roles and their AI usage ceilings.
    pub personas: Vec<PersonaConfig>,

    /// Circuit breaker thresholds and cooldowns.
    pub circuit: CircuitConfig,

    /// Rolling usage window settings.
    pub usage: UsageConfig,

    /// Fallback chain settings.
    pub fallback: FallbackConfig,

    /// Local knowledge base.
    pub knowledge: KnowledgeConfig,

    /// Web search source.
    pub web_search: WebSearchConfig,

    /// Outcome recording and trust weighting.
    pub learning: LearningConfig,

    /// Per-call limits for `Solve`.
    pub solve: SolveConfig,

    /// Background circuit sweep.
    pub health_check: HealthCheckConfig,

    /// HTTP surface.
    pub server: ServerConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Wire dialect spoken by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiKind {
    /// OpenAI-compatible chat completions (OpenAI, DeepSeek, Grok).
    OpenAi,
    /// Anthropic messages API.
    Anthropic,
    /// Google Gemini generateContent.
    Gemini,
}

/// AI provider configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    /// Unique provider identifier (e.g. "openai").
    pub id: String,

    /// Human readable name.
    #[serde(default)]
    pub display_name: String,

    /// Full request URL.
    pub endpoint: String,

    /// Wire dialect.
    pub api_kind: ApiKind,

    /// Model name sent in the request.
    #[serde(default)]
    pub model: String,

    /// Environment variable holding the API key.
    pub api_key_env: String,

    /// Request timeout in seconds.
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,

    /// Maximum share (0-1) of calls in the window this provider may take.
    pub max_usage_share: f64,

    /// Priority rank (lower is tried first).
    #[serde(default = "default_priority")]
    pub priority: u32,

    /// Completion token limit.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_provider_timeout() -> u64 {
    20
}

fn default_priority() -> u32 {
    100
}

fn default_max_tokens() -> u32 {
    2000
}

fn default_temperature() -> f32 {
    0.3
}

/// Caller role configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PersonaConfig {
    /// Persona name (e.g. "security").
    pub name: String,

    /// Maximum share (0-1) of all calls in the window that may reach AI providers.
    pub max_ai_share: f64,

    /// Optional system prompt sent to providers.
    #[serde(default)]
    pub system_prompt: Option<String>,
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitConfig {
    /// Consecutive transient failures before opening.
    pub failure_threshold: u32,

    /// Initial open cooldown in seconds.
    pub cooldown_secs: u64,

    /// Upper bound for the doubled cooldown in seconds.
    pub max_cooldown_secs: u64,
}

impl CircuitConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn max_cooldown(&self) -> Duration {
        Duration::from_secs(self.max_cooldown_secs)
    }
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_secs: 300,
            max_cooldown_secs: 3600,
        }
    }
}

/// Usage governor configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UsageConfig {
    /// Rolling window length in seconds.
    pub window_secs: u64,

    /// Number of time buckets in the window.
    pub buckets: u32,

    /// Ceiling applied to personas not listed in `personas`.
    pub default_share: f64,
}

impl UsageConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn bucket_width(&self) -> Duration {
        self.window() / self.buckets.max(1)
    }
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self {
            window_secs: 3600,
            buckets: 60,
            default_share: 0.05,
        }
    }
}

/// Fallback chain configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FallbackConfig {
    /// Response returned when every other source fails.
    pub static_response: String,

    /// Confidence reported with the static response.
    pub static_confidence: f64,

    /// Only route complex problems to AI providers.
    pub complexity_gate: bool,

    /// Phrases marking a problem as simple.
    pub simple_patterns: Vec<String>,

    /// Phrases marking a problem as moderate.
    pub moderate_patterns: Vec<String>,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        let simple = [
            "create user", "login", "logout", "basic crud", "simple query",
            "add record", "delete record", "update record", "get data",
            "basic authentication", "simple validation", "basic error handling",
        ];
        let moderate = [
            "complex query", "performance optimization", "security implementation",
            "database indexing", "caching strategy", "rate limiting",
            "input validation", "error handling", "logging implementation",
            "api documentation", "testing implementation",
        ];
        Self {
            static_response: "No automated solution is available right now. \
                The problem has been queued for manual review."
                .to_string(),
            static_confidence: 0.1,
            complexity_gate: true,
            simple_patterns: simple.iter().map(|s| s.to_string()).collect(),
            moderate_patterns: moderate.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// A single knowledge base entry.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KnowledgeEntry {
    #[serde(default)]
    pub category: String,
    pub topic: String,
    pub content: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// Knowledge base configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct KnowledgeConfig {
    /// Optional TOML or JSON corpus file.
    pub path: Option<String>,

    /// Minimum relevance for a confident match.
    pub confidence_threshold: f64,

    /// Inline entries (merged with the file).
    pub entries: Vec<KnowledgeEntry>,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            path: None,
            confidence_threshold: 0.7,
            entries: Vec::new(),
        }
    }
}

/// Web search configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WebSearchConfig {
    /// Enable the web search source.
    pub enabled: bool,

    /// Search endpoint URL.
    pub endpoint: String,

    /// Environment variable holding the API key (optional).
    pub api_key_env: Option<String>,

    /// Request timeout in seconds.
    pub timeout_secs: u64,

    /// Maximum number of results requested.
    pub max_results: u32,
}

impl WebSearchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: "http://localhost:8888/search".to_string(),
            api_key_env: None,
            timeout_secs: 5,
            max_results: 3,
        }
    }
}

/// Outcome recorder and trust weighting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LearningConfig {
    /// Maximum number of attempt records retained.
    pub max_records: usize,

    /// Maximum age of retained records in seconds.
    pub max_age_secs: u64,

    /// Window reported by `Status()` in seconds.
    pub success_window_secs: u64,

    /// EMA smoothing factor for trust weights.
    pub trust_alpha: f64,

    /// Trust weight of a provider with no history.
    pub initial_trust: f64,
}

impl LearningConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    pub fn success_window(&self) -> Duration {
        Duration::from_secs(self.success_window_secs)
    }
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            max_records: 1000,
            max_age_secs: 86_400,
            success_window_secs: 86_400,
            trust_alpha: 0.2,
            initial_trust: 0.5,
        }
    }
}

/// Limits applied to each `Solve` call.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SolveConfig {
    /// Hard ceiling for a whole `Solve` call in seconds.
    pub hard_ceiling_secs: u64,
}

impl SolveConfig {
    pub fn hard_ceiling(&self) -> Duration {
        Duration::from_secs(self.hard_ceiling_secs)
    }
}

impl Default for SolveConfig {
    fn default() -> Self {
        Self { hard_ceiling_secs: 30 }
    }
}

/// Background circuit sweep configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable the sweep loop.
    pub enabled: bool,

    /// Sweep interval in seconds.
    pub interval_secs: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 60,
        }
    }
}

/// HTTP surface configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// API key for `/admin` routes (Bearer token).
    pub admin_api_key: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            // WARNING: This is a placeholder! Change this in production.
            admin_api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// "pretty" or "json".
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
