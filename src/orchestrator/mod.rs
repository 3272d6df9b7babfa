//! Top-level orchestrator.
//!
//! # Data Flow
//! ```text
//! Solve(problem, persona)
//!     → usage.record_call
//!     → chain.resolve (ordered candidates)
//!     → for each candidate: circuit permit + quota reservation → bounded call
//!     → every attempt → OutcomeRecorder
//!     → first success, else static response
//!
//! Status()
//!     → circuits + usage + recorder snapshots
//! ```
//!
//! # Design Decisions
//! - The only shared mutable state is per-provider circuits, per-persona
//!   usage, and the recorder log; each has its own lock
//! - Provider clients and web search sit behind traits so tests can swap
//!   them without a network

mod solve;
mod status;

pub use solve::{ResultEnvelope, SolveOptions};
pub use status::{ProviderStatus, StatusReport};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::validation::{validate_config, ValidationError};
use crate::config::{ConfigError, HealthCheckConfig, OrchestratorConfig};
use crate::fallback::{
    ComplexityClassifier, FallbackChain, HttpWebSearch, KnowledgeBase, Source, WebSearch,
};
use crate::health::CircuitSweeper;
use crate::learning::{OutcomeRecorder, TrustTable};
use crate::providers::{HttpProviderClient, ProviderClient, ProviderDescriptor, ProviderRegistry};
use crate::quota::UsageGovernor;
use crate::resilience::{CircuitPolicy, CircuitSet};

/// Confidence reported for an AI provider answer.
const PROVIDER_CONFIDENCE: f64 = 0.9;
/// Confidence reported for a web search answer.
const WEB_SEARCH_CONFIDENCE: f64 = 0.8;

pub struct Orchestrator {
    registry: Arc<ProviderRegistry>,
    clients: HashMap<String, Arc<dyn ProviderClient>>,
    circuits: Arc<CircuitSet>,
    usage: Arc<UsageGovernor>,
    trust: Arc<TrustTable>,
    recorder: Arc<OutcomeRecorder>,
    chain: FallbackChain,
    knowledge: KnowledgeBase,
    web_search: Option<Arc<dyn WebSearch>>,
    system_prompts: HashMap<String, String>,
    static_response: String,
    static_confidence: f64,
    hard_ceiling: Duration,
    success_window: Duration,
    health_check: HealthCheckConfig,
}

impl Orchestrator {
    pub fn builder(config: OrchestratorConfig) -> OrchestratorBuilder {
        OrchestratorBuilder::new(config)
    }

    /// Wire everything from configuration, reading secrets from the process
    /// environment.
    pub fn from_config(config: OrchestratorConfig) -> Result<Self, ConfigError> {
        Self::from_config_with(config, |key| std::env::var(key).ok())
    }

    /// Like [`Orchestrator::from_config`] with an explicit secret lookup.
    pub fn from_config_with<F>(config: OrchestratorConfig, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        validate_config(&config).map_err(ConfigError::Validation)?;

        let (registry, mut secrets) = ProviderRegistry::from_config(&config.providers, &lookup)?;
        let knowledge = KnowledgeBase::from_config(&config.knowledge)?;
        let mut builder = OrchestratorBuilder::new(config.clone()).knowledge_base(knowledge);

        for descriptor in registry.list() {
            let api_key = secrets.remove(&descriptor.id).unwrap_or_default();
            let client = HttpProviderClient::new(descriptor.clone(), api_key).map_err(|e| {
                ConfigError::Provider {
                    id: descriptor.id.clone(),
                    reason: e.to_string(),
                }
            })?;
            builder = builder.provider(descriptor.clone(), Arc::new(client));
        }

        if config.web_search.enabled {
            let search = HttpWebSearch::from_config(&config.web_search, &lookup)?;
            builder = builder.web_search(Arc::new(search));
        }

        builder.build()
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn circuits(&self) -> &Arc<CircuitSet> {
        &self.circuits
    }

    pub fn usage(&self) -> &Arc<UsageGovernor> {
        &self.usage
    }

    pub fn recorder(&self) -> &Arc<OutcomeRecorder> {
        &self.recorder
    }

    /// Ordered candidates a `Solve` issued now would try. Pure read.
    pub fn resolve(&self, problem: &str, persona: &str) -> Vec<Source> {
        self.chain.preview(problem, persona, Instant::now())
    }

    /// Move elapsed Open circuits to Half-Open now.
    pub fn sweep_circuits(&self) -> Vec<String> {
        self.sweeper().sweep_once(Instant::now())
    }

    fn sweeper(&self) -> CircuitSweeper {
        CircuitSweeper::new(
            Arc::clone(&self.circuits),
            Arc::clone(&self.trust),
            self.health_check.clone(),
        )
    }

    /// Start the background health loop; it exits on `shutdown`.
    pub fn spawn_health_loop(&self, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(self.sweeper().run(shutdown))
    }

    fn system_prompt(&self, persona: &str) -> Option<String> {
        self.system_prompts.get(persona).cloned()
    }
}

/// Assembles an [`Orchestrator`] from config plus explicit clients.
pub struct OrchestratorBuilder {
    config: OrchestratorConfig,
    providers: Vec<(ProviderDescriptor, Arc<dyn ProviderClient>)>,
    web_search: Option<Arc<dyn WebSearch>>,
    knowledge: Option<KnowledgeBase>,
    epoch: Option<Instant>,
}

impl OrchestratorBuilder {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            config,
            providers: Vec::new(),
            web_search: None,
            knowledge: None,
            epoch: None,
        }
    }

    pub fn provider(mut self, descriptor: ProviderDescriptor, client: Arc<dyn ProviderClient>) -> Self {
        self.providers.push((descriptor, client));
        self
    }

    pub fn web_search(mut self, search: Arc<dyn WebSearch>) -> Self {
        self.web_search = Some(search);
        self
    }

    pub fn knowledge_base(mut self, knowledge: KnowledgeBase) -> Self {
        self.knowledge = Some(knowledge);
        self
    }

    /// Align usage buckets to a fixed instant instead of build time.
    pub fn epoch(mut self, epoch: Instant) -> Self {
        self.epoch = Some(epoch);
        self
    }

    pub fn build(self) -> Result<Orchestrator, ConfigError> {
        let config = self.config;

        let mut errors = Vec::new();
        let mut seen = std::collections::HashSet::new();
        let mut share_sum = 0.0;
        let ceiling = config.solve.hard_ceiling();
        for (descriptor, _) in &self.providers {
            if !seen.insert(descriptor.id.as_str()) {
                errors.push(ValidationError::DuplicateProvider(descriptor.id.clone()));
            }
            if descriptor.timeout >= ceiling {
                errors.push(ValidationError::TimeoutAboveCeiling {
                    id: descriptor.id.clone(),
                    timeout: descriptor.timeout.as_secs(),
                    ceiling: config.solve.hard_ceiling_secs,
                });
            }
            share_sum += descriptor.max_usage_share;
        }
        if share_sum > 1.0 + 1e-9 {
            errors.push(ValidationError::ProviderShareSum(share_sum));
        }
        if !errors.is_empty() {
            return Err(ConfigError::Validation(errors));
        }

        let mut descriptors = Vec::with_capacity(self.providers.len());
        let mut clients = HashMap::with_capacity(self.providers.len());
        for (descriptor, client) in self.providers {
            clients.insert(descriptor.id.clone(), client);
            descriptors.push(descriptor);
        }
        let registry = Arc::new(ProviderRegistry::new(descriptors));

        let policy = CircuitPolicy::from(&config.circuit);
        let circuits = Arc::new(CircuitSet::new(
            registry.list().iter().map(|p| p.id.clone()),
            &policy,
        ));

        let epoch = self.epoch.unwrap_or_else(Instant::now);
        let usage = Arc::new(UsageGovernor::from_config(
            &config,
            registry
                .list()
                .iter()
                .map(|p| (p.id.as_str(), p.max_usage_share)),
            epoch,
        ));

        let trust = Arc::new(TrustTable::from_config(&config.learning));
        let recorder = Arc::new(OutcomeRecorder::from_config(&config.learning, Arc::clone(&trust)));

        let web_search = self.web_search;

        let chain = FallbackChain::new(
            Arc::clone(&registry),
            Arc::clone(&circuits),
            Arc::clone(&usage),
            Arc::clone(&trust),
            ComplexityClassifier::from_config(&config.fallback),
        )
        .with_complexity_gate(config.fallback.complexity_gate)
        .with_web_search(web_search.is_some());

        let knowledge = match self.knowledge {
            Some(knowledge) => knowledge,
            None => KnowledgeBase::new(
                config.knowledge.entries.clone(),
                config.knowledge.confidence_threshold,
            ),
        };

        let system_prompts = config
            .personas
            .iter()
            .filter_map(|p| p.system_prompt.clone().map(|s| (p.name.clone(), s)))
            .collect();

        tracing::info!(
            providers = registry.len(),
            personas = config.personas.len(),
            knowledge_entries = knowledge.len(),
            web_search = web_search.is_some(),
            "Orchestrator ready"
        );

        Ok(Orchestrator {
            registry,
            clients,
            circuits,
            usage,
            trust,
            recorder,
            chain,
            knowledge,
            web_search,
            system_prompts,
            static_response: config.fallback.static_response.clone(),
            static_confidence: config.fallback.static_confidence,
            hard_ceiling: config.solve.hard_ceiling(),
            success_window: config.learning.success_window(),
            health_check: config.health_check.clone(),
        })
    }
}
