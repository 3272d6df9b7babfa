//! Fallback chain resolution.
//!
//! Order is fixed: knowledge base, web search, eligible AI providers, static
//! response. Resolving is a pure read of circuit and quota state; the
//! reservation and circuit permit are taken later, at attempt time.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use serde::{Serialize, Serializer};
use tokio::time::Instant;

use crate::fallback::complexity::{ComplexityClassifier, ComplexityLevel};
use crate::learning::TrustTable;
use crate::providers::{ProviderDescriptor, ProviderRegistry};
use crate::quota::UsageGovernor;
use crate::resilience::CircuitSet;

/// A resolution source, as tried by `Solve` and recorded afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Source {
    KnowledgeBase,
    WebSearch,
    Provider(String),
    Static,
}

impl Source {
    pub fn is_provider(&self) -> bool {
        matches!(self, Source::Provider(_))
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::KnowledgeBase => f.write_str("knowledge-base"),
            Source::WebSearch => f.write_str("web-search"),
            Source::Provider(id) => f.write_str(id),
            Source::Static => f.write_str("static"),
        }
    }
}

impl Serialize for Source {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Builds the ordered candidate list for a problem.
#[derive(Debug)]
pub struct FallbackChain {
    registry: Arc<ProviderRegistry>,
    circuits: Arc<CircuitSet>,
    usage: Arc<UsageGovernor>,
    trust: Arc<TrustTable>,
    classifier: ComplexityClassifier,
    complexity_gate: bool,
    web_search: bool,
}

impl FallbackChain {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        circuits: Arc<CircuitSet>,
        usage: Arc<UsageGovernor>,
        trust: Arc<TrustTable>,
        classifier: ComplexityClassifier,
    ) -> Self {
        Self {
            registry,
            circuits,
            usage,
            trust,
            classifier,
            complexity_gate: true,
            web_search: false,
        }
    }

    pub fn with_complexity_gate(mut self, enabled: bool) -> Self {
        self.complexity_gate = enabled;
        self
    }

    pub fn with_web_search(mut self, enabled: bool) -> Self {
        self.web_search = enabled;
        self
    }

    /// Ordered candidates for `problem` on behalf of `persona`, once the
    /// current call has been counted.
    ///
    /// Never empty: [`Source::Static`] is always last.
    pub fn resolve(&self, problem: &str, persona: &str, now: Instant) -> Vec<Source> {
        self.resolve_pending(problem, persona, now, 0)
    }

    /// Candidates the next call would get, counting it as if already recorded.
    pub fn preview(&self, problem: &str, persona: &str, now: Instant) -> Vec<Source> {
        self.resolve_pending(problem, persona, now, 1)
    }

    fn resolve_pending(&self, problem: &str, persona: &str, now: Instant, pending: u64) -> Vec<Source> {
        let mut candidates = vec![Source::KnowledgeBase];
        if self.web_search {
            candidates.push(Source::WebSearch);
        }

        let level = self.classifier.classify(problem);
        if !self.complexity_gate || level == ComplexityLevel::Complex {
            candidates.extend(
                self.eligible_providers(persona, now, pending)
                    .into_iter()
                    .map(|p| Source::Provider(p.id.clone())),
            );
        }

        candidates.push(Source::Static);
        tracing::debug!(
            persona,
            complexity = ?level,
            candidates = ?candidates,
            "Fallback chain resolved"
        );
        candidates
    }

    /// Providers whose circuit admits a call and whose quota has headroom,
    /// by priority rank, then trust weight, then id.
    pub fn eligible_providers(&self, persona: &str, now: Instant, pending: u64) -> Vec<&ProviderDescriptor> {
        let mut eligible: Vec<(&ProviderDescriptor, f64)> = self
            .registry
            .list()
            .iter()
            .filter(|p| {
                self.circuits
                    .get(&p.id)
                    .is_some_and(|breaker| breaker.is_eligible(now))
            })
            .filter(|p| self.usage.has_headroom_with(persona, &p.id, now, pending))
            .map(|p| (p, self.trust.weight(&p.id)))
            .collect();

        eligible.sort_by(|(a, ta), (b, tb)| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| tb.partial_cmp(ta).unwrap_or(Ordering::Equal))
                .then_with(|| a.id.cmp(&b.id))
        });
        eligible.into_iter().map(|(p, _)| p).collect()
    }
}
