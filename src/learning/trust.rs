//! Provider trust weights.
//!
//! An exponential moving average of provider outcomes (success = 1,
//! transient failure = 0). Used only to order providers that share a
//! priority rank.

use dashmap::DashMap;

use crate::config::LearningConfig;
use crate::observability::metrics;

#[derive(Debug)]
pub struct TrustTable {
    alpha: f64,
    initial: f64,
    weights: DashMap<String, f64>,
}

impl TrustTable {
    pub fn new(alpha: f64, initial: f64) -> Self {
        Self {
            alpha: alpha.clamp(f64::EPSILON, 1.0),
            initial: initial.clamp(0.0, 1.0),
            weights: DashMap::new(),
        }
    }

    pub fn from_config(config: &LearningConfig) -> Self {
        Self::new(config.trust_alpha, config.initial_trust)
    }

    /// Current weight; providers with no history get the initial weight.
    pub fn weight(&self, provider: &str) -> f64 {
        self.weights.get(provider).map_or(self.initial, |w| *w)
    }

    /// Fold one outcome into the average and return the new weight.
    pub fn observe(&self, provider: &str, success: bool) -> f64 {
        let sample = if success { 1.0 } else { 0.0 };
        let mut entry = self
            .weights
            .entry(provider.to_string())
            .or_insert(self.initial);
        *entry = self.alpha * sample + (1.0 - self.alpha) * *entry;
        let weight = *entry;
        drop(entry);

        metrics::set_trust_weight(provider, weight);
        weight
    }
}
