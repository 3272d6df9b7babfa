//! Background circuit sweep.
//!
//! # Responsibilities
//! - Periodically flip Open circuits whose cooldown elapsed to Half-Open
//! - Refresh circuit state and trust gauges

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::config::HealthCheckConfig;
use crate::learning::TrustTable;
use crate::observability::metrics;
use crate::resilience::CircuitSet;

pub struct CircuitSweeper {
    circuits: Arc<CircuitSet>,
    trust: Arc<TrustTable>,
    config: HealthCheckConfig,
}

impl CircuitSweeper {
    pub fn new(circuits: Arc<CircuitSet>, trust: Arc<TrustTable>, config: HealthCheckConfig) -> Self {
        Self {
            circuits,
            trust,
            config,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Circuit sweep disabled");
            return;
        }

        tracing::info!(interval = self.config.interval_secs, "Circuit sweeper starting");

        let interval = Duration::from_secs(self.config.interval_secs.max(1));
        let mut ticker = time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep_once(Instant::now());
                }
                _ = shutdown.recv() => {
                    tracing::info!("Circuit sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// One pass; returns the providers moved to Half-Open.
    pub fn sweep_once(&self, now: Instant) -> Vec<String> {
        let flipped = self.circuits.sweep_all(now);
        if !flipped.is_empty() {
            tracing::info!(providers = ?flipped, "Cooldown elapsed, circuits half-open");
        }

        for breaker in self.circuits.iter() {
            let id = breaker.provider_id();
            metrics::set_circuit_state(id, breaker.state());
            metrics::set_trust_weight(id, self.trust.weight(id));
        }
        flipped
    }
}
