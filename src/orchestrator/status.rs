//! `Status`: point-in-time view of circuits, usage and success rate.

use serde::Serialize;
use tokio::time::Instant;

use crate::clock;
use crate::learning::SuccessRateSnapshot;
use crate::orchestrator::Orchestrator;
use crate::quota::UsageStatus;
use crate::resilience::CircuitState;

#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatus {
    pub id: String,
    pub display_name: String,
    pub circuit_state: CircuitState,
    pub consecutive_failures: u32,
    /// Unix milliseconds; present while Open.
    pub open_until_ms: Option<u64>,
    pub trust_weight: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub providers: Vec<ProviderStatus>,
    pub usage: Vec<UsageStatus>,
    pub success_rate: SuccessRateSnapshot,
    pub generated_at_ms: u64,
}

impl Orchestrator {
    pub fn status(&self) -> StatusReport {
        let now = Instant::now();
        let providers = self
            .registry
            .list()
            .iter()
            .filter_map(|descriptor| {
                let snapshot = self.circuits.get(&descriptor.id)?.snapshot();
                let open_until_ms = match snapshot.state {
                    CircuitState::Open => snapshot.open_until.map(|at| clock::unix_millis_at(at, now)),
                    _ => None,
                };
                Some(ProviderStatus {
                    id: descriptor.id.clone(),
                    display_name: descriptor.display_name.clone(),
                    circuit_state: snapshot.state,
                    consecutive_failures: snapshot.consecutive_failures,
                    open_until_ms,
                    trust_weight: self.trust.weight(&descriptor.id),
                })
            })
            .collect();

        StatusReport {
            providers,
            usage: self.usage.usage(now),
            success_rate: self.recorder.success_rate(self.success_window, now),
            generated_at_ms: clock::unix_millis(),
        }
    }
}
