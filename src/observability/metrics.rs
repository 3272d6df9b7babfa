//! Metrics collection and exposition.
//!
//! # Metrics
//! - `orchestrator_solve_total` (counter): Solve calls by answering source
//! - `orchestrator_attempts_total` (counter): attempts by source, outcome
//! - `orchestrator_attempt_duration_seconds` (histogram): attempt latency
//! - `orchestrator_circuit_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `orchestrator_circuit_transitions_total` (counter): by provider, target state
//! - `orchestrator_quota_denied_total` (counter): by persona, provider
//! - `orchestrator_trust_weight` (gauge): current provider trust
//!
//! Without an installed recorder every call here is a no-op.

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resilience::CircuitState;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_solve(source: &str) {
    counter!("orchestrator_solve_total", "source" => source.to_string()).increment(1);
}

pub fn record_attempt(source: &str, outcome: &str, latency: Duration) {
    counter!(
        "orchestrator_attempts_total",
        "source" => source.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
    histogram!("orchestrator_attempt_duration_seconds", "source" => source.to_string())
        .record(latency.as_secs_f64());
}

pub fn set_circuit_state(provider: &str, state: CircuitState) {
    gauge!("orchestrator_circuit_state", "provider" => provider.to_string()).set(state.as_gauge());
}

pub fn record_circuit_transition(provider: &str, to: CircuitState) {
    counter!(
        "orchestrator_circuit_transitions_total",
        "provider" => provider.to_string(),
        "to" => to.as_str()
    )
    .increment(1);
    set_circuit_state(provider, to);
}

pub fn record_quota_denied(persona: &str, provider: &str) {
    counter!(
        "orchestrator_quota_denied_total",
        "persona" => persona.to_string(),
        "provider" => provider.to_string()
    )
    .increment(1);
}

pub fn set_trust_weight(provider: &str, weight: f64) {
    gauge!("orchestrator_trust_weight", "provider" => provider.to_string()).set(weight);
}
