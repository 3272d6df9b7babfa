//! Circuit breaker for provider protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: provider assumed down, requests fail fast without a network call
//! - Half-Open: a single probe decides whether the provider recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive transient failures >= threshold
//! Open → Half-Open: now >= open_until (on acquire or background sweep)
//! Half-Open → Closed: probe succeeds (failure count reset to 0 first)
//! Half-Open → Open: probe fails, cooldown doubled up to max_cooldown
//! ```
//!
//! # Design Decisions
//! - One breaker per provider, each behind its own mutex
//! - Only `Transient` failures count; 4xx and cancellations are neutral
//! - The half-open probe slot is a flag under the same mutex, so two
//!   concurrent callers can never both probe

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::config::CircuitConfig;
use crate::observability::metrics;
use crate::resilience::backoff::cooldown_for;

/// Circuit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }

    /// Gauge value: 0 closed, 1 half-open, 2 open.
    pub fn as_gauge(self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::HalfOpen => 1.0,
            CircuitState::Open => 2.0,
        }
    }
}

/// Thresholds shared by every breaker.
#[derive(Debug, Clone)]
pub struct CircuitPolicy {
    pub failure_threshold: u32,
    pub base_cooldown: Duration,
    pub max_cooldown: Duration,
}

impl From<&CircuitConfig> for CircuitPolicy {
    fn from(config: &CircuitConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            base_cooldown: config.cooldown(),
            max_cooldown: config.max_cooldown(),
        }
    }
}

#[derive(Debug)]
struct CircuitInner {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
    open_until: Option<Instant>,
    /// Consecutive openings without an intervening close.
    trips: u32,
    probe_in_flight: bool,
}

/// Why a call was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitRejection {
    Open { until: Instant },
    ProbeInFlight,
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub last_failure: Option<Instant>,
    pub open_until: Option<Instant>,
}

/// Per-provider circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    provider_id: String,
    policy: CircuitPolicy,
    inner: Mutex<CircuitInner>,
}

impl CircuitBreaker {
    pub fn new(provider_id: impl Into<String>, policy: CircuitPolicy) -> Self {
        Self {
            provider_id: provider_id.into(),
            policy,
            inner: Mutex::new(CircuitInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                last_failure: None,
                open_until: None,
                trips: 0,
                probe_in_flight: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CircuitInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let inner = self.lock();
        CircuitSnapshot {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            last_failure: inner.last_failure,
            open_until: inner.open_until,
        }
    }

    /// Whether a call at `now` would be admitted. Does not change state.
    pub fn is_eligible(&self, now: Instant) -> bool {
        let inner = self.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => inner.open_until.map_or(true, |until| now >= until),
            CircuitState::HalfOpen => !inner.probe_in_flight,
        }
    }

    /// Ask to call the provider.
    ///
    /// In Half-Open the returned permit is the single probe; it must be
    /// settled (or dropped) before anyone else is let through.
    pub fn try_acquire(self: &Arc<Self>, now: Instant) -> Result<CircuitPermit, CircuitRejection> {
        let mut inner = self.lock();
        let mut flipped = false;
        let probe = match inner.state {
            CircuitState::Closed => false,
            CircuitState::Open => {
                let until = inner.open_until.unwrap_or(now);
                if now < until {
                    return Err(CircuitRejection::Open { until });
                }
                inner.state = CircuitState::HalfOpen;
                inner.probe_in_flight = true;
                flipped = true;
                true
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    return Err(CircuitRejection::ProbeInFlight);
                }
                inner.probe_in_flight = true;
                true
            }
        };
        let failures = inner.consecutive_failures;
        drop(inner);

        if flipped {
            self.report(CircuitState::HalfOpen, failures, None);
        }

        Ok(CircuitPermit {
            breaker: Arc::clone(self),
            probe,
            settled: false,
        })
    }

    /// Move an Open circuit whose cooldown elapsed to Half-Open.
    ///
    /// Returns true when a transition happened.
    pub fn sweep(&self, now: Instant) -> bool {
        let mut inner = self.lock();
        let elapsed = inner.state == CircuitState::Open
            && inner.open_until.map_or(true, |until| now >= until);
        if !elapsed {
            return false;
        }
        inner.state = CircuitState::HalfOpen;
        inner.probe_in_flight = false;
        let failures = inner.consecutive_failures;
        drop(inner);

        self.report(CircuitState::HalfOpen, failures, None);
        true
    }

    fn on_success(&self, probe: bool) {
        let mut inner = self.lock();
        if probe {
            inner.probe_in_flight = false;
        }
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
            }
            CircuitState::HalfOpen if probe => {
                inner.consecutive_failures = 0;
                inner.trips = 0;
                inner.open_until = None;
                inner.state = CircuitState::Closed;
                drop(inner);
                self.report(CircuitState::Closed, 0, None);
            }
            // Late success from a call admitted before the circuit opened.
            _ => {}
        }
    }

    fn on_failure(&self, probe: bool, now: Instant) {
        let mut inner = self.lock();
        if probe {
            inner.probe_in_flight = false;
        }
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        inner.last_failure = Some(now);

        let reopen = match inner.state {
            CircuitState::Closed => inner.consecutive_failures >= self.policy.failure_threshold,
            CircuitState::HalfOpen => probe,
            CircuitState::Open => false,
        };
        if !reopen {
            return;
        }

        inner.trips = if inner.state == CircuitState::Closed { 1 } else { inner.trips + 1 };
        let cooldown = cooldown_for(inner.trips, self.policy.base_cooldown, self.policy.max_cooldown);
        inner.state = CircuitState::Open;
        inner.open_until = Some(now + cooldown);
        let failures = inner.consecutive_failures;
        drop(inner);

        self.report(CircuitState::Open, failures, Some(cooldown));
    }

    fn on_release(&self, probe: bool) {
        if probe {
            self.lock().probe_in_flight = false;
        }
    }

    fn report(&self, to: CircuitState, failures: u32, cooldown: Option<Duration>) {
        match to {
            CircuitState::Open => tracing::warn!(
                provider = %self.provider_id,
                consecutive_failures = failures,
                cooldown = ?cooldown,
                "Circuit opened"
            ),
            _ => tracing::info!(
                provider = %self.provider_id,
                state = to.as_str(),
                consecutive_failures = failures,
                "Circuit state changed"
            ),
        }
        metrics::record_circuit_transition(&self.provider_id, to);
    }
}

/// Admission ticket returned by [`CircuitBreaker::try_acquire`].
///
/// Dropping an unsettled permit is the same as [`CircuitPermit::release`].
#[derive(Debug)]
pub struct CircuitPermit {
    breaker: Arc<CircuitBreaker>,
    probe: bool,
    settled: bool,
}

impl CircuitPermit {
    /// Whether this permit is the half-open probe.
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn succeed(mut self) {
        self.settled = true;
        self.breaker.on_success(self.probe);
    }

    pub fn fail(self) {
        self.fail_at(Instant::now());
    }

    pub fn fail_at(mut self, now: Instant) {
        self.settled = true;
        self.breaker.on_failure(self.probe, now);
    }

    /// Settle without affecting the failure count (4xx, cancellation).
    pub fn release(mut self) {
        self.settled = true;
        self.breaker.on_release(self.probe);
    }
}

impl Drop for CircuitPermit {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.on_release(self.probe);
        }
    }
}

/// The fixed set of breakers, one per registered provider.
#[derive(Debug, Default)]
pub struct CircuitSet {
    breakers: HashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitSet {
    pub fn new<I, S>(provider_ids: I, policy: &CircuitPolicy) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let breakers = provider_ids
            .into_iter()
            .map(|id| {
                let id = id.into();
                let breaker = Arc::new(CircuitBreaker::new(id.clone(), policy.clone()));
                (id, breaker)
            })
            .collect();
        Self { breakers }
    }

    pub fn get(&self, provider_id: &str) -> Option<&Arc<CircuitBreaker>> {
        self.breakers.get(provider_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<CircuitBreaker>> {
        self.breakers.values()
    }

    /// Sweep every breaker; returns the ids that moved to Half-Open.
    pub fn sweep_all(&self, now: Instant) -> Vec<String> {
        let mut flipped: Vec<String> = self
            .breakers
            .values()
            .filter(|b| b.sweep(now))
            .map(|b| b.provider_id().to_string())
            .collect();
        flipped.sort();
        flipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> CircuitPolicy {
        CircuitPolicy {
            failure_threshold: 5,
            base_cooldown: Duration::from_secs(300),
            max_cooldown: Duration::from_secs(3600),
        }
    }

    fn breaker() -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::new("openai", policy()))
    }

    fn trip(cb: &Arc<CircuitBreaker>, now: Instant) {
        for _ in 0..5 {
            cb.try_acquire(now).unwrap().fail_at(now);
        }
    }

    #[test]
    fn test_opens_after_threshold() {
        let cb = breaker();
        let now = Instant::now();

        for i in 1..5 {
            cb.try_acquire(now).unwrap().fail_at(now);
            assert_eq!(cb.state(), CircuitState::Closed, "still closed after {i} failures");
        }
        cb.try_acquire(now).unwrap().fail_at(now);
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.consecutive_failures(), 5);

        let rejected = cb.try_acquire(now + Duration::from_secs(1)).unwrap_err();
        assert_eq!(
            rejected,
            CircuitRejection::Open { until: now + Duration::from_secs(300) }
        );
    }

    #[test]
    fn test_success_resets_count_while_closed() {
        let cb = breaker();
        let now = Instant::now();
        for _ in 0..4 {
            cb.try_acquire(now).unwrap().fail_at(now);
        }
        cb.try_acquire(now).unwrap().succeed();
        assert_eq!(cb.consecutive_failures(), 0);
        cb.try_acquire(now).unwrap().fail_at(now);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_admits_single_probe() {
        let cb = breaker();
        let now = Instant::now();
        trip(&cb, now);

        let later = now + Duration::from_secs(300);
        let probe = cb.try_acquire(later).unwrap();
        assert!(probe.is_probe());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert_eq!(cb.try_acquire(later).unwrap_err(), CircuitRejection::ProbeInFlight);
        assert!(!cb.is_eligible(later));

        drop(probe);
        // released probe slot, still half-open
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(cb.try_acquire(later).is_ok());
    }

    #[test]
    fn test_probe_success_closes_and_resets() {
        let cb = breaker();
        let now = Instant::now();
        trip(&cb, now);

        let later = now + Duration::from_secs(301);
        cb.try_acquire(later).unwrap().succeed();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.consecutive_failures(), 0);

        // a single failure must not reopen
        cb.try_acquire(later).unwrap().fail_at(later);
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.consecutive_failures(), 1);
    }

    #[test]
    fn test_probe_failure_doubles_cooldown() {
        let cb = breaker();
        let now = Instant::now();
        trip(&cb, now);

        let t1 = now + Duration::from_secs(300);
        cb.try_acquire(t1).unwrap().fail_at(t1);
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.snapshot().open_until, Some(t1 + Duration::from_secs(600)));

        let t2 = t1 + Duration::from_secs(600);
        cb.try_acquire(t2).unwrap().fail_at(t2);
        assert_eq!(cb.snapshot().open_until, Some(t2 + Duration::from_secs(1200)));
    }

    #[test]
    fn test_cooldown_capped_at_max() {
        let cb = breaker();
        let mut now = Instant::now();
        trip(&cb, now);
        for _ in 0..10 {
            now = cb.snapshot().open_until.unwrap();
            cb.try_acquire(now).unwrap().fail_at(now);
        }
        assert_eq!(cb.snapshot().open_until, Some(now + Duration::from_secs(3600)));
    }

    #[test]
    fn test_release_is_neutral() {
        let cb = breaker();
        let now = Instant::now();
        for _ in 0..4 {
            cb.try_acquire(now).unwrap().fail_at(now);
        }
        cb.try_acquire(now).unwrap().release();
        assert_eq!(cb.consecutive_failures(), 4);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_sweep_flips_elapsed_open() {
        let set = CircuitSet::new(["a", "b"], &policy());
        let now = Instant::now();
        trip(set.get("a").unwrap(), now);

        assert!(set.sweep_all(now + Duration::from_secs(10)).is_empty());
        assert_eq!(set.sweep_all(now + Duration::from_secs(300)), vec!["a".to_string()]);
        assert_eq!(set.get("a").unwrap().state(), CircuitState::HalfOpen);
        assert_eq!(set.get("b").unwrap().state(), CircuitState::Closed);
    }

    #[test]
    fn test_open_never_has_zero_failures() {
        let cb = breaker();
        let mut now = Instant::now();
        trip(&cb, now);
        for round in 0..4 {
            now = cb.snapshot().open_until.unwrap();
            let permit = cb.try_acquire(now).unwrap();
            if round % 2 == 0 {
                permit.fail_at(now);
            } else {
                drop(permit);
                cb.try_acquire(now).unwrap().fail_at(now);
            }
            let snap = cb.snapshot();
            assert_eq!(snap.state, CircuitState::Open);
            assert!(snap.consecutive_failures >= 5);
        }
    }
}
