//! Timeout enforcement.
//!
//! # Responsibilities
//! - Bound each outbound attempt by its own timeout, the orchestrator's hard
//!   ceiling and the caller's deadline
//! - Abort in-flight work promptly when the caller cancels
//! - Keep "our timeout fired" distinct from "the caller gave up"
//!
//! # Design Decisions
//! - Uses Tokio's timer, so paused-clock tests drive it deterministically
//! - The per-attempt timeout and the hard ceiling are ours: firing either is
//!   a source fault. Only the caller's deadline and token are cancellation

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Time allowed for one attempt.
#[derive(Debug, Clone, Copy)]
pub struct AttemptBudget {
    /// The source's own timeout.
    pub own_timeout: Duration,
    /// Hard ceiling of the enclosing `Solve`.
    pub ceiling: Instant,
    /// Deadline supplied by the caller, if any.
    pub deadline: Option<Instant>,
}

impl AttemptBudget {
    pub fn new(own_timeout: Duration, ceiling: Instant) -> Self {
        Self {
            own_timeout,
            ceiling,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Limit imposed by our own timers: the source timeout or the ceiling.
    fn timeout_limit(&self, now: Instant) -> Duration {
        self.own_timeout.min(self.ceiling.saturating_duration_since(now))
    }

    /// Whichever limit is closest, measured from `now`.
    pub fn effective(&self, now: Instant) -> Duration {
        let limit = self.timeout_limit(now);
        match self.deadline {
            Some(deadline) => limit.min(deadline.saturating_duration_since(now)),
            None => limit,
        }
    }

    /// True when the caller's deadline fires strictly before our own limits.
    pub fn deadline_binds(&self, now: Instant) -> bool {
        self.deadline
            .is_some_and(|d| d.saturating_duration_since(now) < self.timeout_limit(now))
    }

    /// True once the caller's deadline has passed.
    pub fn deadline_passed(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|d| now >= d)
    }
}

/// Outcome of a bounded attempt.
#[derive(Debug)]
pub enum Bounded<T> {
    Completed(T),
    /// The source's own timeout or the hard ceiling fired first.
    TimedOut(Duration),
    /// The caller's deadline or cancellation fired first.
    Cancelled,
}

/// Run `fut` under `budget`, aborting it on cancellation.
pub async fn bounded<F, T>(fut: F, budget: AttemptBudget, cancel: &CancellationToken) -> Bounded<T>
where
    F: Future<Output = T>,
{
    let now = Instant::now();
    if cancel.is_cancelled() || budget.deadline_passed(now) {
        return Bounded::Cancelled;
    }
    if now >= budget.ceiling {
        return Bounded::TimedOut(Duration::ZERO);
    }

    let limit = budget.effective(now);
    let deadline_binds = budget.deadline_binds(now);

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Bounded::Cancelled,
        result = tokio::time::timeout(limit, fut) => match result {
            Ok(value) => Bounded::Completed(value),
            Err(_) if deadline_binds => Bounded::Cancelled,
            Err(_) => Bounded::TimedOut(limit),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_completes_within_budget() {
        let budget = AttemptBudget::new(Duration::from_secs(5), Instant::now() + Duration::from_secs(10));
        let token = CancellationToken::new();
        let out = bounded(async { 7 }, budget, &token).await;
        assert!(matches!(out, Bounded::Completed(7)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_own_timeout_fires() {
        let budget = AttemptBudget::new(Duration::from_secs(1), Instant::now() + Duration::from_secs(10));
        let token = CancellationToken::new();
        let out = bounded(tokio::time::sleep(Duration::from_secs(5)), budget, &token).await;
        assert!(matches!(out, Bounded::TimedOut(d) if d == Duration::from_secs(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_is_cancellation() {
        let now = Instant::now();
        let budget = AttemptBudget::new(Duration::from_secs(20), now + Duration::from_secs(30))
            .with_deadline(Some(now + Duration::from_secs(2)));
        let token = CancellationToken::new();
        let started = Instant::now();
        let out = bounded(tokio::time::sleep(Duration::from_secs(5)), budget, &token).await;
        assert!(matches!(out, Bounded::Cancelled));
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_aborts() {
        let budget = AttemptBudget::new(Duration::from_secs(20), Instant::now() + Duration::from_secs(20));
        let token = CancellationToken::new();
        let child = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            child.cancel();
        });
        let out = bounded(tokio::time::sleep(Duration::from_secs(5)), budget, &token).await;
        assert!(matches!(out, Bounded::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_deadline_short_circuits() {
        let now = Instant::now();
        let budget = AttemptBudget::new(Duration::from_secs(5), now + Duration::from_secs(30)).with_deadline(Some(now));
        let token = CancellationToken::new();
        let out = bounded(async { 1 }, budget, &token).await;
        assert!(matches!(out, Bounded::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ceiling_is_a_timeout() {
        let started = Instant::now();
        let budget = AttemptBudget::new(Duration::from_secs(30), started + Duration::from_secs(10));
        let token = CancellationToken::new();
        let out = bounded(tokio::time::sleep(Duration::from_secs(3600)), budget, &token).await;
        assert!(matches!(out, Bounded::TimedOut(d) if d == Duration::from_secs(10)));
        assert_eq!(started.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_equal_to_own_timeout_is_a_timeout() {
        let now = Instant::now();
        let budget = AttemptBudget::new(Duration::from_secs(5), now + Duration::from_secs(30))
            .with_deadline(Some(now + Duration::from_secs(5)));
        let token = CancellationToken::new();
        let out = bounded(tokio::time::sleep(Duration::from_secs(60)), budget, &token).await;
        assert!(matches!(out, Bounded::TimedOut(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_passed_ceiling_short_circuits() {
        let budget = AttemptBudget::new(Duration::from_secs(5), Instant::now());
        let token = CancellationToken::new();
        let out = bounded(async { 1 }, budget, &token).await;
        assert!(matches!(out, Bounded::TimedOut(d) if d.is_zero()));
    }
}
