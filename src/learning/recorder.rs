//! Outcome recorder.
//!
//! Append-only log of attempts, bounded by count and age. Success rates are
//! recomputed from the log on every read; nothing derived is stored.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use uuid::Uuid;

use crate::clock;
use crate::config::LearningConfig;
use crate::error::ErrorClass;
use crate::fallback::Source;
use crate::learning::trust::TrustTable;
use crate::observability::metrics;

/// One attempt at one candidate. Never mutated after creation.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptRecord {
    pub id: Uuid,
    pub source: Source,
    pub persona: String,
    pub timestamp_ms: u64,
    #[serde(skip)]
    pub at: Instant,
    pub latency_ms: u64,
    pub success: bool,
    pub error: Option<ErrorClass>,
}

impl AttemptRecord {
    pub fn new(
        source: Source,
        persona: &str,
        started: Instant,
        finished: Instant,
        error: Option<ErrorClass>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            persona: persona.to_string(),
            timestamp_ms: clock::unix_millis_at(finished, Instant::now()),
            at: finished,
            latency_ms: finished.saturating_duration_since(started).as_millis() as u64,
            success: error.is_none(),
            error,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.error == Some(ErrorClass::Cancelled)
    }

    fn outcome(&self) -> &'static str {
        match self.error {
            None => "success",
            Some(class) => class.as_str(),
        }
    }
}

/// Per-source counts inside a [`SuccessRateSnapshot`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SourceStats {
    pub total: u64,
    pub successes: u64,
}

/// Success rate over a window. Cancelled attempts are counted separately
/// and excluded from `total`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuccessRateSnapshot {
    pub window_secs: u64,
    pub total: u64,
    pub successes: u64,
    pub cancelled: u64,
    pub rate: f64,
    pub per_source: BTreeMap<String, SourceStats>,
}

#[derive(Debug)]
pub struct OutcomeRecorder {
    records: Mutex<VecDeque<AttemptRecord>>,
    max_records: usize,
    max_age: Duration,
    trust: Arc<TrustTable>,
}

impl OutcomeRecorder {
    pub fn new(max_records: usize, max_age: Duration, trust: Arc<TrustTable>) -> Self {
        Self {
            records: Mutex::new(VecDeque::with_capacity(max_records.min(4096))),
            max_records: max_records.max(1),
            max_age,
            trust,
        }
    }

    pub fn from_config(config: &LearningConfig, trust: Arc<TrustTable>) -> Self {
        Self::new(config.max_records, config.max_age(), trust)
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<AttemptRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an attempt and feed provider outcomes into trust.
    pub fn record(&self, record: AttemptRecord) {
        let outcome = record.outcome();
        let source_label = record.source.to_string();
        metrics::record_attempt(&source_label, outcome, Duration::from_millis(record.latency_ms));

        if let Source::Provider(id) = &record.source {
            match record.error {
                None => {
                    self.trust.observe(id, true);
                }
                Some(ErrorClass::Transient) => {
                    self.trust.observe(id, false);
                }
                _ => {}
            }
        }

        tracing::debug!(
            source = %record.source,
            persona = %record.persona,
            latency_ms = record.latency_ms,
            outcome,
            "Attempt recorded"
        );

        let at = record.at;
        let mut records = self.lock();
        records.push_back(record);
        while records.len() > self.max_records {
            records.pop_front();
        }
        Self::evict_older(&mut records, at, self.max_age);
    }

    fn evict_older(records: &mut VecDeque<AttemptRecord>, now: Instant, age: Duration) {
        while records
            .front()
            .is_some_and(|r| now.saturating_duration_since(r.at) > age)
        {
            records.pop_front();
        }
    }

    /// Success rate over records no older than `window` at `now`.
    pub fn success_rate(&self, window: Duration, now: Instant) -> SuccessRateSnapshot {
        let mut records = self.lock();
        Self::evict_older(&mut records, now, self.max_age);

        let mut snapshot = SuccessRateSnapshot {
            window_secs: window.as_secs(),
            total: 0,
            successes: 0,
            cancelled: 0,
            rate: 0.0,
            per_source: BTreeMap::new(),
        };
        for record in records
            .iter()
            .filter(|r| now.saturating_duration_since(r.at) <= window)
        {
            if record.is_cancelled() {
                snapshot.cancelled += 1;
                continue;
            }
            let stats = snapshot
                .per_source
                .entry(record.source.to_string())
                .or_default();
            stats.total += 1;
            snapshot.total += 1;
            if record.success {
                stats.successes += 1;
                snapshot.successes += 1;
            }
        }
        if snapshot.total > 0 {
            snapshot.rate = snapshot.successes as f64 / snapshot.total as f64;
        }
        snapshot
    }

    pub fn trust_weight(&self, provider: &str) -> f64 {
        self.trust.weight(provider)
    }

    /// Most recent records, newest last.
    pub fn recent(&self, limit: usize) -> Vec<AttemptRecord> {
        let records = self.lock();
        let skip = records.len().saturating_sub(limit);
        records.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder(max: usize) -> OutcomeRecorder {
        OutcomeRecorder::new(max, Duration::from_secs(86_400), Arc::new(TrustTable::new(0.2, 0.5)))
    }

    fn attempt(source: Source, at: Instant, error: Option<ErrorClass>) -> AttemptRecord {
        AttemptRecord::new(source, "devops", at, at, error)
    }

    #[test]
    fn test_success_rate_recomputed_on_append() {
        let rec = recorder(1000);
        let now = Instant::now();
        rec.record(attempt(Source::KnowledgeBase, now, Some(ErrorClass::NoMatch)));
        rec.record(attempt(Source::Provider("a".into()), now, None));

        let snap = rec.success_rate(Duration::from_secs(60), now);
        assert_eq!((snap.total, snap.successes), (2, 1));
        assert_eq!(snap.rate, 0.5);

        rec.record(attempt(Source::Static, now, None));
        let snap = rec.success_rate(Duration::from_secs(60), now);
        assert_eq!((snap.total, snap.successes), (3, 2));
        assert_eq!(snap.per_source["static"], SourceStats { total: 1, successes: 1 });
        assert_eq!(snap.per_source["knowledge-base"], SourceStats { total: 1, successes: 0 });
    }

    #[test]
    fn test_cancelled_excluded() {
        let rec = recorder(1000);
        let now = Instant::now();
        rec.record(attempt(Source::Provider("a".into()), now, Some(ErrorClass::Cancelled)));
        rec.record(attempt(Source::Static, now, None));

        let snap = rec.success_rate(Duration::from_secs(60), now);
        assert_eq!(snap.total, 1);
        assert_eq!(snap.cancelled, 1);
        assert_eq!(snap.rate, 1.0);
        // cancellation is neutral for trust
        assert_eq!(rec.trust_weight("a"), 0.5);
    }

    #[test]
    fn test_window_filters_old_records() {
        let rec = recorder(1000);
        let start = Instant::now();
        rec.record(attempt(Source::Static, start, None));
        let later = start + Duration::from_secs(120);
        rec.record(attempt(Source::WebSearch, later, Some(ErrorClass::Transient)));

        let snap = rec.success_rate(Duration::from_secs(60), later);
        assert_eq!(snap.total, 1);
        assert_eq!(snap.successes, 0);
    }

    #[test]
    fn test_bounded_by_count_and_age() {
        let rec = recorder(3);
        let now = Instant::now();
        for _ in 0..5 {
            rec.record(attempt(Source::Static, now, None));
        }
        assert_eq!(rec.len(), 3);

        let next_day = now + Duration::from_secs(86_401);
        rec.record(attempt(Source::Static, next_day, None));
        assert_eq!(rec.len(), 1);
    }

    #[test]
    fn test_provider_outcomes_move_trust() {
        let rec = recorder(10);
        let now = Instant::now();
        rec.record(attempt(Source::Provider("a".into()), now, None));
        rec.record(attempt(Source::Provider("b".into()), now, Some(ErrorClass::Transient)));
        rec.record(attempt(Source::Provider("c".into()), now, Some(ErrorClass::PermanentCaller)));
        assert!(rec.trust_weight("a") > 0.5);
        assert!(rec.trust_weight("b") < 0.5);
        assert_eq!(rec.trust_weight("c"), 0.5);
    }
}
