//! Usage governor: per-persona AI call ceilings and per-provider shares.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dashmap::DashMap;
use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;

use crate::config::{OrchestratorConfig, UsageConfig};
use crate::observability::metrics;
use crate::quota::window::{BucketId, RollingWindow};

/// Why a reservation was refused.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QuotaDenial {
    #[error("persona '{persona}' at {count} AI calls, ceiling {ceiling:.2}")]
    Persona {
        persona: String,
        count: u64,
        ceiling: f64,
    },

    #[error("provider '{provider}' at {count} calls, ceiling {ceiling:.2}")]
    Provider {
        provider: String,
        count: u64,
        ceiling: f64,
    },

    #[error("provider '{0}' is not governed")]
    UnknownProvider(String),
}

/// One row of the usage section in `Status()`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageStatus {
    pub persona: String,
    pub provider: String,
    pub window_count: u64,
    pub window_ceiling: u64,
}

/// Key under which every persona missing from the config is counted.
pub const UNLISTED_PERSONA: &str = "*";

#[derive(Debug)]
struct PersonaUsage {
    share: f64,
    ai_calls: RollingWindow,
    per_provider: HashMap<String, RollingWindow>,
}

#[derive(Debug)]
struct ProviderUsage {
    share: f64,
    calls: Mutex<RollingWindow>,
}

/// Rolling-window quota enforcement.
///
/// Denominator for every ceiling is the number of `Solve` calls (all
/// personas) in the window. Check-then-increment for a persona runs under
/// that persona's map entry, then the provider's mutex, always in that
/// order.
///
/// Configured personas each have their own entry. All other persona names
/// share the single [`UNLISTED_PERSONA`] entry at `default_share`, so the
/// map never grows with caller input.
#[derive(Debug)]
pub struct UsageGovernor {
    template: RollingWindow,
    default_share: f64,
    total: Mutex<RollingWindow>,
    personas: DashMap<String, PersonaUsage>,
    providers: HashMap<String, ProviderUsage>,
}

impl UsageGovernor {
    pub fn new(config: &UsageConfig, epoch: Instant) -> Self {
        let template = RollingWindow::new(epoch, config.bucket_width(), config.buckets);
        let governor = Self {
            total: Mutex::new(template.clone()),
            template,
            default_share: config.default_share,
            personas: DashMap::new(),
            providers: HashMap::new(),
        };
        governor
            .personas
            .insert(UNLISTED_PERSONA.to_string(), governor.persona_usage(config.default_share));
        governor
    }

    /// Build from config for the given (already filtered) provider ids.
    pub fn from_config<'a>(
        config: &OrchestratorConfig,
        providers: impl IntoIterator<Item = (&'a str, f64)>,
        epoch: Instant,
    ) -> Self {
        let mut governor = Self::new(&config.usage, epoch);
        for persona in &config.personas {
            governor = governor.with_persona(&persona.name, persona.max_ai_share);
        }
        for (id, share) in providers {
            governor = governor.with_provider(id, share);
        }
        governor
    }

    pub fn with_persona(self, name: &str, share: f64) -> Self {
        self.personas.insert(name.to_string(), self.persona_usage(share));
        self
    }

    pub fn with_provider(mut self, id: &str, share: f64) -> Self {
        self.providers.insert(
            id.to_string(),
            ProviderUsage {
                share,
                calls: Mutex::new(self.template.clone()),
            },
        );
        self
    }

    fn persona_usage(&self, share: f64) -> PersonaUsage {
        PersonaUsage {
            share,
            ai_calls: self.template.clone(),
            per_provider: HashMap::new(),
        }
    }

    fn total(&self) -> MutexGuard<'_, RollingWindow> {
        self.total.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Entry `persona` is counted under.
    fn persona_key<'a>(&self, persona: &'a str) -> &'a str {
        if self.personas.contains_key(persona) {
            persona
        } else {
            UNLISTED_PERSONA
        }
    }

    /// Count one `Solve` call toward the shared denominator.
    pub fn record_call(&self, persona: &str, now: Instant) {
        let bucket = self.total().record(now);
        tracing::trace!(persona, bucket, "Solve call counted");
    }

    /// Number of persona entries tracked.
    pub fn tracked_personas(&self) -> usize {
        self.personas.len()
    }

    /// `Solve` calls in the window ending at `now`.
    pub fn total_calls(&self, now: Instant) -> u64 {
        self.total().count(now)
    }

    /// Ceiling share for `persona`.
    pub fn persona_share(&self, persona: &str) -> f64 {
        self.personas
            .get(self.persona_key(persona))
            .map_or(self.default_share, |p| p.share)
    }

    /// Would a reservation succeed right now? Does not reserve.
    pub fn has_headroom(&self, persona: &str, provider: &str, now: Instant) -> bool {
        self.check(persona, provider, now, 0, false).is_ok()
    }

    /// Like [`UsageGovernor::has_headroom`], with `pending` calls not yet
    /// recorded added to the window total.
    pub fn has_headroom_with(&self, persona: &str, provider: &str, now: Instant, pending: u64) -> bool {
        self.check(persona, provider, now, pending, false).is_ok()
    }

    /// Atomically check both ceilings and count one AI call.
    ///
    /// Dropping the returned [`Reservation`] without committing gives the
    /// call back.
    pub fn try_reserve(
        self: &Arc<Self>,
        persona: &str,
        provider: &str,
        now: Instant,
    ) -> Result<Reservation, QuotaDenial> {
        match self.check(persona, provider, now, 0, true) {
            Ok(bucket) => Ok(Reservation {
                governor: Arc::clone(self),
                persona: self.persona_key(persona).to_string(),
                provider: provider.to_string(),
                bucket,
                settled: false,
            }),
            Err(denial) => {
                tracing::info!(persona, provider, reason = %denial, "Quota denied");
                metrics::record_quota_denied(persona, provider);
                Err(denial)
            }
        }
    }

    fn check(
        &self,
        persona: &str,
        provider: &str,
        now: Instant,
        pending: u64,
        reserve: bool,
    ) -> Result<BucketId, QuotaDenial> {
        let total = (self.total().count(now) + pending) as f64;
        let key = self.persona_key(persona);
        let provider_usage = self
            .providers
            .get(provider)
            .ok_or_else(|| QuotaDenial::UnknownProvider(provider.to_string()))?;

        if !reserve {
            let (share, persona_count) = match self.personas.get_mut(key) {
                Some(mut usage) => (usage.share, usage.ai_calls.count(now)),
                None => (self.default_share, 0),
            };
            check_persona(persona, persona_count, share * total)?;
            let provider_count = provider_usage
                .calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .count(now);
            return check_provider(provider, provider_count, provider_usage.share * total).map(|_| 0);
        }

        let mut persona_usage = self
            .personas
            .entry(key.to_string())
            .or_insert_with(|| self.persona_usage(self.default_share));
        check_persona(persona, persona_usage.ai_calls.count(now), persona_usage.share * total)?;

        let mut provider_calls = provider_usage
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        check_provider(provider, provider_calls.count(now), provider_usage.share * total)?;

        let bucket = provider_calls.record(now);
        persona_usage.ai_calls.record(now);
        let template = &self.template;
        persona_usage
            .per_provider
            .entry(provider.to_string())
            .or_insert_with(|| template.clone())
            .record(now);
        Ok(bucket)
    }

    fn release(&self, persona: &str, provider: &str, bucket: BucketId) {
        if let Some(mut usage) = self.personas.get_mut(persona) {
            usage.ai_calls.release(bucket);
            if let Some(window) = usage.per_provider.get_mut(provider) {
                window.release(bucket);
            }
        }
        if let Some(usage) = self.providers.get(provider) {
            usage
                .calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .release(bucket);
        }
    }

    /// Per (persona, provider) counts and ceilings, sorted by persona then provider.
    pub fn usage(&self, now: Instant) -> Vec<UsageStatus> {
        let total = self.total().count(now) as f64;
        let mut providers: Vec<(&String, f64)> =
            self.providers.iter().map(|(id, u)| (id, u.share)).collect();
        providers.sort_by(|a, b| a.0.cmp(b.0));

        let mut rows = Vec::new();
        for mut entry in self.personas.iter_mut() {
            let persona = entry.key().clone();
            let usage = entry.value_mut();
            for (provider, provider_share) in &providers {
                let window_count = usage
                    .per_provider
                    .get_mut(provider.as_str())
                    .map_or(0, |w| w.count(now));
                let ceiling = (usage.share.min(*provider_share) * total).ceil() as u64;
                rows.push(UsageStatus {
                    persona: persona.clone(),
                    provider: (*provider).clone(),
                    window_count,
                    window_ceiling: ceiling,
                });
            }
        }
        rows.sort_by(|a, b| (&a.persona, &a.provider).cmp(&(&b.persona, &b.provider)));
        rows
    }
}

fn check_persona(persona: &str, count: u64, ceiling: f64) -> Result<(), QuotaDenial> {
    if (count as f64) >= ceiling {
        return Err(QuotaDenial::Persona {
            persona: persona.to_string(),
            count,
            ceiling,
        });
    }
    Ok(())
}

fn check_provider(provider: &str, count: u64, ceiling: f64) -> Result<(), QuotaDenial> {
    if (count as f64) >= ceiling {
        return Err(QuotaDenial::Provider {
            provider: provider.to_string(),
            count,
            ceiling,
        });
    }
    Ok(())
}

/// A counted AI call.
///
/// Call [`Reservation::commit`] once the provider answered successfully;
/// anything else (drop, [`Reservation::release`]) returns the quota.
#[derive(Debug)]
pub struct Reservation {
    governor: Arc<UsageGovernor>,
    persona: String,
    provider: String,
    bucket: BucketId,
    settled: bool,
}

impl Reservation {
    pub fn commit(mut self) {
        self.settled = true;
    }

    pub fn release(mut self) {
        self.settled = true;
        self.governor.release(&self.persona, &self.provider, self.bucket);
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.settled {
            self.governor.release(&self.persona, &self.provider, self.bucket);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn governor(epoch: Instant) -> Arc<UsageGovernor> {
        Arc::new(
            UsageGovernor::new(&UsageConfig::default(), epoch)
                .with_persona("security", 0.05)
                .with_persona("devops", 0.12)
                .with_provider("a", 0.6)
                .with_provider("b", 0.4),
        )
    }

    #[test]
    fn test_persona_ceiling() {
        let now = Instant::now();
        let gov = governor(now);

        for _ in 0..95 {
            gov.record_call("other", now);
        }
        for _ in 0..5 {
            gov.record_call("security", now);
        }
        // 100 calls in window, 5% ceiling => 5 AI calls allowed
        for _ in 0..5 {
            gov.try_reserve("security", "a", now).unwrap().commit();
        }
        let denial = gov.try_reserve("security", "a", now).unwrap_err();
        assert!(matches!(denial, QuotaDenial::Persona { count: 5, .. }));
        assert!(!gov.has_headroom("security", "b", now));
    }

    #[test]
    fn test_first_call_of_empty_window_admitted() {
        let now = Instant::now();
        let gov = governor(now);
        assert!(!gov.has_headroom("security", "a", now));
        gov.record_call("security", now);
        assert!(gov.has_headroom("security", "a", now));
        gov.try_reserve("security", "a", now).unwrap().commit();
        assert!(!gov.has_headroom("security", "a", now));
    }

    #[test]
    fn test_released_reservation_restores_quota() {
        let now = Instant::now();
        let gov = governor(now);
        gov.record_call("devops", now);
        let r = gov.try_reserve("devops", "a", now).unwrap();
        assert!(gov.try_reserve("devops", "a", now).is_err());
        drop(r);
        let r = gov.try_reserve("devops", "a", now).unwrap();
        r.release();
        assert!(gov.has_headroom("devops", "a", now));
    }

    #[test]
    fn test_provider_share() {
        let now = Instant::now();
        let gov = Arc::new(
            UsageGovernor::new(&UsageConfig::default(), now)
                .with_persona("p", 1.0)
                .with_provider("a", 0.5),
        );
        for _ in 0..4 {
            gov.record_call("p", now);
        }
        gov.try_reserve("p", "a", now).unwrap().commit();
        gov.try_reserve("p", "a", now).unwrap().commit();
        let denial = gov.try_reserve("p", "a", now).unwrap_err();
        assert!(matches!(denial, QuotaDenial::Provider { count: 2, .. }));
        assert!(matches!(
            gov.try_reserve("p", "zzz", now).unwrap_err(),
            QuotaDenial::UnknownProvider(_)
        ));
    }

    #[test]
    fn test_unknown_persona_uses_default() {
        let now = Instant::now();
        let gov = governor(now);
        assert_eq!(gov.persona_share("stranger"), 0.05);
        assert_eq!(gov.persona_share("devops"), 0.12);
    }

    #[test]
    fn test_window_rolls_over() {
        let now = Instant::now();
        let gov = governor(now);
        gov.record_call("security", now);
        gov.try_reserve("security", "a", now).unwrap().commit();

        let later = now + Duration::from_secs(3601);
        assert_eq!(gov.total_calls(later), 0);
        gov.record_call("security", later);
        assert!(gov.try_reserve("security", "a", later).is_ok());
    }

    #[test]
    fn test_usage_rows() {
        let now = Instant::now();
        let gov = governor(now);
        for _ in 0..50 {
            gov.record_call("devops", now);
        }
        gov.try_reserve("devops", "b", now).unwrap().commit();

        let rows = gov.usage(now);
        let row = rows
            .iter()
            .find(|r| r.persona == "devops" && r.provider == "b")
            .unwrap();
        assert_eq!(row.window_count, 1);
        // min(0.12, 0.4) * 50 = 6
        assert_eq!(row.window_ceiling, 6);
        // security, devops and the unlisted entry, for two providers
        assert_eq!(rows.len(), 6);
    }

    #[test]
    fn test_unlisted_personas_share_one_entry() {
        let now = Instant::now();
        let gov = governor(now);
        for i in 0..5000 {
            let persona = format!("caller-{i}");
            gov.record_call(&persona, now);
            let _ = gov.try_reserve(&persona, "a", now).map(Reservation::commit);
        }
        assert_eq!(gov.tracked_personas(), 3);
        assert_eq!(gov.usage(now).len(), 6);

        // 5% of 5000 across every unlisted name, not 5% each
        let unlisted: u64 = gov
            .usage(now)
            .iter()
            .filter(|r| r.persona == UNLISTED_PERSONA)
            .map(|r| r.window_count)
            .sum();
        assert!(unlisted <= 250, "unlisted personas made {unlisted} AI calls");
        assert!(!gov.has_headroom("caller-x", "a", now));
        assert!(gov.has_headroom("devops", "a", now));
    }

    #[test]
    fn test_concurrent_reservations_never_exceed_ceiling() {
        let now = Instant::now();
        let gov = governor(now);
        for _ in 0..100 {
            gov.record_call("devops", now);
        }
        let handles: Vec<_> = (0..32)
            .map(|_| {
                let gov = Arc::clone(&gov);
                std::thread::spawn(move || match gov.try_reserve("devops", "a", now) {
                    Ok(r) => {
                        r.commit();
                        1
                    }
                    Err(_) => 0,
                })
            })
            .collect();
        let granted: u32 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(granted, 12);
    }
}
