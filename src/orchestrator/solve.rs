//! `Solve`: walk the fallback chain until a candidate answers.

use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{ErrorClass, SolveError};
use crate::fallback::Source;
use crate::learning::{AttemptRecord, OutcomeRecorder};
use crate::observability::metrics;
use crate::orchestrator::{Orchestrator, PROVIDER_CONFIDENCE, WEB_SEARCH_CONFIDENCE};
use crate::providers::Prompt;
use crate::resilience::{bounded, AttemptBudget, Bounded};

/// Answer returned by `Solve`.
#[derive(Debug, Clone, Serialize)]
pub struct ResultEnvelope {
    pub request_id: Uuid,
    pub source: Source,
    pub content: String,
    pub confidence: f64,
    pub latency_ms: u64,
    /// Attempts made, including the one that answered.
    pub attempts: u32,
    /// Set when a provider rejected the request itself (4xx).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caller_error: Option<String>,
}

/// Caller controls for a single `Solve`.
#[derive(Debug, Clone, Default)]
pub struct SolveOptions {
    /// Absolute deadline. Reaching it cancels; the configured hard ceiling
    /// applies independently and counts as a source timeout.
    pub deadline: Option<Instant>,
    /// Aborts in-flight attempts when cancelled.
    pub cancel: CancellationToken,
    /// Correlation id; generated when absent.
    pub request_id: Option<Uuid>,
}

/// Result of trying one candidate.
enum Attempt {
    Answered { content: String, confidence: f64 },
    Failed { class: ErrorClass, detail: Option<String> },
    /// Refused before any work (open circuit, quota). Not recorded.
    Skipped(ErrorClass),
}

impl Attempt {
    fn failed(class: ErrorClass) -> Self {
        Attempt::Failed { class, detail: None }
    }
}

/// Records the attempt in flight as cancelled if the `Solve` future is
/// dropped before the attempt settles.
struct InFlight<'a> {
    recorder: &'a OutcomeRecorder,
    source: Source,
    persona: &'a str,
    started: Instant,
    armed: bool,
}

impl<'a> InFlight<'a> {
    fn new(recorder: &'a OutcomeRecorder, source: &Source, persona: &'a str) -> Self {
        Self {
            recorder,
            source: source.clone(),
            persona,
            started: Instant::now(),
            armed: true,
        }
    }

    fn settle(mut self) -> Instant {
        self.armed = false;
        self.started
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        tracing::info!(source = %self.source, persona = self.persona, "Solve dropped mid-attempt");
        self.recorder.record(AttemptRecord::new(
            self.source.clone(),
            self.persona,
            self.started,
            Instant::now(),
            Some(ErrorClass::Cancelled),
        ));
    }
}

impl Orchestrator {
    /// Solve with no caller deadline; the hard ceiling still applies.
    pub async fn solve(&self, problem: &str, persona: &str) -> Result<ResultEnvelope, SolveError> {
        self.solve_with(problem, persona, SolveOptions::default()).await
    }

    /// Solve under caller-supplied deadline and cancellation.
    ///
    /// Only fails when cancellation fires before any candidate completed;
    /// every other failure falls through to the next candidate and finally
    /// to the static response.
    pub async fn solve_with(
        &self,
        problem: &str,
        persona: &str,
        options: SolveOptions,
    ) -> Result<ResultEnvelope, SolveError> {
        let request_id = options.request_id.unwrap_or_else(Uuid::new_v4);
        let started = Instant::now();
        let limits = AttemptBudget::new(self.hard_ceiling, started + self.hard_ceiling)
            .with_deadline(options.deadline);
        let cancel = options.cancel;

        self.usage.record_call(persona, started);
        let candidates = self.chain.resolve(problem, persona, started);

        let mut attempts = 0u32;
        let mut completed_any = false;
        let mut cancelled = false;
        let mut caller_error: Option<String> = None;

        for source in candidates {
            if source == Source::Static {
                break;
            }
            let now = Instant::now();
            if cancel.is_cancelled() || limits.deadline_passed(now) {
                cancelled = true;
                break;
            }
            if now >= limits.ceiling {
                tracing::warn!(%request_id, persona, "Hard ceiling reached, skipping remaining candidates");
                break;
            }
            if caller_error.is_some() && source.is_provider() {
                continue;
            }

            let in_flight = InFlight::new(&self.recorder, &source, persona);
            let attempt = match &source {
                Source::KnowledgeBase => self.try_knowledge(problem),
                Source::WebSearch => self.try_web_search(problem, limits, &cancel).await,
                Source::Provider(id) => self.try_provider(id, problem, persona, limits, &cancel).await,
                Source::Static => Attempt::Skipped(ErrorClass::NoMatch),
            };
            let attempt_started = in_flight.settle();

            let (class, detail) = match attempt {
                Attempt::Skipped(class) => {
                    tracing::debug!(%request_id, source = %source, reason = %class, "Candidate skipped");
                    continue;
                }
                Attempt::Answered { content, confidence } => {
                    attempts += 1;
                    self.recorder.record(AttemptRecord::new(
                        source.clone(),
                        persona,
                        attempt_started,
                        Instant::now(),
                        None,
                    ));
                    return Ok(self.envelope(request_id, source, content, confidence, started, attempts, caller_error));
                }
                Attempt::Failed { class, detail } => (class, detail),
            };

            attempts += 1;
            self.recorder.record(AttemptRecord::new(
                source.clone(),
                persona,
                attempt_started,
                Instant::now(),
                Some(class),
            ));

            match class {
                ErrorClass::Cancelled => {
                    tracing::info!(%request_id, source = %source, "Attempt cancelled by caller");
                    cancelled = true;
                    break;
                }
                ErrorClass::PermanentCaller if source.is_provider() => {
                    tracing::warn!(
                        %request_id,
                        provider = %source,
                        error = detail.as_deref().unwrap_or_default(),
                        "Provider rejected request, skipping remaining providers"
                    );
                    completed_any = true;
                    caller_error = detail.or_else(|| Some(class.to_string()));
                }
                _ => {
                    tracing::debug!(
                        %request_id,
                        source = %source,
                        class = %class,
                        error = detail.as_deref().unwrap_or_default(),
                        "Attempt failed, trying next candidate"
                    );
                    completed_any = true;
                }
            }
        }

        if cancelled && !completed_any {
            tracing::info!(%request_id, persona, "Solve cancelled before any candidate completed");
            return Err(SolveError::Cancelled);
        }

        attempts += 1;
        let now = Instant::now();
        self.recorder
            .record(AttemptRecord::new(Source::Static, persona, now, now, None));
        Ok(self.envelope(
            request_id,
            Source::Static,
            self.static_response.clone(),
            self.static_confidence,
            started,
            attempts,
            caller_error,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn envelope(
        &self,
        request_id: Uuid,
        source: Source,
        content: String,
        confidence: f64,
        started: Instant,
        attempts: u32,
        caller_error: Option<String>,
    ) -> ResultEnvelope {
        let latency_ms = started.elapsed().as_millis() as u64;
        metrics::record_solve(&source.to_string());
        tracing::info!(%request_id, source = %source, attempts, latency_ms, "Solve answered");
        ResultEnvelope {
            request_id,
            source,
            content,
            confidence,
            latency_ms,
            attempts,
            caller_error,
        }
    }

    fn try_knowledge(&self, problem: &str) -> Attempt {
        match self.knowledge.confident_match(problem) {
            Some(found) => Attempt::Answered {
                content: found.content,
                confidence: found.relevance,
            },
            None => Attempt::failed(ErrorClass::NoMatch),
        }
    }

    async fn try_web_search(&self, problem: &str, limits: AttemptBudget, cancel: &CancellationToken) -> Attempt {
        let Some(search) = &self.web_search else {
            return Attempt::Skipped(ErrorClass::NoMatch);
        };

        let budget = AttemptBudget {
            own_timeout: search.timeout(),
            ..limits
        };
        match bounded(search.search(problem), budget, cancel).await {
            Bounded::Completed(Ok(hits)) => match hits.first() {
                Some(hit) => Attempt::Answered {
                    content: hit.render(),
                    confidence: WEB_SEARCH_CONFIDENCE,
                },
                None => Attempt::failed(ErrorClass::NoMatch),
            },
            Bounded::Completed(Err(e)) => Attempt::Failed {
                class: ErrorClass::Transient,
                detail: Some(e.to_string()),
            },
            Bounded::TimedOut(after) => Attempt::Failed {
                class: ErrorClass::Transient,
                detail: Some(format!("web search timed out after {after:?}")),
            },
            Bounded::Cancelled => Attempt::failed(ErrorClass::Cancelled),
        }
    }

    async fn try_provider(
        &self,
        id: &str,
        problem: &str,
        persona: &str,
        limits: AttemptBudget,
        cancel: &CancellationToken,
    ) -> Attempt {
        let (Some(descriptor), Some(client), Some(breaker)) =
            (self.registry.get(id), self.clients.get(id), self.circuits.get(id))
        else {
            return Attempt::Skipped(ErrorClass::NoMatch);
        };

        let now = Instant::now();
        let permit = match breaker.try_acquire(now) {
            Ok(permit) => permit,
            Err(rejection) => {
                tracing::debug!(provider = id, ?rejection, "Circuit refused call");
                return Attempt::Skipped(ErrorClass::CircuitOpen);
            }
        };
        let reservation = match self.usage.try_reserve(persona, id, now) {
            Ok(reservation) => reservation,
            Err(_) => {
                permit.release();
                return Attempt::Skipped(ErrorClass::QuotaExceeded);
            }
        };

        let prompt = Prompt {
            system: self.system_prompt(persona),
            problem: problem.to_string(),
        };
        let budget = AttemptBudget {
            own_timeout: descriptor.timeout,
            ..limits
        };
        tracing::debug!(provider = id, probe = permit.is_probe(), "Calling provider");

        match bounded(client.complete(&prompt), budget, cancel).await {
            Bounded::Completed(Ok(completion)) => {
                permit.succeed();
                reservation.commit();
                Attempt::Answered {
                    content: completion.content,
                    confidence: PROVIDER_CONFIDENCE,
                }
            }
            Bounded::Completed(Err(e)) => {
                let class = e.class();
                reservation.release();
                if class.trips_breaker() {
                    permit.fail();
                } else {
                    permit.release();
                }
                tracing::warn!(provider = id, error = %e, class = %class, "Provider call failed");
                Attempt::Failed {
                    class,
                    detail: Some(e.to_string()),
                }
            }
            Bounded::TimedOut(after) => {
                reservation.release();
                permit.fail();
                tracing::warn!(provider = id, timeout = ?after, "Provider call timed out");
                Attempt::Failed {
                    class: ErrorClass::Transient,
                    detail: Some(format!("timed out after {after:?}")),
                }
            }
            Bounded::Cancelled => {
                reservation.release();
                permit.release();
                Attempt::failed(ErrorClass::Cancelled)
            }
        }
    }
}
