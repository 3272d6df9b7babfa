//! Failure taxonomy shared by every resolution source.
//!
//! # Classes
//! - Transient: timeout, connect failure, 408/429/5xx. Trips the breaker,
//!   falls through to the next candidate.
//! - PermanentCaller: any other 4xx. Never trips the breaker.
//! - QuotaExceeded / CircuitOpen: provider skipped before any network call.
//! - NoMatch: a research source answered but had nothing confident.
//! - Cancelled: caller deadline or cancellation fired mid-attempt.

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Classification of an attempt failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Transient,
    PermanentCaller,
    QuotaExceeded,
    CircuitOpen,
    NoMatch,
    Cancelled,
}

impl ErrorClass {
    /// Whether this class counts toward a provider's consecutive failures.
    pub fn trips_breaker(self) -> bool {
        matches!(self, ErrorClass::Transient)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorClass::Transient => "transient",
            ErrorClass::PermanentCaller => "permanent_caller",
            ErrorClass::QuotaExceeded => "quota_exceeded",
            ErrorClass::CircuitOpen => "circuit_open",
            ErrorClass::NoMatch => "no_match",
            ErrorClass::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by outbound calls (AI providers, web search).
///
/// Response bodies are carried for logging only; control flow looks at
/// [`ProviderError::class`] alone.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("upstream returned HTTP {status}")]
    Status { status: u16, body: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("request failed: {0}")]
    Request(String),
}

impl ProviderError {
    /// Map a transport error from `reqwest` into the taxonomy.
    pub fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout(timeout)
        } else if err.is_connect() {
            ProviderError::Connect(err.to_string())
        } else if let Some(status) = err.status() {
            ProviderError::Status {
                status: status.as_u16(),
                body: String::new(),
            }
        } else if err.is_decode() {
            ProviderError::InvalidResponse(err.to_string())
        } else {
            ProviderError::Request(err.to_string())
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            ProviderError::Timeout(_)
            | ProviderError::Connect(_)
            | ProviderError::InvalidResponse(_)
            | ProviderError::Request(_) => ErrorClass::Transient,
            ProviderError::Status { status, .. } => classify_status(*status),
        }
    }
}

/// Classify a non-success HTTP status.
pub fn classify_status(status: u16) -> ErrorClass {
    match status {
        408 | 429 => ErrorClass::Transient,
        400..=499 => ErrorClass::PermanentCaller,
        _ => ErrorClass::Transient,
    }
}

/// Errors `Solve` may return to its caller.
///
/// Configuration problems are fatal at startup (`ConfigError`), so the only
/// failure left at call time is cancellation.
#[derive(Debug, Error)]
pub enum SolveError {
    #[error("cancelled before any candidate completed")]
    Cancelled,
}
