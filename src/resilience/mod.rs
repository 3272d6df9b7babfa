//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Provider attempt:
//!     → circuit_breaker.rs (admit, short-circuit, or grant the half-open probe)
//!     → timeouts.rs (bound by provider timeout and caller deadline)
//!     → outcome settles the permit; reopening uses backoff.rs cooldowns
//! ```
//!
//! # Design Decisions
//! - Every external call has a deadline
//! - No retries inside an attempt; the fallback chain is the retry
//! - Circuit breaker prevents hammering a provider that is down

pub mod backoff;
pub mod circuit_breaker;
pub mod timeouts;

pub use circuit_breaker::{
    CircuitBreaker, CircuitPermit, CircuitPolicy, CircuitRejection, CircuitSet, CircuitSnapshot,
    CircuitState,
};
pub use timeouts::{bounded, AttemptBudget, Bounded};
