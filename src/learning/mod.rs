//! Outcome recording and learning feedback.
//!
//! # Data Flow
//! ```text
//! every attempt in Solve
//!     → recorder.rs (bounded append-only log, success rate on read)
//!     → trust.rs (provider EMA, read back by the fallback chain)
//! ```
//!
//! Trust only breaks ties between providers of equal priority; it never
//! overrides circuit or quota decisions.

pub mod recorder;
pub mod trust;

pub use recorder::{AttemptRecord, OutcomeRecorder, SourceStats, SuccessRateSnapshot};
pub use trust::TrustTable;
