//! Usage quota subsystem.
//!
//! # Data Flow
//! ```text
//! Solve(problem, persona)
//!     → usage.rs record_call (shared denominator)
//!     → fallback chain peeks has_headroom while ordering providers
//!     → orchestrator takes try_reserve right before the network call
//!     → Reservation committed on success, released otherwise
//! ```
//!
//! # Design Decisions
//! - Windows roll by wall-clock time (window.rs buckets), not request count
//! - Personas are sharded in a DashMap; providers each own a mutex

pub mod usage;
pub mod window;

pub use usage::{QuotaDenial, Reservation, UsageGovernor, UsageStatus, UNLISTED_PERSONA};
pub use window::RollingWindow;
