//! Background health subsystem.
//!
//! # Data Flow
//! ```text
//! sweeper.rs:
//!     Periodic timer
//!     → scan every circuit
//!     → Open with elapsed cooldown → Half-Open
//!     → next real request becomes the probe
//! ```
//!
//! # Design Decisions
//! - The sweep never makes network calls; real traffic probes
//! - Solve also checks cooldowns inline, so a disabled sweep only costs latency

pub mod sweeper;

pub use sweeper::CircuitSweeper;
