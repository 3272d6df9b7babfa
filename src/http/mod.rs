//! HTTP surface.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request id, trace, timeout)
//!     → handlers.rs (/v1/solve, /v1/status, /health)
//!     → admin (bearer-protected /admin/*)
//!     → Orchestrator
//! ```

pub mod handlers;
pub mod server;

pub use handlers::X_REQUEST_ID;
pub use server::{AppState, HttpServer};
