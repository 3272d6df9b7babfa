//! AI provider subsystem.
//!
//! # Data Flow
//! ```text
//! config providers[] + credential env vars
//!     → registry.rs (immutable ProviderDescriptor list)
//!     → client.rs (one ProviderClient per descriptor)
//!     → wire.rs (dialect-specific JSON in and out)
//! ```

pub mod client;
pub mod registry;
pub mod wire;

pub use client::{Completion, HttpProviderClient, Prompt, ProviderClient};
pub use registry::{ProviderDescriptor, ProviderRegistry};
