//! Fallback chain subsystem.
//!
//! # Data Flow
//! ```text
//! Solve(problem, persona)
//!     → chain.rs resolve
//!         1. knowledge.rs (local corpus, free and fast)
//!         2. web_search.rs (when enabled)
//!         3. providers passing circuit + quota, gated by complexity.rs
//!         4. static response (always present)
//! ```

pub mod chain;
pub mod complexity;
pub mod knowledge;
pub mod web_search;

pub use chain::{FallbackChain, Source};
pub use complexity::{ComplexityClassifier, ComplexityLevel};
pub use knowledge::{KnowledgeBase, KnowledgeMatch};
pub use web_search::{HttpWebSearch, SearchHit, WebSearch};
