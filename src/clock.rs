//! Wall-clock helpers for reporting.
//!
//! Internal state uses the monotonic `tokio::time::Instant`; anything
//! surfaced to callers is converted to unix milliseconds here.

use std::time::{SystemTime, UNIX_EPOCH};
use tokio::time::Instant;

/// Current unix time in milliseconds.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Unix milliseconds corresponding to a monotonic instant, relative to `now`.
pub fn unix_millis_at(at: Instant, now: Instant) -> u64 {
    let base = unix_millis();
    if at >= now {
        base.saturating_add(at.duration_since(now).as_millis() as u64)
    } else {
        base.saturating_sub(now.duration_since(at).as_millis() as u64)
    }
}
