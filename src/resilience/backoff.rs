//! Exponential cooldown for reopened circuits.

use std::time::Duration;

/// Cooldown for the `trip`-th consecutive opening of a circuit.
///
/// The first opening waits `base`; each failed half-open probe doubles the
/// wait, never exceeding `max`.
pub fn cooldown_for(trip: u32, base: Duration, max: Duration) -> Duration {
    if trip <= 1 {
        return base.min(max);
    }

    let factor = 2u32.saturating_pow(trip - 1);
    base.checked_mul(factor).unwrap_or(max).min(max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cooldown_doubles() {
        let base = Duration::from_secs(300);
        let max = Duration::from_secs(3600);
        assert_eq!(cooldown_for(1, base, max), Duration::from_secs(300));
        assert_eq!(cooldown_for(2, base, max), Duration::from_secs(600));
        assert_eq!(cooldown_for(3, base, max), Duration::from_secs(1200));
        assert_eq!(cooldown_for(4, base, max), Duration::from_secs(2400));
    }

    #[test]
    fn test_cooldown_capped() {
        let base = Duration::from_secs(300);
        let max = Duration::from_secs(3600);
        assert_eq!(cooldown_for(5, base, max), max);
        assert_eq!(cooldown_for(40, base, max), max);
        assert_eq!(cooldown_for(u32::MAX, base, max), max);
    }

    #[test]
    fn test_zero_trip_is_base() {
        let base = Duration::from_millis(100);
        assert_eq!(cooldown_for(0, base, Duration::from_secs(1)), base);
    }
}
