//! Exponential backoff with additive jitter.

use std::time::Duration;

/// Backoff delay for a 1-based attempt number: `base · 2^(attempt-1)`,
/// capped at `max`.
pub fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let exponent = attempt.saturating_sub(1).min(63);
    let multiplier = 1u128 << exponent;
    let millis = base.as_millis().saturating_mul(multiplier).min(max.as_millis());
    Duration::from_millis(millis as u64)
}

/// Add uniform jitter in `[0, delay · factor)` to a delay.
///
/// Jitter is strictly additive; the returned duration is never below the
/// input delay.
pub fn apply_jitter(delay: Duration, factor: f64) -> Duration {
    if factor <= 0.0 {
        return delay;
    }
    let jitter = delay.as_secs_f64() * factor * rand_factor();
    delay + Duration::from_secs_f64(jitter)
}

/// Pseudo-random factor in [0, 1) without pulling in the rand crate.
fn rand_factor() -> f64 {
    use std::hash::{BuildHasher, Hasher};

    let hasher = std::collections::hash_map::RandomState::new().build_hasher();
    (hasher.finish() % 10_000) as f64 / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_per_attempt_until_the_cap() {
        let base = Duration::from_millis(100);
        let max = Duration::from_millis(1000);
        assert_eq!(backoff_delay(1, base, max), Duration::from_millis(100));
        assert_eq!(backoff_delay(2, base, max), Duration::from_millis(200));
        assert_eq!(backoff_delay(3, base, max), Duration::from_millis(400));
        assert_eq!(backoff_delay(4, base, max), Duration::from_millis(800));
        assert_eq!(backoff_delay(5, base, max), Duration::from_millis(1000));
        assert_eq!(backoff_delay(6, base, max), Duration::from_millis(1000));
    }

    #[test]
    fn huge_attempt_numbers_do_not_overflow() {
        let base = Duration::from_millis(1000);
        let max = Duration::from_secs(30);
        assert_eq!(backoff_delay(u32::MAX, base, max), max);
    }

    #[test]
    fn jitter_is_additive_and_bounded() {
        let delay = Duration::from_millis(1000);
        for _ in 0..100 {
            let jittered = apply_jitter(delay, 0.25);
            assert!(jittered >= delay);
            assert!(jittered < delay + Duration::from_millis(251));
        }
    }

    #[test]
    fn zero_factor_disables_jitter() {
        let delay = Duration::from_millis(500);
        assert_eq!(apply_jitter(delay, 0.0), delay);
    }
}
