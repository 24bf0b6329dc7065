//! Time and jitter helpers shared by the scheduler, gates and retry executor.

use rand::Rng;
use std::time::Duration;

/// Returns a uniformly random delay in `[0, min(30, 0.1 * interval_s))` seconds,
/// used both when a target is first observed and every time it is re-armed
/// after a scheduled probe.
pub fn due_jitter(interval_s: u64) -> Duration {
    let cap = (interval_s as f64 * 0.1).min(30.0).max(0.0);
    if cap <= 0.0 {
        return Duration::ZERO;
    }
    let secs = rand::rng().random_range(0.0..cap);
    Duration::from_secs_f64(secs)
}

/// Exponential backoff with jitter before retry attempt `n + 1`:
/// `base_backoff_ms * 2^(n - 1) + uniform(0, jitter_ms)`, where `n` is the
/// 1-indexed attempt number that just failed.
pub fn retry_backoff(attempt: u32, base_backoff_ms: u64, jitter_ms: u64) -> Duration {
    debug_assert!(attempt >= 1);
    let exponent = attempt.saturating_sub(1);
    let base = base_backoff_ms.saturating_mul(1u64 << exponent.min(32));
    let jitter = if jitter_ms == 0 {
        0
    } else {
        rand::rng().random_range(0..=jitter_ms)
    };
    Duration::from_millis(base.saturating_add(jitter))
}

/// Returns an initial per-call dispatch delay so that at most `rps` probes
/// start per wall-second: the `index`-th (0-based) dispatch in a tick is
/// delayed by `index / rps` seconds.
pub fn rate_stagger_delay(index: usize, rps: f64) -> Duration {
    if rps <= 0.0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(index as f64 / rps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn due_jitter_is_bounded() {
        for interval in [60, 300, 600, 3600] {
            let cap = (interval as f64 * 0.1).min(30.0);
            for _ in 0..200 {
                let d = due_jitter(interval);
                assert!(d.as_secs_f64() <= cap + f64::EPSILON);
            }
        }
    }

    #[test]
    fn due_jitter_zero_interval_is_zero() {
        assert_eq!(due_jitter(0), Duration::ZERO);
    }

    #[test]
    fn retry_backoff_matches_formula_with_no_jitter() {
        assert_eq!(retry_backoff(1, 100, 0), Duration::from_millis(100));
        assert_eq!(retry_backoff(2, 100, 0), Duration::from_millis(200));
        assert_eq!(retry_backoff(3, 100, 0), Duration::from_millis(400));
    }

    #[test]
    fn retry_backoff_jitter_is_bounded() {
        for _ in 0..200 {
            let d = retry_backoff(1, 100, 50);
            assert!(d.as_millis() >= 100 && d.as_millis() <= 150);
        }
    }

    #[test]
    fn rate_stagger_delay_spaces_dispatches() {
        assert_eq!(rate_stagger_delay(0, 2.0), Duration::ZERO);
        assert_eq!(rate_stagger_delay(1, 2.0), Duration::from_millis(500));
        assert_eq!(rate_stagger_delay(4, 2.0), Duration::from_secs(2));
    }

    #[test]
    fn rate_stagger_delay_disabled_is_zero() {
        assert_eq!(rate_stagger_delay(9, 0.0), Duration::ZERO);
    }
}
