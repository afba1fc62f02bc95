//! C2: retry policy. Pure except for jitter's uniform random source.
//!
//! Grounded on the teacher's `seesaw-job-postgres` backoff
//! (`2i64.pow(attempt).min(3600)`), generalised to the three policies the
//! spec names and parameterised on base/cap instead of hardcoded units.

use crate::job::RetryPolicy;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;

/// `retry_count < max_retries` is the only question this asks; it does
/// not look at job status.
pub fn should_retry(retry_count: i32, max_retries: i32) -> bool {
    retry_count < max_retries
}

/// Computes the delay before the next attempt.
///
/// - `FIXED`: always `base_delay`.
/// - `EXPONENTIAL`: `min(base_delay * 2^retry_count, max_delay)`.
/// - `JITTER`: exponential as above, plus uniform noise in
///   `[0, 0.5 * exponential)`, added *after* the cap — so a jittered delay
///   can exceed `max_delay`.
pub fn compute_delay(
    retry_count: i32,
    policy: RetryPolicy,
    base_delay: Duration,
    max_delay: Duration,
) -> Duration {
    match policy {
        RetryPolicy::Fixed => base_delay,
        RetryPolicy::Exponential => exponential_delay(retry_count, base_delay, max_delay),
        RetryPolicy::Jitter => {
            let exp = exponential_delay(retry_count, base_delay, max_delay);
            let jitter_span = exp.as_secs_f64() * 0.5;
            let jitter = fastrand::f64() * jitter_span;
            exp + Duration::from_secs_f64(jitter)
        }
    }
}

fn exponential_delay(retry_count: i32, base_delay: Duration, max_delay: Duration) -> Duration {
    let factor = 2f64.powi(retry_count.max(0));
    let scaled = base_delay.as_secs_f64() * factor;
    Duration::from_secs_f64(scaled).min(max_delay)
}

/// `now + delay`, the instant a retried job's `scheduled_at` should be set
/// to.
pub fn next_time(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    now + ChronoDuration::from_std(delay).unwrap_or_else(|_| ChronoDuration::seconds(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_retry_respects_the_bound() {
        assert!(should_retry(0, 3));
        assert!(should_retry(2, 3));
        assert!(!should_retry(3, 3));
        assert!(!should_retry(4, 3));
    }

    #[test]
    fn fixed_policy_never_changes() {
        let base = Duration::from_secs(10);
        let cap = Duration::from_secs(3600);
        for n in 0..5 {
            assert_eq!(compute_delay(n, RetryPolicy::Fixed, base, cap), base);
        }
    }

    #[test]
    fn exponential_policy_doubles_and_caps() {
        let base = Duration::from_secs(1);
        let cap = Duration::from_secs(10);
        assert_eq!(compute_delay(0, RetryPolicy::Exponential, base, cap), Duration::from_secs(1));
        assert_eq!(compute_delay(1, RetryPolicy::Exponential, base, cap), Duration::from_secs(2));
        assert_eq!(compute_delay(2, RetryPolicy::Exponential, base, cap), Duration::from_secs(4));
        // 2^10 * 1s would be 1024s, capped to 10s.
        assert_eq!(compute_delay(10, RetryPolicy::Exponential, base, cap), cap);
    }

    #[test]
    fn jitter_policy_can_exceed_the_cap() {
        let base = Duration::from_secs(1);
        let cap = Duration::from_secs(4);
        // At retry_count=2 the exponential term is already at the cap (4s);
        // jitter adds up to 0.5 * 4s = 2s on top, so up to 6s, never less
        // than the uncapped exponential term itself.
        for _ in 0..50 {
            let d = compute_delay(2, RetryPolicy::Jitter, base, cap);
            assert!(d >= cap);
            assert!(d <= cap + Duration::from_secs(2));
        }
    }

    #[test]
    fn next_time_adds_the_delay() {
        let now = Utc::now();
        let delay = Duration::from_secs(20);
        let t = next_time(now, delay);
        assert_eq!((t - now).num_seconds(), 20);
    }
}
