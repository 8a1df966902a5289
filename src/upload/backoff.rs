use std::time::Duration;

use rand::Rng;

use crate::config::{UploadPolicy, MAX_RETRY_DELAY};

/// `delay(n) = min(base * 2^(n-1) + jitter, cap)` with `jitter` drawn from `[0, max_jitter]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub cap: Duration,
    pub max_jitter: Duration,
}

impl BackoffPolicy {
    /// The cap is clamped to [`MAX_RETRY_DELAY`] even for configs built in code.
    pub fn from_config(policy: &UploadPolicy) -> Self {
        Self {
            base: policy.base_retry_delay,
            cap: policy.max_retry_delay.min(MAX_RETRY_DELAY),
            max_jitter: policy.max_jitter,
        }
    }

    /// Deterministic core of the schedule. Attempt numbers start at 1; 0 is treated as 1.
    pub fn delay_with_jitter(&self, attempt: u32, jitter: Duration) -> Duration {
        let exponent = attempt.max(1) - 1;
        let factor = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
        let exponential = self.base.checked_mul(factor).unwrap_or(self.cap);
        exponential.saturating_add(jitter).min(self.cap)
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let max_jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if max_jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..=max_jitter_ms))
        };
        self.delay_with_jitter(attempt, jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> BackoffPolicy {
        BackoffPolicy {
            base: Duration::from_secs(1),
            cap: Duration::from_millis(60_000),
            max_jitter: Duration::from_millis(500),
        }
    }

    #[test]
    fn doubles_then_caps() {
        let p = policy();
        let no_jitter: Vec<u64> = (1..=8)
            .map(|n| p.delay_with_jitter(n, Duration::ZERO).as_millis() as u64)
            .collect();
        assert_eq!(no_jitter, vec![1_000, 2_000, 4_000, 8_000, 16_000, 32_000, 60_000, 60_000]);
    }

    #[test]
    fn jitter_is_added_below_the_cap_only() {
        let p = policy();
        assert_eq!(p.delay_with_jitter(1, Duration::from_millis(250)), Duration::from_millis(1_250));
        assert_eq!(p.delay_with_jitter(6, Duration::from_millis(500)), Duration::from_millis(32_500));
        assert_eq!(p.delay_with_jitter(7, Duration::from_millis(500)), Duration::from_millis(60_000));
    }

    #[test]
    fn configured_cap_is_clamped() {
        let config = UploadPolicy {
            max_retry_delay: Duration::from_secs(600),
            max_jitter: Duration::ZERO,
            ..UploadPolicy::default()
        };
        let p = BackoffPolicy::from_config(&config);
        assert_eq!(p.cap, MAX_RETRY_DELAY);
        assert_eq!(p.delay(12), MAX_RETRY_DELAY);
    }

    #[test]
    fn huge_attempt_numbers_saturate_at_cap() {
        assert_eq!(policy().delay_with_jitter(200, Duration::ZERO), Duration::from_millis(60_000));
    }

    #[test]
    fn random_delay_stays_within_bounds() {
        let p = policy();
        for attempt in 1..=10 {
            let lower = p.delay_with_jitter(attempt, Duration::ZERO);
            let upper = p.delay_with_jitter(attempt, p.max_jitter);
            let d = p.delay(attempt);
            assert!(d >= lower && d <= upper, "attempt {attempt}: {d:?}");
        }
    }
}
