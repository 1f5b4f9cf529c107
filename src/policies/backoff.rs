//! # Reconnect backoff.
//!
//! The coordinator waits [`BackoffPolicy::next`] between gateway reconnects. The delay
//! for reconnect `n` (0-indexed) is `first × factor^n`, clamped to `max`, with jitter
//! applied to the clamped value only. The counter resets once a session reaches
//! `Ready`, so a healthy bot that drops once reconnects quickly.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use botvisor::{BackoffPolicy, JitterPolicy};
//!
//! let backoff = BackoffPolicy {
//!     first: Duration::from_secs(1),
//!     max: Duration::from_secs(60),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//!
//! assert_eq!(backoff.next(0), Duration::from_secs(1));
//! assert_eq!(backoff.next(3), Duration::from_secs(8));
//! assert_eq!(backoff.next(20), Duration::from_secs(60));
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Reconnect delay policy.
#[derive(Clone, Copy, Debug)]
pub struct BackoffPolicy {
    /// Delay before the first reconnect.
    pub first: Duration,
    /// Upper bound for any delay.
    pub max: Duration,
    /// Multiplicative growth factor.
    pub factor: f64,
    /// Jitter applied to the computed delay.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// `first = 1s`, `factor = 2.0`, `max = 60s`, equal jitter.
    fn default() -> Self {
        Self {
            first: Duration::from_secs(1),
            max: Duration::from_secs(60),
            factor: 2.0,
            jitter: JitterPolicy::Equal,
        }
    }
}

impl BackoffPolicy {
    /// Computes the delay before reconnect number `attempt` (0-indexed).
    pub fn next(&self, attempt: u32) -> Duration {
        let exp = attempt.min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);

        let base = if !secs.is_finite() || secs < 0.0 || secs > self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        };
        self.jitter.apply(base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(first_ms: u64, max_ms: u64, factor: f64) -> BackoffPolicy {
        BackoffPolicy {
            first: Duration::from_millis(first_ms),
            max: Duration::from_millis(max_ms),
            factor,
            jitter: JitterPolicy::None,
        }
    }

    #[test]
    fn grows_exponentially_until_capped() {
        let policy = plain(100, 1_000, 2.0);
        assert_eq!(policy.next(0), Duration::from_millis(100));
        assert_eq!(policy.next(1), Duration::from_millis(200));
        assert_eq!(policy.next(2), Duration::from_millis(400));
        assert_eq!(policy.next(4), Duration::from_millis(1_000));
    }

    #[test]
    fn first_above_max_is_clamped() {
        assert_eq!(plain(5_000, 1_000, 1.0).next(0), Duration::from_millis(1_000));
    }

    #[test]
    fn overflow_clamps_to_max() {
        assert_eq!(plain(100, 10_000, 2.0).next(u32::MAX), Duration::from_millis(10_000));
    }

    #[test]
    fn jitter_never_exceeds_cap() {
        let policy = BackoffPolicy {
            jitter: JitterPolicy::Full,
            ..plain(100, 2_000, 3.0)
        };
        for attempt in 0..20 {
            assert!(policy.next(attempt) <= Duration::from_millis(2_000));
        }
    }
}
