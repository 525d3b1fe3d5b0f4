//! Failure classification and backoff policy for server requests.
//!
//! The policy is transport-agnostic: callers map their HTTP library's
//! errors into [`FailureKind`] and the policy decides whether waiting can
//! help and for how long. Auth failures (401/403) are deliberately
//! classified as non-retryable here; token recovery is the coordinator's
//! job, not the retry loop's.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A transport-level failure, reduced to what the retry policy cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Server responded with a non-success HTTP status
    Status(u16),
    /// TCP/TLS connection could not be established
    ConnectFailed,
    /// The request or connect timed out
    TimedOut,
    /// Hostname did not resolve
    DnsFailed,
}

/// Classification of a failure for retry purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Transient fault, safe to retry with default backoff
    RetryIdempotent,
    /// Server signalled pressure (429/503), retry with a longer base delay
    RetryBusy,
    /// Authentication problem; handled by the auth coordinator, never retried here
    NonRetryAuth,
    /// Client-side mistake (404 and other 4xx); waiting will not fix it
    NonRetryClient,
    /// Name resolution failed; a wrong address will not self-correct
    NonRetryDns,
}

impl ErrorClass {
    /// Whether the retry loop may re-dispatch after a delay
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::RetryIdempotent | Self::RetryBusy)
    }
}

/// Retry policy: classification plus exponential backoff with jitter.
///
/// Delays must always be realized as `tokio::time::sleep` awaits so a
/// retrying request yields its worker thread while waiting.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum dispatch attempts per request (initial + retries)
    pub max_attempts: u32,
    /// Upper bound on the computed delay (jitter may exceed it by at most `jitter_pct`)
    pub cap: Duration,
    /// Base delay when the server is rate limiting (429)
    pub base_rate_limited: Duration,
    /// Base delay when the server reports overload (503)
    pub base_busy: Duration,
    /// Base delay for every other retryable failure
    pub base_default: Duration,
    /// Jitter as a percentage of the computed delay (0-100)
    pub jitter_pct: u8,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            cap: Duration::from_millis(10_000),
            base_rate_limited: Duration::from_millis(5_000),
            base_busy: Duration::from_millis(2_000),
            base_default: Duration::from_millis(1_000),
            jitter_pct: 10,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries (single attempt).
    pub const fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            cap: Duration::ZERO,
            base_rate_limited: Duration::ZERO,
            base_busy: Duration::ZERO,
            base_default: Duration::ZERO,
            jitter_pct: 0,
        }
    }

    /// Classify a failure.
    pub fn classify(failure: FailureKind) -> ErrorClass {
        match failure {
            FailureKind::Status(429 | 503) => ErrorClass::RetryBusy,
            FailureKind::Status(408 | 500 | 502 | 504) => ErrorClass::RetryIdempotent,
            FailureKind::Status(401 | 403) => ErrorClass::NonRetryAuth,
            FailureKind::Status(_) => ErrorClass::NonRetryClient,
            FailureKind::ConnectFailed | FailureKind::TimedOut => ErrorClass::RetryIdempotent,
            FailureKind::DnsFailed => ErrorClass::NonRetryDns,
        }
    }

    /// Compute the backoff delay for the given (zero-based) attempt.
    ///
    /// `min(cap, base * 2^attempt)` plus uniform jitter of
    /// `±jitter_pct` percent. The base depends on the failure: 429 and 503
    /// carry longer bases since they signal server-side pressure.
    pub fn backoff(&self, attempt: u32, failure: FailureKind) -> Duration {
        let delay = self.raw_delay(attempt, failure);
        self.apply_jitter(delay)
    }

    /// The deterministic part of the delay, before jitter.
    pub fn raw_delay(&self, attempt: u32, failure: FailureKind) -> Duration {
        let base = match failure {
            FailureKind::Status(429) => self.base_rate_limited,
            FailureKind::Status(503) => self.base_busy,
            _ => self.base_default,
        };
        // Saturating shift keeps large attempt numbers from wrapping
        let factor = 1u32 << attempt.min(30);
        base.saturating_mul(factor).min(self.cap)
    }

    fn apply_jitter(&self, delay: Duration) -> Duration {
        if self.jitter_pct == 0 || delay.is_zero() {
            return delay;
        }

        let delay_ms = delay.as_millis() as u64;
        let jitter_ms = delay_ms * u64::from(self.jitter_pct) / 100;
        if jitter_ms == 0 {
            return delay;
        }

        // Uniform in [delay - jitter, delay + jitter]
        let offset = rand::thread_rng().gen_range(0..=jitter_ms * 2);
        Duration::from_millis(delay_ms - jitter_ms + offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn no_jitter() -> RetryPolicy {
        RetryPolicy {
            jitter_pct: 0,
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn test_busy_statuses_classified_as_retry_busy() {
        assert_eq!(
            RetryPolicy::classify(FailureKind::Status(503)),
            ErrorClass::RetryBusy
        );
        assert_eq!(
            RetryPolicy::classify(FailureKind::Status(429)),
            ErrorClass::RetryBusy
        );
    }

    #[test]
    fn test_server_errors_and_timeouts_retryable() {
        for status in [408, 500, 502, 504] {
            assert_eq!(
                RetryPolicy::classify(FailureKind::Status(status)),
                ErrorClass::RetryIdempotent
            );
        }
        assert!(RetryPolicy::classify(FailureKind::ConnectFailed).is_retryable());
        assert!(RetryPolicy::classify(FailureKind::TimedOut).is_retryable());
    }

    #[test]
    fn test_client_and_dns_failures_not_retryable() {
        assert_eq!(
            RetryPolicy::classify(FailureKind::Status(404)),
            ErrorClass::NonRetryClient
        );
        assert_eq!(
            RetryPolicy::classify(FailureKind::DnsFailed),
            ErrorClass::NonRetryDns
        );
        assert!(!RetryPolicy::classify(FailureKind::Status(404)).is_retryable());
    }

    #[test]
    fn test_auth_statuses_are_never_retried_here() {
        assert_eq!(
            RetryPolicy::classify(FailureKind::Status(401)),
            ErrorClass::NonRetryAuth
        );
        assert_eq!(
            RetryPolicy::classify(FailureKind::Status(403)),
            ErrorClass::NonRetryAuth
        );
    }

    #[test]
    fn test_backoff_doubles_then_caps() {
        let policy = no_jitter();
        let d0 = policy.raw_delay(0, FailureKind::TimedOut);
        let d1 = policy.raw_delay(1, FailureKind::TimedOut);
        let d2 = policy.raw_delay(2, FailureKind::TimedOut);

        assert_eq!(d0, Duration::from_secs(1));
        assert_eq!(d1, Duration::from_secs(2));
        assert_eq!(d2, Duration::from_secs(4));
        assert_eq!(policy.raw_delay(10, FailureKind::TimedOut), policy.cap);
    }

    #[test]
    fn test_rate_limited_base_is_largest() {
        let policy = no_jitter();
        let rate_limited = policy.raw_delay(0, FailureKind::Status(429));
        let busy = policy.raw_delay(0, FailureKind::Status(503));
        let default = policy.raw_delay(0, FailureKind::Status(500));

        assert!(rate_limited > busy);
        assert!(busy > default);
    }

    #[test]
    fn test_jitter_stays_within_ten_percent() {
        let policy = RetryPolicy::default();
        for _ in 0..100 {
            let delay = policy.backoff(1, FailureKind::TimedOut);
            // raw delay is 2s; jittered result must stay within ±10%
            assert!(delay >= Duration::from_millis(1_800));
            assert!(delay <= Duration::from_millis(2_200));
        }
    }

    proptest! {
        #[test]
        fn prop_raw_delay_non_decreasing(attempt in 0u32..20) {
            let policy = no_jitter();
            let a = policy.raw_delay(attempt, FailureKind::TimedOut);
            let b = policy.raw_delay(attempt + 1, FailureKind::TimedOut);
            prop_assert!(b >= a);
        }

        #[test]
        fn prop_backoff_bounded_by_cap_plus_jitter(attempt in 0u32..64, status in 400u16..600) {
            let policy = RetryPolicy::default();
            let delay = policy.backoff(attempt, FailureKind::Status(status));
            let bound = policy.cap + policy.cap / 10;
            prop_assert!(delay <= bound);
        }
    }
}
