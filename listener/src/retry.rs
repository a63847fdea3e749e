//! Unified retry policies for public-RPC failure modes.
//!
//! Two delay schedules cover every retry site in the pipeline: rate-limit
//! errors (recognized by provider error text) back off exponentially,
//! doubling per consecutive occurrence up to a cap, while every other
//! transient error waits the fixed base delay.

use std::{future::Future, time::Duration};

use tokio::time::sleep;

use crate::error::AppError;

/// Check if an error message indicates rate limiting by the RPC provider
pub fn is_rate_limited(message: &str) -> bool {
    let msg = message.to_lowercase();
    msg.contains("429")
        || msg.contains("rate limit")
        || msg.contains("too many requests")
        || msg.contains("-32005") // BSC "limit exceeded"
        || msg.contains("limit exceeded")
}

/// Errors worth retrying: provider-side flakiness and indexing lag.
/// Decode failures and configuration errors are not retryable.
pub fn is_retryable(err: &AppError) -> bool {
    matches!(err, AppError::Rpc(_) | AppError::ReceiptNotFound(_))
}

#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub exponential: bool,
}

impl RetryPolicy {
    /// Fixed-delay schedule (receipt lookups: the node may simply not have
    /// indexed the transaction yet)
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            max_delay: delay,
            exponential: false,
        }
    }

    /// Exponential schedule starting at `base`, doubling per consecutive
    /// failure, capped at `cap` (rate-limited log fetches)
    pub fn exponential(max_attempts: u32, base: Duration, cap: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: base,
            max_delay: cap,
            exponential: true,
        }
    }

    /// Delay before the next attempt after `consecutive_failures` errors
    /// in a row (1-indexed: the first failure yields `2 * base`)
    pub fn delay_for(&self, consecutive_failures: u32) -> Duration {
        if !self.exponential {
            return self.base_delay;
        }

        let factor = 2u64.saturating_pow(consecutive_failures);
        let delay = self
            .base_delay
            .saturating_mul(u32::try_from(factor).unwrap_or(u32::MAX));
        delay.min(self.max_delay)
    }
}

/// Run `op`, retrying per the policy while the error is retryable. Only
/// rate-limit errors escalate along the exponential schedule; other
/// transient errors wait the base delay. The last error is returned once
/// attempts are exhausted.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let mut attempts = 0u32;
    let mut rate_limit_streak = 0u32;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempts + 1 < policy.max_attempts && is_retryable(&err) => {
                attempts += 1;
                let delay = if is_rate_limited(&err.to_string()) {
                    rate_limit_streak += 1;
                    policy.delay_for(rate_limit_streak)
                } else {
                    rate_limit_streak = 0;
                    policy.base_delay
                };
                sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[test]
    fn rate_limit_detection() {
        assert!(is_rate_limited("HTTP error 429"));
        assert!(is_rate_limited("Rate Limit exceeded"));
        assert!(is_rate_limited("too many requests"));
        assert!(is_rate_limited("error code -32005: limit exceeded"));
        assert!(!is_rate_limited("connection refused"));
    }

    #[test]
    fn exponential_backoff_doubles_and_caps() {
        let policy =
            RetryPolicy::exponential(10, Duration::from_secs(3), Duration::from_secs(30));

        // two consecutive errors: next wait is 4x the base interval
        assert_eq!(policy.delay_for(1), Duration::from_secs(6));
        assert_eq!(policy.delay_for(2), Duration::from_secs(12));
        // capped
        assert_eq!(policy.delay_for(4), Duration::from_secs(30));
        assert_eq!(policy.delay_for(30), Duration::from_secs(30));
    }

    #[test]
    fn fixed_delay_is_constant() {
        let policy = RetryPolicy::fixed(3, Duration::from_millis(500));
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(7), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn retries_until_success() {
        // not found twice, found on the third attempt: still succeeds
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy::fixed(3, Duration::from_millis(1));

        let result = with_retry(&policy, || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(AppError::ReceiptNotFound("0xdead".into()))
                } else {
                    Ok(42u64)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_attempts_return_last_error() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy::fixed(3, Duration::from_millis(1));

        let result: Result<(), _> = with_retry(&policy, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(AppError::ReceiptNotFound("0xdead".into())) }
        })
        .await;

        assert!(matches!(result, Err(AppError::ReceiptNotFound(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn non_rate_limit_transient_errors_wait_the_base_delay() {
        let policy =
            RetryPolicy::exponential(4, Duration::from_millis(100), Duration::from_secs(30));
        let start = tokio::time::Instant::now();

        let result: Result<(), _> = with_retry(&policy, || async {
            Err(AppError::Rpc("connection refused".into()))
        })
        .await;

        assert!(matches!(result, Err(AppError::Rpc(_))));
        // three retries, each after the fixed base delay, no doubling
        assert_eq!(start.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_errors_escalate_exponentially() {
        let policy =
            RetryPolicy::exponential(4, Duration::from_millis(100), Duration::from_secs(30));
        let start = tokio::time::Instant::now();

        let result: Result<(), _> = with_retry(&policy, || async {
            Err(AppError::Rpc("429 too many requests".into()))
        })
        .await;

        assert!(matches!(result, Err(AppError::Rpc(_))));
        // 200ms + 400ms + 800ms
        assert_eq!(start.elapsed(), Duration::from_millis(1400));
    }

    #[tokio::test]
    async fn non_retryable_errors_fail_fast() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy::fixed(5, Duration::from_millis(1));

        let result: Result<(), _> = with_retry(&policy, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(AppError::EventDecode("bad log".into())) }
        })
        .await;

        assert!(matches!(result, Err(AppError::EventDecode(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
