//! The retry combinator.
//!
//! Every ad-hoc retry site in the system (provider 429 handling, peer posts,
//! downstream submission) goes through this one function, parameterized by a
//! predicate and a backoff policy, instead of growing its own loop.

use attestor_types::error::OracleError;
use std::future::Future;
use std::time::Duration;

/// Backoff shape for [`retry`]: doubling delays between attempts, capped.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Ceiling on the doubling delay.
    pub max_delay: Duration,
    /// Total attempts, the initial call included.
    pub max_attempts: u32,
}

impl RetryPolicy {
    /// The provider backoff of the rate limiter: 500 ms doubling to a 15 s
    /// cap, one retry per call site.
    pub fn provider_backoff() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(15),
            max_attempts: 2,
        }
    }

    /// Backoff for transient downstream-chain failures.
    pub fn submission_backoff() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(15),
            max_attempts: 4,
        }
    }
}

/// Runs `op`, retrying while `should_retry` approves the error and attempts
/// remain. On exhaustion the original error propagates unchanged.
pub async fn retry<T, F, Fut, P>(
    policy: RetryPolicy,
    should_retry: P,
    mut op: F,
) -> Result<T, OracleError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, OracleError>>,
    P: Fn(&OracleError) -> bool,
{
    let mut delay = policy.base_delay;
    let mut attempt = 1u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= policy.max_attempts.max(1) || !should_retry(&err) {
                    return Err(err);
                }
                tracing::debug!(
                    target: "retry",
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying after backoff"
                );
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(policy.max_delay);
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn transient(err: &OracleError) -> bool {
        matches!(err, OracleError::Transport(_))
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_without_retrying() {
        let calls = AtomicU32::new(0);
        let out = retry(RetryPolicy::provider_backoff(), transient, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, OracleError>(7) }
        })
        .await
        .unwrap();
        assert_eq!(out, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_exhaustion_and_keeps_original_error() {
        let calls = AtomicU32::new(0);
        let err = retry(RetryPolicy::submission_backoff(), transient, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(OracleError::Transport("connection refused".into())) }
        })
        .await
        .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(matches!(err, OracleError::Transport(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn unapproved_errors_fail_fast() {
        let calls = AtomicU32::new(0);
        let err = retry(RetryPolicy::provider_backoff(), transient, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(OracleError::Validation("bad".into())) }
        })
        .await
        .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, OracleError::Validation(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn delay_doubles_up_to_the_cap() {
        let started = tokio::time::Instant::now();
        let _ = retry(
            RetryPolicy {
                base_delay: Duration::from_millis(500),
                max_delay: Duration::from_secs(15),
                max_attempts: 3,
            },
            transient,
            || async { Err::<(), _>(OracleError::Transport("x".into())) },
        )
        .await;
        // 500ms + 1000ms of backoff across the two retries.
        assert!(started.elapsed() >= Duration::from_millis(1500));
    }
}
