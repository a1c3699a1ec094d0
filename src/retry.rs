//! Bounded retry with exponential backoff for concurrent-modification conflicts.
//!
//! Only [`Error::Conflict`] is retried. Every other error, and a conflict seen
//! once the retry limit is used up, is returned to the caller unchanged.

use std::{future::Future, time::Duration};

use crate::error::Error;

/// Fixed configuration of a retry chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, bon::Builder)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt.
    pub retry_limit: u32,
    /// Base of the exponential backoff.
    pub exponent_base: u32,
    /// Length of one backoff time unit.
    #[builder(default = Duration::from_millis(1))]
    pub unit: Duration,
}

impl RetryPolicy {
    /// Wait before the retry that follows `attempt` previous retries: `unit * base^attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.unit
            .saturating_mul(self.exponent_base.saturating_pow(attempt))
    }
}

/// Retries made so far by one logical mutation.
///
/// Each mutation gets its own state; unrelated mutations never share a counter.
#[derive(Debug, Default)]
pub struct RetryState {
    attempts: u32,
}

impl RetryState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// Runs `op` until it succeeds, fails with a non-conflict error, or the policy's
/// retry limit is exhausted.
///
/// `op` is called from scratch on every attempt, so it must re-read any remote
/// state it depends on.
pub async fn retry_on_conflict<T, F, Fut>(
    policy: &RetryPolicy,
    state: &mut RetryState,
    mut op: F,
) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_conflict() && state.attempts < policy.retry_limit => {
                let wait = policy.backoff(state.attempts);
                tracing::warn!(
                    attempt = state.attempts,
                    ?wait,
                    error = %e,
                    "Conflict, backing off before retrying"
                );
                tokio::time::sleep(wait).await;
                state.attempts += 1;
            }
            Err(e) => {
                if e.is_conflict() {
                    tracing::error!(attempts = state.attempts, "Retry limit exhausted");
                }
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn policy(retry_limit: u32) -> RetryPolicy {
        RetryPolicy::builder()
            .retry_limit(retry_limit)
            .exponent_base(2)
            .build()
    }

    #[test]
    fn test_backoff_is_exponential() {
        let policy = policy(3);

        assert_eq!(policy.backoff(0), Duration::from_millis(1));
        assert_eq!(policy.backoff(1), Duration::from_millis(2));
        assert_eq!(policy.backoff(2), Duration::from_millis(4));
    }

    #[test]
    fn test_backoff_unit() {
        let policy = RetryPolicy::builder()
            .retry_limit(3)
            .exponent_base(3)
            .unit(Duration::from_secs(1))
            .build();

        assert_eq!(policy.backoff(2), Duration::from_secs(9));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_conflicts() {
        let calls = AtomicU32::new(0);
        let mut state = RetryState::new();
        let start = tokio::time::Instant::now();

        let result = retry_on_conflict(&policy(3), &mut state, || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(Error::conflict("fn", "update in progress"))
            } else {
                Ok("done")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(state.attempts(), 2);
        assert!(start.elapsed() >= Duration::from_millis(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_limit() {
        let calls = AtomicU32::new(0);
        let mut state = RetryState::new();

        let result: Result<(), _> = retry_on_conflict(&policy(3), &mut state, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::conflict("fn", "update in progress"))
        })
        .await;

        assert!(matches!(result, Err(Error::Conflict { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(state.attempts(), 3);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let mut state = RetryState::new();

        let result: Result<(), _> = retry_on_conflict(&policy(3), &mut state, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::configuration("fn", eyre::eyre!("access denied")))
        })
        .await;

        assert!(matches!(result, Err(Error::Configuration { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(state.attempts(), 0);
    }

    #[tokio::test]
    async fn test_zero_limit_never_retries() {
        let calls = AtomicU32::new(0);
        let mut state = RetryState::new();

        let result: Result<(), _> = retry_on_conflict(&policy(0), &mut state, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::conflict("fn", "update in progress"))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
