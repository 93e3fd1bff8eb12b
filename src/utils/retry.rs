use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Exponential backoff schedule: `base_delay`, then doubling, for at most
/// `max_retries` retries after the first attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_retries: usize,
}

impl RetryPolicy {
    pub const fn new(base_delay: Duration, max_retries: usize) -> Self {
        Self {
            base_delay,
            max_retries,
        }
    }

    pub fn delay_for(&self, retry: usize) -> Duration {
        let factor = 1u32.checked_shl(retry.min(16) as u32).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

/// Runs `call` until it succeeds, fails with an error `should_retry`
/// rejects, or the retry budget is spent. The last error is returned as-is.
pub async fn with_retry<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    operation: &str,
    should_retry: P,
    mut call: F,
) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let mut retry = 0usize;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) if retry < policy.max_retries && should_retry(&err) => {
                let delay = policy.delay_for(retry);
                retry += 1;
                warn!(
                    "{} failed with a retryable error: {} (retry {}/{} in {} ms)",
                    operation,
                    err,
                    retry,
                    policy.max_retries,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    enum TestError {
        Busy,
        Broken,
    }

    impl Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                TestError::Busy => write!(f, "busy"),
                TestError::Broken => write!(f, "broken"),
            }
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::new(Duration::from_millis(1), 3)
    }

    #[test]
    fn delay_doubles_per_retry() {
        let policy = RetryPolicy::new(Duration::from_millis(2000), 3);
        assert_eq!(policy.delay_for(0), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(1), Duration::from_millis(4000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(8000));
    }

    #[tokio::test]
    async fn retries_retryable_errors_until_success() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let result: Result<&str, TestError> = with_retry(
            &fast_policy(),
            "test",
            |err| matches!(err, TestError::Busy),
            move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(TestError::Busy)
                } else {
                    Ok("done")
                }
            },
        )
        .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_budget_is_spent() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let result: Result<(), TestError> = with_retry(
            &fast_policy(),
            "test",
            |err| matches!(err, TestError::Busy),
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TestError::Busy)
            },
        )
        .await;
        assert!(matches!(result, Err(TestError::Busy)));
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn other_errors_propagate_immediately() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let result: Result<(), TestError> = with_retry(
            &fast_policy(),
            "test",
            |err| matches!(err, TestError::Busy),
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TestError::Broken)
            },
        )
        .await;
        assert!(matches!(result, Err(TestError::Broken)));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
