//! Retry-with-backoff helper for transient platform errors
//!
//! Retries an operation while the caller's predicate says the error is
//! retryable, doubling the delay after each attempt.

use std::future::Future;
use std::time::Duration;

/// Run `op`, retrying up to `max_retries` times while `retryable(&err)`
/// holds. The delay starts at `initial_delay` and doubles per retry.
pub async fn with_backoff<T, E, F, Fut, P>(
    mut op: F,
    retryable: P,
    max_retries: u32,
    initial_delay: Duration,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let mut retries = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if retries < max_retries && retryable(&e) => {
                let delay = initial_delay * 2u32.pow(retries);
                println!(
                    "[backoff] Retryable error, attempt {}/{}, waiting {:?}",
                    retries + 1,
                    max_retries,
                    delay
                );
                tokio::time::sleep(delay).await;
                retries += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, PartialEq)]
    enum TestError {
        Transient,
        Fatal,
    }

    #[tokio::test]
    async fn test_succeeds_after_retries() {
        let attempts = AtomicU32::new(0);
        let result: Result<u32, TestError> = with_backoff(
            || async {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(TestError::Transient)
                } else {
                    Ok(7)
                }
            },
            |e| *e == TestError::Transient,
            3,
            Duration::from_millis(1),
        )
        .await;

        assert_eq!(result, Ok(7));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_immediately() {
        let attempts = AtomicU32::new(0);
        let result: Result<u32, TestError> = with_backoff(
            || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(TestError::Fatal)
            },
            |e| *e == TestError::Transient,
            3,
            Duration::from_millis(1),
        )
        .await;

        assert_eq!(result, Err(TestError::Fatal));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let attempts = AtomicU32::new(0);
        let result: Result<u32, TestError> = with_backoff(
            || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(TestError::Transient)
            },
            |e| *e == TestError::Transient,
            2,
            Duration::from_millis(1),
        )
        .await;

        assert_eq!(result, Err(TestError::Transient));
        // Initial attempt plus two retries
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
