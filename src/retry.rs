// Bounded exponential backoff for transient backend calls (spec.md §7),
// grounded on the teacher's `RetryableStorage` wrapper (`wrappers.rs`): the
// same attempt-count/base-delay/max-delay shape and jittered exponential
// backoff loop, generalized here into one helper used at each vector/graph/
// embedding call site instead of a per-method wrapper struct.

use std::time::Duration;

use tracing::{info, warn};

use crate::errors::Result;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(100);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(5);

/// Retries `f` with the daemon's default backoff schedule (3 attempts,
/// 100ms base delay doubling up to a 5s cap, plus jitter), stopping early on
/// the first error `ConduitError::is_retryable` reports as non-transient.
pub async fn with_retry<T, F, Fut>(operation: &str, f: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    with_retry_config(operation, DEFAULT_MAX_ATTEMPTS, DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY, f).await
}

/// Same as [`with_retry`] with an explicit schedule.
pub async fn with_retry_config<T, F, Fut>(
    operation: &str,
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    f: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0;
    let mut delay = base_delay;

    loop {
        attempt += 1;
        match f().await {
            Ok(value) => {
                if attempt > 1 {
                    info!(operation, attempt, "operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if !err.is_retryable() || attempt >= max_attempts => {
                if attempt > 1 {
                    warn!(operation, attempt, error = %err, "operation failed after retries");
                }
                return Err(err);
            }
            Err(err) => {
                warn!(operation, attempt, max_attempts, error = %err, "retrying after transient failure");
                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * 2, max_delay);
                let jitter = Duration::from_millis(rand::random::<u64>() % 50);
                delay += jitter;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ConduitError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_until_success_within_attempt_cap() {
        let calls = AtomicU32::new(0);
        let result = with_retry("test", || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(ConduitError::VectorUnavailable("transient".to_string()))
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_errors_fail_fast() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry("test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ConduitError::ValidationError("bad input".to_string()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry("test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ConduitError::GraphUnavailable("still down".to_string()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
