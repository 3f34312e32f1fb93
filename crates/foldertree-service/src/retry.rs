//! Retry of operations aborted by a transient failure.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use foldertree_core::error::AppError;
use foldertree_core::result::AppResult;

/// Delay ceiling of the first retry.
const BASE_DELAY_MS: u64 = 25;
/// Upper bound for any single delay.
const MAX_DELAY_MS: u64 = 1_000;

/// Delay before retry number `attempt` (starting at 1): exponential with
/// full jitter in the upper half, so contending writers spread out.
pub fn backoff(attempt: u32) -> Duration {
    let ceiling = BASE_DELAY_MS
        .saturating_mul(1 << attempt.min(6))
        .min(MAX_DELAY_MS);
    let floor = ceiling / 2;
    Duration::from_millis(floor + rand::random_range(0..=ceiling - floor))
}

/// Run `op`, re-running it while it fails with a retryable error, at most
/// `retries` extra times.
///
/// Mutations are all-or-nothing, so an aborted attempt left nothing behind
/// and the next one starts from a clean slate.
pub async fn retry_transient<T, F, Fut>(retries: u32, operation: &str, op: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    retry_when(retries, operation, AppError::is_retryable, op).await
}

/// Run `op`, re-running it after a jittered backoff while `should_retry`
/// accepts the error, at most `retries` extra times.
pub async fn retry_when<T, F, Fut, P>(
    retries: u32,
    operation: &str,
    should_retry: P,
    mut op: F,
) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
    P: Fn(&AppError) -> bool,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Err(err) if should_retry(&err) && attempt < retries => {
                attempt += 1;
                let delay = backoff(attempt);
                warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Operation failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use foldertree_core::error::ErrorKind;
    use tokio::time::Instant;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_retries_transaction_errors_until_success() {
        let calls = AtomicU32::new(0);
        let result = retry_transient(3, "move", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(AppError::transaction("deadlock detected"))
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_retry_budget() {
        let calls = AtomicU32::new(0);
        let result: AppResult<()> = retry_transient(2, "create", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AppError::transaction("serialization failure"))
        })
        .await;
        assert_eq!(result.unwrap_err().kind, ErrorKind::Transaction);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_does_not_retry_invalid_move() {
        let calls = AtomicU32::new(0);
        let result: AppResult<()> = retry_transient(5, "move", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AppError::invalid_move("cycle"))
        })
        .await;
        assert_eq!(result.unwrap_err().kind, ErrorKind::InvalidMove);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_grows_within_bounds() {
        for attempt in 1..=10 {
            let delay = backoff(attempt).as_millis() as u64;
            let ceiling = (BASE_DELAY_MS << attempt.min(6)).min(MAX_DELAY_MS);
            assert!(delay >= ceiling / 2 && delay <= ceiling, "{attempt}: {delay}");
        }
        assert!(backoff(20) <= Duration::from_millis(MAX_DELAY_MS));
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_between_attempts() {
        let calls = AtomicU32::new(0);
        let started = Instant::now();
        let result = retry_transient(2, "move", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(AppError::transaction("deadlock detected"))
            } else {
                Ok(())
            }
        })
        .await;
        assert!(result.is_ok());
        assert!(started.elapsed() >= Duration::from_millis(BASE_DELAY_MS + BASE_DELAY_MS * 2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_when_uses_predicate() {
        let calls = AtomicU32::new(0);
        let result: AppResult<()> = retry_when(
            2,
            "cleanup",
            |_| true,
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AppError::external_service("unavailable"))
            },
        )
        .await;
        assert_eq!(result.unwrap_err().kind, ErrorKind::ExternalService);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
