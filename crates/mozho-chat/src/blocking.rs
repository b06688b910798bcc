use std::future::Future;
use std::time::Duration;

use tracing::{error, warn};

use crate::error::{ChatError, ChatResult, StoreError};

/// Run a synchronous storage call on the blocking pool, giving up after
/// `limit`. A timed-out call is not cancelled, only no longer awaited.
pub async fn run_blocking<T, F>(limit: Duration, f: F) -> ChatResult<T>
where
    F: FnOnce() -> ChatResult<T> + Send + 'static,
    T: Send + 'static,
{
    spawn_with_limit(limit, f, ChatError::Timeout).await
}

/// Like [`run_blocking`] for writes that are not safe to repeat. The call may
/// still commit after the deadline, so elapsing reports
/// [`ChatError::OutcomeUnknown`] instead of the retryable `Timeout`.
pub async fn run_blocking_write<T, F>(limit: Duration, f: F) -> ChatResult<T>
where
    F: FnOnce() -> ChatResult<T> + Send + 'static,
    T: Send + 'static,
{
    spawn_with_limit(limit, f, ChatError::OutcomeUnknown).await
}

async fn spawn_with_limit<T, F>(limit: Duration, f: F, elapsed: ChatError) -> ChatResult<T>
where
    F: FnOnce() -> ChatResult<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::time::timeout(limit, tokio::task::spawn_blocking(f)).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => {
            error!("spawn_blocking join error: {}", e);
            Err(ChatError::StorageUnavailable(format!("storage task failed: {e}")))
        }
        Err(_) => {
            warn!(limit_ms = limit.as_millis() as u64, kind = elapsed.kind(), "storage call timed out");
            Err(elapsed)
        }
    }
}

/// Bound an async storage call by `limit`.
pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            warn!(limit_ms = limit.as_millis() as u64, "object store call timed out");
            Err(StoreError::Timeout)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_the_closure_result() {
        let value = run_blocking(Duration::from_secs(1), || Ok(41 + 1)).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn slow_call_times_out() {
        let result = run_blocking(Duration::from_millis(20), || {
            std::thread::sleep(Duration::from_millis(200));
            Ok(())
        })
        .await;
        assert_eq!(result, Err(ChatError::Timeout));
    }

    #[tokio::test]
    async fn slow_write_reports_unknown_outcome() {
        let result = run_blocking_write(Duration::from_millis(20), || {
            std::thread::sleep(Duration::from_millis(200));
            Ok(())
        })
        .await;
        assert_eq!(result, Err(ChatError::OutcomeUnknown));
        assert!(!ChatError::OutcomeUnknown.is_retryable());
    }

    #[tokio::test]
    async fn write_errors_inside_the_deadline_pass_through() {
        let result: ChatResult<()> =
            run_blocking_write(Duration::from_secs(1), || Err(ChatError::Timeout)).await;
        assert_eq!(result, Err(ChatError::Timeout));
    }

    #[tokio::test]
    async fn panicking_call_is_unavailable_not_a_crash() {
        let result: ChatResult<()> =
            run_blocking(Duration::from_secs(1), || panic!("boom")).await;
        assert!(matches!(result, Err(ChatError::StorageUnavailable(_))));
    }

    #[tokio::test]
    async fn async_timeout_maps_to_store_timeout() {
        let result: Result<(), StoreError> = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        })
        .await;
        assert_eq!(result, Err(StoreError::Timeout));
    }
}
