use crate::error::GridError;
use std::future::Future;
use std::time::Duration;

const INITIAL_DELAY_MS: u64 = 100;
const BACKOFF_FACTOR: u32 = 2;
const MAX_DELAY: Duration = Duration::from_secs(2);

/// Retries `op` with exponential backoff, but only for `GridError::ProviderError`
/// — every other variant is treated as non-transient and returned immediately.
pub async fn with_retry<T, F, Fut>(max_retries: u32, mut op: F) -> Result<T, GridError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GridError>>,
{
    let mut attempt = 0;
    let mut delay = Duration::from_millis(INITIAL_DELAY_MS);
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(GridError::ProviderError(msg)) if attempt < max_retries => {
                tracing::warn!(attempt, %msg, "retrying after provider error");
                tokio::time::sleep(delay).await;
                delay = (delay * BACKOFF_FACTOR).min(MAX_DELAY);
                attempt += 1;
            }
            Err(other) => return Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_without_retry() {
        let calls = AtomicU32::new(0);
        let result = with_retry(3, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, GridError>(42) }
        })
        .await
        .unwrap();
        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_errors_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = with_retry(3, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(GridError::ProviderError("transient".into()))
                } else {
                    Ok(7)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(result, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_non_transient_errors() {
        let calls = AtomicU32::new(0);
        let result: Result<i32, _> = with_retry(3, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(GridError::AccessDenied("nope".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
