// ABOUTME: Bounded retry-with-backoff wrapper for storage/event-bus calls that surface `ErrorCode::Transient`
// ABOUTME: Retries only transient errors; anything else (NotFound, InvalidInput, ...) returns on the first attempt
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use std::future::Future;

use crate::errors::{AppError, ErrorCode};

/// Maximum number of attempts for a retried operation, including the first.
const MAX_ATTEMPTS: u32 = 3;

/// Base delay for exponential backoff between attempts.
const BASE_DELAY_MS: u64 = 50;

/// Run `op`, retrying up to [`MAX_ATTEMPTS`] times while it keeps returning
/// [`ErrorCode::Transient`] errors, with exponential backoff between
/// attempts. Any other error code is returned immediately without retrying,
/// since those already indicate the request itself (not the subsystem) is
/// the problem.
///
/// # Errors
///
/// Returns the last error `op` produced once attempts are exhausted, or
/// immediately on any non-transient error.
pub async fn with_retry<T, F, Fut>(mut op: F) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.code == ErrorCode::Transient && attempt < MAX_ATTEMPTS => {
                let delay = BASE_DELAY_MS * 2u64.pow(attempt - 1);
                tracing::debug!(attempt, delay_ms = delay, error = %err, "retrying transient error");
                tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[tokio::test]
    async fn succeeds_without_retry_when_first_attempt_is_ok() {
        let calls = AtomicU32::new(0);
        let result = with_retry(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, AppError>(42)
        })
        .await;
        assert_eq!(result.unwrap_or_else(|e| panic!("{e}")), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_errors_up_to_max_attempts() {
        let calls = AtomicU32::new(0);
        let result = with_retry(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<i32, _>(AppError::transient("storage unavailable"))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }

    #[tokio::test]
    async fn recovers_if_a_later_attempt_succeeds() {
        let calls = AtomicU32::new(0);
        let result = with_retry(|| async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 1 {
                Err(AppError::transient("storage unavailable"))
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(result.unwrap_or_else(|e| panic!("{e}")), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn does_not_retry_non_transient_errors() {
        let calls = AtomicU32::new(0);
        let result = with_retry(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<i32, _>(AppError::not_found("no such item"))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
