//! Uniform retry wrapper for recoverable operations.
//!
//! Character-backend calls retry transient server errors once after a
//! fixed 2-second backoff; test administrations retry malformed output up
//! to three times with no backoff. Both go through this single wrapper
//! instead of duplicating try/retry blocks at every call site.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::Result;

/// Runs `op` up to `max_attempts` times, sleeping `backoff` between
/// attempts.
///
/// Only errors whose [`is_retryable`](crate::EmobenchError::is_retryable)
/// predicate holds are retried; any other error, and the final failure
/// once attempts are exhausted, propagates to the caller.
pub async fn retry_transient<T, F, Fut>(max_attempts: u32, backoff: Duration, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    debug_assert!(max_attempts >= 1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                warn!(attempt, max_attempts, error = %err, "retryable failure, backing off");
                if !backoff.is_zero() {
                    tokio::time::sleep(backoff).await;
                }
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
