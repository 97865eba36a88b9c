//! Bounded retry for storage operations.

use std::time::Duration;

use crate::{Error, Result};

/// Backoff before the single retry, in milliseconds.
pub const RETRY_BACKOFF_MS: u64 = 50;

/// Runs a storage operation, retrying once after a short backoff.
///
/// A second failure is surfaced as [`Error::StorageUnavailable`], which
/// callers treat as "context is now best-effort degraded" rather than
/// fatal. The retry budget is deliberately one attempt: transient `SQLite`
/// lock contention clears quickly, and anything slower should degrade
/// instead of stalling the request.
///
/// # Errors
///
/// Returns [`Error::StorageUnavailable`] when both attempts fail.
pub fn with_retry<T, F>(operation: &'static str, mut call: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    match call() {
        Ok(value) => Ok(value),
        Err(first) => {
            tracing::warn!(operation, error = %first, "storage operation failed, retrying once");
            metrics::counter!("stratacog_storage_retry_total", "operation" => operation)
                .increment(1);
            std::thread::sleep(Duration::from_millis(RETRY_BACKOFF_MS));
            call().map_err(|second| {
                metrics::counter!(
                    "stratacog_storage_unavailable_total",
                    "operation" => operation
                )
                .increment(1);
                Error::StorageUnavailable {
                    operation: operation.to_string(),
                    cause: second.to_string(),
                }
            })
        }
    }
}
