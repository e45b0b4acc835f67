//! Retry logic with exponential backoff for transient errors.

use crate::error::Error;
use crate::types::RetryConfig;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Callback trait for retry progress notifications.
pub trait RetryCallback: Send + Sync {
    /// Called when an operation is about to be retried.
    ///
    /// # Arguments
    /// * `attempt` - The attempt that just failed (1-indexed)
    /// * `max_attempts` - Maximum number of attempts
    /// * `error` - Rendered error that triggered the retry
    /// * `delay` - Time until the next attempt
    fn on_retry(&self, attempt: u32, max_attempts: u32, error: &str, delay: Duration);
}

/// No-op callback that does nothing.
#[derive(Debug)]
pub struct NoCallback;

impl RetryCallback for NoCallback {
    fn on_retry(&self, _attempt: u32, _max_attempts: u32, _error: &str, _delay: Duration) {}
}

/// Callback that logs retry information at warn level.
#[derive(Debug)]
pub struct LogCallback;

impl RetryCallback for LogCallback {
    fn on_retry(&self, attempt: u32, max_attempts: u32, error: &str, delay: Duration) {
        log::warn!(
            "Attempt {}/{} failed: {}. Retrying in {}ms...",
            attempt,
            max_attempts,
            error,
            delay.as_millis()
        );
    }
}

/// Execute an async operation with exponential backoff.
///
/// Retries while `is_retryable(&error)` holds and the attempt budget
/// remains. Non-retryable errors and the error of the final attempt are
/// returned unchanged.
///
/// # Arguments
/// * `config` - Retry configuration
/// * `callback` - Optional callback for retry notifications
/// * `operation` - Produces a fresh future for each attempt
/// * `is_retryable` - Classifies failures
pub async fn with_backoff<T, E, F, Fut, P>(
    config: &RetryConfig,
    callback: Option<&dyn RetryCallback>,
    mut operation: F,
    is_retryable: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !is_retryable(&e) || attempt + 1 >= max_attempts {
                    return Err(e);
                }

                let delay = config.next_delay(attempt);
                if let Some(cb) = callback {
                    cb.on_retry(attempt + 1, max_attempts, &e.to_string(), delay);
                }

                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Execute a provider operation, retrying the transient [`Error`] kinds.
pub async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    callback: Option<&dyn RetryCallback>,
    operation: F,
) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    with_backoff(config, callback, operation, Error::is_retryable).await
}

/// Execute with the default config and log-based notifications.
pub async fn with_retry_simple<T, F, Fut>(operation: F) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    with_retry(&RetryConfig::default(), Some(&LogCallback), operation).await
}
