use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use super::classification::ErrorClassification;
use super::types::ScanError;
use tracing::warn;

const MAX_BACKOFF_MS: u64 = 10_000;

impl ErrorClassification {
    /// Calculate the retry delay for this error classification based on the
    /// current attempt number (0-indexed).
    ///
    /// Exponential backoff `base_ms * 2^attempt` plus up to 25% random jitter,
    /// capped at 10s. A zero base disables the delay entirely.
    pub fn retry_delay(&self, attempt: u32, base_ms: u64) -> Duration {
        if base_ms == 0 {
            return Duration::ZERO;
        }
        let exp = base_ms.saturating_mul(1u64 << attempt.min(16));
        let jitter = (exp as f64 * 0.25 * rand::random::<f64>()) as u64;
        Duration::from_millis(exp.saturating_add(jitter).min(MAX_BACKOFF_MS))
    }
}

/// Retry configuration for page loads.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_ms: 500,
        }
    }
}

/// Boxed future returned by a retry factory, borrowing the retried state.
pub type AttemptFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ScanError>> + Send + 'a>>;

/// Execute an async operation with retry logic.
///
/// `state` is lent to every attempt, so the operation can drive a browser
/// or other exclusively-owned resource. Retries only if the error is
/// classified as retryable and we haven't exceeded max_retries.
pub async fn with_retry<S, T, F>(
    operation_name: &str,
    config: &RetryConfig,
    state: &mut S,
    mut factory: F,
) -> Result<T, ScanError>
where
    S: ?Sized,
    F: for<'a> FnMut(&'a mut S) -> AttemptFuture<'a, T>,
{
    let max_attempts = config.max_retries + 1;
    let mut last_error = None;

    for attempt in 0..max_attempts {
        match factory(&mut *state).await {
            Ok(result) => return Ok(result),
            Err(e) => {
                let classification = e.classify();

                if !classification.retryable() || attempt + 1 >= max_attempts {
                    if !classification.retryable() {
                        warn!(
                            operation = operation_name,
                            error_type = classification.error_type,
                            "Non-retryable error, failing immediately"
                        );
                    } else {
                        warn!(
                            operation = operation_name,
                            attempt = attempt + 1,
                            max = max_attempts,
                            "Max retries exhausted"
                        );
                    }
                    return Err(e);
                }

                let delay = classification.retry_delay(attempt, config.backoff_ms);
                warn!(
                    operation = operation_name,
                    attempt = attempt + 1,
                    max = max_attempts,
                    error_type = classification.error_type,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retrying after error"
                );

                tokio::time::sleep(delay).await;
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| ScanError::Internal("Retry loop exited unexpectedly".into())))
}
