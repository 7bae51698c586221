//! Retry logic with exponential backoff for one-shot network operations.
//!
//! Retries stop as soon as the cancellation token fires or the operation
//! reports a cancellation; cancelled work is never retried.

use crate::errors::SpeedTestError;
use log::{debug, warn};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Default number of retry attempts.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Default base delay for exponential backoff (in milliseconds).
pub const DEFAULT_BASE_DELAY_MS: u64 = 100;

/// Maximum delay cap for exponential backoff (in milliseconds).
pub const DEFAULT_MAX_DELAY_MS: u64 = 1000;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not including the initial attempt).
    pub max_retries: u32,
    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
        }
    }
}

impl RetryConfig {
    /// Create a new retry configuration.
    pub fn new(
        max_retries: u32,
        base_delay_ms: u64,
        max_delay_ms: u64,
    ) -> Self {
        Self { max_retries, base_delay_ms, max_delay_ms }
    }

    /// Calculate the delay for a given attempt number using exponential
    /// backoff.
    ///
    /// The delay is calculated as: base_delay * 2^attempt, capped at max_delay.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_ms =
            self.base_delay_ms.saturating_mul(2u64.saturating_pow(attempt));
        let capped_delay_ms = delay_ms.min(self.max_delay_ms);
        Duration::from_millis(capped_delay_ms)
    }
}

/// Result of a retry operation.
#[derive(Debug)]
pub enum RetryResult<T> {
    /// Operation succeeded.
    Success(T),
    /// Operation failed after all retries.
    Failed {
        /// The last error that occurred.
        last_error: SpeedTestError,
        /// Number of attempts made.
        attempts: u32,
    },
    /// Cancellation was observed before the operation could succeed.
    Cancelled,
}

/// Sleep for `duration` unless `cancel` fires first.
pub async fn cancellable_sleep(
    cancel: &CancellationToken,
    duration: Duration,
) -> Result<(), SpeedTestError> {
    if duration.is_zero() {
        return if cancel.is_cancelled() {
            Err(SpeedTestError::cancelled())
        } else {
            Ok(())
        };
    }

    tokio::select! {
        _ = cancel.cancelled() => Err(SpeedTestError::cancelled()),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

/// Execute an async operation with retry logic and exponential backoff.
///
/// # Arguments
/// * `config` - Retry configuration
/// * `operation_name` - Name of the operation for logging
/// * `cancel` - Token observed between attempts and during backoff
/// * `f` - Async function that returns a Result
///
/// # Returns
/// RetryResult indicating success, failure with attempt count, or
/// cancellation
pub async fn retry_async<T, F, Fut>(
    config: &RetryConfig,
    operation_name: &str,
    cancel: &CancellationToken,
    mut f: F,
) -> RetryResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SpeedTestError>>,
{
    let mut last_error: Option<SpeedTestError> = None;
    let total_attempts = config.max_retries + 1;

    for attempt in 0..total_attempts {
        if attempt > 0 {
            let delay = config.delay_for_attempt(attempt - 1);
            debug!(
                "{}: Retry attempt {}/{} after {:?} delay",
                operation_name, attempt, config.max_retries, delay
            );
            if cancellable_sleep(cancel, delay).await.is_err() {
                return RetryResult::Cancelled;
            }
        }

        if cancel.is_cancelled() {
            return RetryResult::Cancelled;
        }

        match f().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!(
                        "{}: Succeeded on attempt {}",
                        operation_name,
                        attempt + 1
                    );
                }
                return RetryResult::Success(result);
            }
            Err(e) if e.is_cancelled() => return RetryResult::Cancelled,
            Err(e) => {
                if attempt < config.max_retries {
                    warn!(
                        "{}: Attempt {} failed: {}",
                        operation_name,
                        attempt + 1,
                        e.message
                    );
                } else {
                    warn!(
                        "{}: All {} attempts failed. Last error: {}",
                        operation_name, total_attempts, e.message
                    );
                }
                last_error = Some(e);
            }
        }
    }

    match last_error {
        Some(last_error) => {
            RetryResult::Failed { last_error, attempts: total_attempts }
        }
        None => RetryResult::Cancelled,
    }
}
