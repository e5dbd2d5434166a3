//! Retry utilities
//!
//! Two flavours of retry live here:
//!
//! - [`retry_with_backoff`] sleeps with exponential backoff and jitter between
//!   attempts. Used for startup work such as CRD installation.
//! - [`retry_on_conflict`] retries immediately, and only on
//!   [`Error::Conflict`]. Record writes use it so a stale `resourceVersion`
//!   is resolved inside the same reconciliation.
//!
//! [`backoff_delay`] is the deterministic curve shared with the controller's
//! failure backoff.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{error, warn};

use crate::Error;

/// Configuration for operations that may fail transiently
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Maximum number of attempts (0 = infinite)
    pub max_attempts: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Create a config with a maximum number of attempts
    pub fn with_max_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            ..Default::default()
        }
    }
}

/// Delay before retry number `attempt` (0-based), capped at `max`
pub fn backoff_delay(initial: Duration, multiplier: f64, attempt: u32, max: Duration) -> Duration {
    let factor = multiplier.powi(attempt.min(32) as i32);
    let secs = (initial.as_secs_f64() * factor).min(max.as_secs_f64());
    Duration::from_secs_f64(secs)
}

/// Execute an async operation with exponential backoff and jitter
///
/// Retries until success, or until `max_attempts` is reached when set.
/// Returns the last error once attempts are exhausted.
pub async fn retry_with_backoff<F, Fut, T, E>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0u32;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                attempt += 1;
                if config.max_attempts > 0 && attempt >= config.max_attempts {
                    error!(
                        operation = %operation_name,
                        attempt,
                        error = %e,
                        "operation failed after max retries"
                    );
                    return Err(e);
                }

                let delay = backoff_delay(
                    config.initial_delay,
                    config.backoff_multiplier,
                    attempt - 1,
                    config.max_delay,
                );
                // 0.5x to 1.5x
                let jitter = rand::thread_rng().gen_range(0.5..1.5);
                let jittered_delay = Duration::from_secs_f64(delay.as_secs_f64() * jitter);

                warn!(
                    operation = %operation_name,
                    attempt,
                    error = %e,
                    delay_ms = jittered_delay.as_millis(),
                    "operation failed, retrying"
                );

                tokio::time::sleep(jittered_delay).await;
            }
        }
    }
}

/// Retry a record write while it keeps hitting optimistic-concurrency conflicts
///
/// `operation` receives the 1-based attempt number; from attempt 2 on it is
/// expected to re-read the record before writing. Any error other than
/// [`Error::Conflict`] is returned at once, as is the last conflict when
/// `max_attempts` runs out.
pub async fn retry_on_conflict<F, Fut, T>(
    max_attempts: u32,
    operation_name: &str,
    mut operation: F,
) -> Result<T, Error>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1u32;

    loop {
        match operation(attempt).await {
            Err(e) if e.is_conflict() && attempt < max_attempts => {
                warn!(
                    operation = %operation_name,
                    attempt,
                    error = %e,
                    "conflicting write, re-reading record"
                );
                attempt += 1;
            }
            other => return other,
        }
    }
}
