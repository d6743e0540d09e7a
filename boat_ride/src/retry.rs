use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};

use crate::providers::ProviderError;

#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Maximum number of attempts for one upstream call.
    pub max_attempts: u32,
    /// Base delay for exponential backoff.
    pub base_delay_ms: u64,
    /// Maximum jitter to add to backoff delay (as fraction of delay, e.g., 0.25 = ±25%).
    pub jitter_factor: f64,
    /// Per-attempt timeout.
    pub attempt_timeout: Duration,
}

impl RetryConfig {
    pub fn new(max_attempts: u32, base_delay_ms: u64) -> Self {
        RetryConfig {
            max_attempts,
            base_delay_ms,
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, attempt_timeout: Duration) -> Self {
        self.attempt_timeout = attempt_timeout;
        self
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: 4,
            base_delay_ms: 800,
            jitter_factor: 0.25,
            attempt_timeout: Duration::from_secs(25),
        }
    }
}

/// Run `func` until it succeeds, fails permanently or the attempt budget is spent.
///
/// Each attempt is bounded by `attempt_timeout`; an elapsed attempt counts as a
/// transient failure.
pub async fn with_retry<F, Fut, T>(label: &str, func: F, config: &RetryConfig) -> Result<T, ProviderError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let attempts = config.max_attempts.max(1);
    let mut last_err = ProviderError::Transient(format!("{}: no attempt made", label));

    for attempt in 0..attempts {
        let outcome = match timeout(config.attempt_timeout, func()).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(config.attempt_timeout)),
        };

        match outcome {
            Ok(result) => return Ok(result),
            Err(err) if err.is_retryable() => {
                log::warn!("{}: retryable error: {}", label, err);
                last_err = err;
                if attempt + 1 < attempts {
                    let delay = backoff_with_jitter(attempt, config);
                    log::warn!(
                        "{}: retry attempt {}/{} after {:?}",
                        label,
                        attempt + 1,
                        attempts - 1,
                        delay
                    );
                    sleep(delay).await;
                }
            }
            Err(err) => return Err(err),
        }
    }

    Err(last_err)
}

/// Calculate backoff delay with jitter for a given attempt.
///
/// Uses exponential backoff: base_delay * 2^attempt
/// Adds random jitter of ±jitter_factor to prevent thundering herd.
fn backoff_with_jitter(attempt: u32, config: &RetryConfig) -> Duration {
    let base_delay = config.base_delay_ms.saturating_mul(2u64.saturating_pow(attempt));
    let jitter_range = (base_delay as f64 * config.jitter_factor) as u64;
    let jitter = rand::rng().random_range(0..=jitter_range * 2) as i64 - jitter_range as i64;
    let delay_ms = (base_delay as i64 + jitter).max(0) as u64;
    Duration::from_millis(delay_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_delay_ms: 1,
            jitter_factor: 0.0,
            attempt_timeout: Duration::from_millis(200),
        }
    }

    #[test]
    fn test_backoff_doubles() {
        let config = fast_config(4);
        let config = RetryConfig {
            base_delay_ms: 100,
            ..config
        };
        assert_eq!(backoff_with_jitter(0, &config), Duration::from_millis(100));
        assert_eq!(backoff_with_jitter(1, &config), Duration::from_millis(200));
        assert_eq!(backoff_with_jitter(3, &config), Duration::from_millis(800));
    }

    #[test]
    fn test_backoff_jitter_bounds() {
        let config = RetryConfig {
            base_delay_ms: 1000,
            jitter_factor: 0.25,
            ..fast_config(4)
        };
        for _ in 0..50 {
            let delay = backoff_with_jitter(0, &config).as_millis();
            assert!((750..=1250).contains(&delay));
        }
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = with_retry(
            "test",
            || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(ProviderError::Transient("flaky".into()))
                } else {
                    Ok(n)
                }
            },
            &fast_config(4),
        )
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(
            "test",
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::Permanent("bad request".into()))
            },
            &fast_config(4),
        )
        .await;
        assert!(matches!(result, Err(ProviderError::Permanent(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_budget_exhausted_returns_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(
            "test",
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::Transient("down".into()))
            },
            &fast_config(3),
        )
        .await;
        assert!(matches!(result, Err(ProviderError::Transient(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_attempt() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig {
            attempt_timeout: Duration::from_millis(10),
            ..fast_config(2)
        };
        let result: Result<(), _> = with_retry(
            "test",
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                sleep(Duration::from_secs(5)).await;
                Ok(())
            },
            &config,
        )
        .await;
        assert!(matches!(result, Err(ProviderError::Timeout(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
