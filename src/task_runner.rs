//! Task Runner with Circuit Breaker Pattern
//!
//! Provides automatic retry with exponential backoff and failure tracking
//! for background jobs such as the daily rollover.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{error, warn};

/// Circuit breaker configuration for background tasks
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures after which the task is abandoned
    pub max_consecutive_failures: u32,
    /// Initial delay between retries
    pub initial_retry_delay: Duration,
    /// Maximum delay between retries
    pub max_retry_delay: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 5,
            initial_retry_delay: Duration::from_secs(1),
            max_retry_delay: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("Task '{task_name}' exceeded maximum consecutive failures ({failures}). Last error: {last_error}")]
pub struct CircuitOpen {
    pub task_name: String,
    pub failures: u32,
    pub last_error: String,
}

/// Consecutive-failure count and the delay before the next attempt
#[derive(Debug)]
struct Backoff {
    failures: u32,
    delay: Duration,
}

impl Backoff {
    fn new(initial_delay: Duration) -> Self {
        Self {
            failures: 0,
            delay: initial_delay,
        }
    }

    /// Count a failure and double the delay, capped at `max_delay`.
    fn fail(&mut self, max_delay: Duration) {
        self.failures += 1;
        self.delay = (self.delay * 2).min(max_delay);
    }

    fn reset(&mut self, initial_delay: Duration) {
        self.failures = 0;
        self.delay = initial_delay;
    }
}

/// Run a background task with circuit breaker protection
///
/// `task_fn` runs one iteration of the task and is called again as soon as
/// it returns. Failures are retried with exponential backoff; after
/// `max_consecutive_failures` in a row the loop stops and returns
/// [`CircuitOpen`] so the caller decides how to degrade.
pub async fn run_with_circuit_breaker<F, Fut>(
    task_name: &str,
    config: CircuitBreakerConfig,
    mut task_fn: F,
) -> Result<(), CircuitOpen>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<(), String>>,
{
    let mut backoff = Backoff::new(config.initial_retry_delay);

    loop {
        match task_fn().await {
            Ok(()) => {
                if backoff.failures > 0 {
                    warn!("Task '{}' back to normal after {} failure(s)", task_name, backoff.failures);
                }
                backoff.reset(config.initial_retry_delay);
            }
            Err(e) => {
                backoff.fail(config.max_retry_delay);
                error!(
                    "Task '{}' failed ({}/{} in a row): {}",
                    task_name, backoff.failures, config.max_consecutive_failures, e
                );

                if backoff.failures >= config.max_consecutive_failures {
                    return Err(CircuitOpen {
                        task_name: task_name.to_string(),
                        failures: backoff.failures,
                        last_error: e,
                    });
                }

                warn!("Retrying task '{}' in {:?}", task_name, backoff.delay);
                sleep(backoff.delay).await;
            }
        }
    }
}

/// Time left until the next 00:00 UTC after `now`.
pub fn until_next_utc_midnight(now: DateTime<Utc>) -> Duration {
    let next_midnight = (now.date_naive() + ChronoDuration::days(1))
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .unwrap_or(now);
    (next_midnight - now).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_circuit_breaker_resets_on_success() {
        let attempt_count = Arc::new(AtomicUsize::new(0));
        let attempt_count_clone = attempt_count.clone();

        let config = CircuitBreakerConfig {
            max_consecutive_failures: 3,
            initial_retry_delay: Duration::from_millis(10),
            max_retry_delay: Duration::from_millis(100),
        };

        let handle = tokio::spawn(async move {
            run_with_circuit_breaker("test_task", config, || {
                let count = attempt_count_clone.fetch_add(1, Ordering::SeqCst);
                async move {
                    if count < 2 {
                        Err("Simulated failure".to_string())
                    } else {
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        Ok(())
                    }
                }
            })
            .await
        });

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!handle.is_finished());
        handle.abort();

        assert!(attempt_count.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn test_circuit_breaker_opens_on_max_failures() {
        let config = CircuitBreakerConfig {
            max_consecutive_failures: 3,
            initial_retry_delay: Duration::from_millis(1),
            max_retry_delay: Duration::from_millis(10),
        };

        let result = run_with_circuit_breaker("failing_task", config, || async {
            Err("Always fails".to_string())
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.failures, 3);
        assert_eq!(err.last_error, "Always fails");
        assert!(err
            .to_string()
            .contains("exceeded maximum consecutive failures"));
    }

    #[test]
    fn test_until_next_utc_midnight() {
        let now = Utc.with_ymd_and_hms(2024, 3, 5, 22, 30, 0).unwrap();
        assert_eq!(until_next_utc_midnight(now), Duration::from_secs(90 * 60));

        let midnight = Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap();
        assert_eq!(
            until_next_utc_midnight(midnight),
            Duration::from_secs(24 * 3600)
        );
    }
}
