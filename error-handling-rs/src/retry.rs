//! # Retry Mechanism
//!
//! Exponential backoff with jitter, used by the `retry_with_backoff`
//! remediation strategy and by callers of flaky collaborators.

use std::future::Future;
use std::time::Duration;

use metrics::{counter, histogram};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, warn};

/// Configuration for a retry policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt
    pub max_retries: usize,
    /// Base duration for exponential backoff
    pub base_backoff: Duration,
    /// Maximum backoff time
    pub max_backoff: Duration,
    /// Jitter factor (0.0 - 1.0) to add randomness to backoff
    pub jitter_factor: f64,
    /// Multiplier applied to every computed delay; 0.0 turns sleeping off
    pub delay_scale: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
            jitter_factor: 0.1,
            delay_scale: 1.0,
        }
    }
}

/// The outcome of a retried operation
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    pub result: Result<T, E>,
    /// Number of attempts made, including the first one
    pub attempts: usize,
    /// Total time spent sleeping between attempts
    pub total_backoff: Duration,
}

impl<T, E> RetryOutcome<T, E> {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// A named retry policy
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
    name: String,
}

impl RetryPolicy {
    pub fn new<S: Into<String>>(name: S, config: Option<RetryConfig>) -> Self {
        Self {
            config: config.unwrap_or_default(),
            name: name.into(),
        }
    }

    /// Creates a policy for operations that should never be retried
    pub fn never() -> Self {
        Self::new(
            "never",
            Some(RetryConfig {
                max_retries: 0,
                ..Default::default()
            }),
        )
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backoff before retry number `attempt` (0-based), before jitter and scaling
    pub fn base_delay(&self, attempt: usize) -> Duration {
        let base_ms = self.config.base_backoff.as_millis() as f64;
        let max_ms = self.config.max_backoff.as_millis() as f64;
        let exp_backoff = base_ms * 2.0_f64.powi(attempt.min(30) as i32);
        Duration::from_millis(exp_backoff.min(max_ms) as u64)
    }

    /// Backoff with jitter and the configured delay scale applied
    pub fn calculate_backoff(&self, attempt: usize) -> Duration {
        let capped_ms = self.base_delay(attempt).as_millis() as f64;

        let jitter_range = capped_ms * self.config.jitter_factor.clamp(0.0, 1.0);
        let jitter = if jitter_range > 0.0 {
            rand::thread_rng().gen_range(-jitter_range..jitter_range)
        } else {
            0.0
        };

        let scaled = (capped_ms + jitter).max(0.0) * self.config.delay_scale.max(0.0);
        Duration::from_millis(scaled as u64)
    }

    /// Runs `operation` until it succeeds or the retry budget is spent
    pub async fn run<F, Fut, T, E>(&self, mut operation: F) -> RetryOutcome<T, E>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 0;
        let mut total_backoff = Duration::ZERO;

        loop {
            match operation(attempt).await {
                Ok(value) => {
                    counter!("retry.success", 1, "policy" => self.name.clone());
                    histogram!("retry.attempts", (attempt + 1) as f64, "policy" => self.name.clone());
                    return RetryOutcome {
                        result: Ok(value),
                        attempts: attempt + 1,
                        total_backoff,
                    };
                }
                Err(err) if attempt < self.config.max_retries => {
                    let delay = self.calculate_backoff(attempt);
                    debug!(
                        policy = %self.name,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Operation failed, retrying"
                    );
                    if !delay.is_zero() {
                        sleep(delay).await;
                    }
                    total_backoff += delay;
                    attempt += 1;
                }
                Err(err) => {
                    warn!(
                        policy = %self.name,
                        attempts = attempt + 1,
                        error = %err,
                        "Retries exhausted"
                    );
                    counter!("retry.exhausted", 1, "policy" => self.name.clone());
                    return RetryOutcome {
                        result: Err(err),
                        attempts: attempt + 1,
                        total_backoff,
                    };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instant_policy(max_retries: usize) -> RetryPolicy {
        RetryPolicy::new(
            "test",
            Some(RetryConfig {
                max_retries,
                delay_scale: 0.0,
                ..Default::default()
            }),
        )
    }

    #[test]
    fn test_base_delay_is_exponential_and_capped() {
        let policy = RetryPolicy::new("test", None);
        assert_eq!(policy.base_delay(0), Duration::from_millis(100));
        assert_eq!(policy.base_delay(1), Duration::from_millis(200));
        assert_eq!(policy.base_delay(2), Duration::from_millis(400));
        assert_eq!(policy.base_delay(20), Duration::from_secs(5));
    }

    #[test]
    fn test_zero_scale_disables_delay() {
        assert_eq!(instant_policy(3).calculate_backoff(4), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let outcome = instant_policy(3)
            .run(|attempt| async move {
                if attempt < 2 {
                    Err("transient")
                } else {
                    Ok(attempt)
                }
            })
            .await;

        assert!(outcome.is_success());
        assert_eq!(outcome.attempts, 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_budget() {
        let outcome = instant_policy(2)
            .run(|_| async { Err::<(), _>("still failing") })
            .await;

        assert!(!outcome.is_success());
        assert_eq!(outcome.attempts, 3);
    }

    #[tokio::test]
    async fn test_never_policy_runs_once() {
        let outcome = RetryPolicy::never().run(|_| async { Err::<(), _>("nope") }).await;
        assert_eq!(outcome.attempts, 1);
    }
}
