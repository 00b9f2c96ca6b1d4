//! Retry with exponential backoff for transient storage failures
//!
//! Only errors for which [`crate::LedgerError::is_transient`] holds are retried.
//! Every ledger mutation is a single transaction, so re-running the whole
//! operation after a lock timeout is safe.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::LedgerResult;

/// Backoff settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: usize,
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    pub backoff_multiplier: f32,
    /// Add up to 30% random jitter to each delay
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// No retries at all
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }
}

/// Per-operation retry state
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
    attempt: usize,
    next_delay: Duration,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            next_delay: config.initial_delay,
            config,
            attempt: 0,
        }
    }

    pub fn should_retry(&self) -> bool {
        self.attempt < self.config.max_retries
    }

    pub fn attempt(&self) -> usize {
        self.attempt
    }

    /// Delay before the next attempt; advances the backoff
    pub fn next_delay(&mut self) -> Duration {
        let mut delay = self.next_delay;

        if self.config.jitter {
            use rand::Rng;
            let jitter = rand::thread_rng().gen_range(0.0..0.3);
            let jitter_ms = (delay.as_millis() as f64 * jitter) as u64;
            delay += Duration::from_millis(jitter_ms);
        }

        self.attempt += 1;
        self.next_delay = Duration::from_secs_f32(
            (self.next_delay.as_secs_f32() * self.config.backoff_multiplier)
                .min(self.config.max_delay.as_secs_f32()),
        );

        delay
    }
}

/// Run `operation`, retrying transient failures with backoff
pub async fn with_retry<F, Fut, T>(config: &RetryConfig, operation_name: &str, mut operation: F) -> LedgerResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = LedgerResult<T>>,
{
    let mut policy = RetryPolicy::new(config.clone());
    loop {
        match operation().await {
            Ok(result) => {
                if policy.attempt() > 0 {
                    debug!(
                        operation = operation_name,
                        attempts = policy.attempt() + 1,
                        "Ledger operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(error) if error.is_transient() && policy.should_retry() => {
                let delay = policy.next_delay();
                warn!(
                    operation = operation_name,
                    attempt = policy.attempt(),
                    error = %error,
                    delay_ms = delay.as_millis() as u64,
                    "Transient ledger failure, retrying"
                );
                sleep(delay).await;
            }
            Err(error) => {
                if error.is_transient() {
                    warn!(
                        operation = operation_name,
                        max_retries = config.max_retries,
                        error = %error,
                        "Ledger retries exhausted"
                    );
                }
                return Err(error);
            }
        }
    }
}
