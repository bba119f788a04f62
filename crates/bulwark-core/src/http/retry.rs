//! Retry logic with exponential backoff
//!
//! Classify-then-backoff: after each failed attempt the error is classified,
//! and an eligible failure waits `base_delay_ms * backoff_factor^attempt`
//! before the next attempt. The loop is iterative with a single suspension
//! point between attempts. Nothing here caches or publishes events.

use backoff::{backoff::Backoff, ExponentialBackoff};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::cancel::{guarded, CancellationSignal};
use crate::http::error::{ErrorKind, RequestError};

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts are `max_retries + 1`
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay_ms: u64,
    /// Multiplier applied per retry
    pub backoff_factor: f64,
    /// Response statuses that may be retried
    pub retryable_statuses: BTreeSet<u16>,
    /// Ceiling for a single delay
    pub max_delay_ms: u64,
    /// Randomization factor in `[0, 1)`; zero keeps delays exact
    pub jitter: f64,
    /// Prefer the server's Retry-After hint over the computed delay
    pub respect_retry_after: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            backoff_factor: 2.0,
            retryable_statuses: [408, 429, 500, 502, 503, 504].into_iter().collect(),
            max_delay_ms: 60_000,
            jitter: 0.0,
            respect_retry_after: false,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// A policy that makes exactly one attempt
    pub fn no_retries() -> Self {
        Self::new(0)
    }

    pub fn with_base_delay_ms(mut self, millis: u64) -> Self {
        self.base_delay_ms = millis;
        self
    }

    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    pub fn with_max_delay_ms(mut self, millis: u64) -> Self {
        self.max_delay_ms = millis;
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_retry_after(mut self, respect: bool) -> Self {
        self.respect_retry_after = respect;
        self
    }

    /// Decide whether the failure of attempt `attempt_index` may be retried
    pub fn classify(&self, error: &RequestError, attempt_index: u32) -> bool {
        if attempt_index >= self.max_retries {
            return false;
        }

        match error.status {
            Some(401) | Some(403) => false,
            Some(status) => self.retryable_statuses.contains(&status),
            None => error.kind == ErrorKind::Network,
        }
    }

    /// Create the backoff sequence for one logical request
    pub fn create_backoff(&self) -> ExponentialBackoff {
        let initial = Duration::from_millis(self.base_delay_ms);
        ExponentialBackoff {
            current_interval: initial,
            initial_interval: initial,
            randomization_factor: self.jitter,
            multiplier: self.backoff_factor,
            max_interval: Duration::from_millis(self.max_delay_ms),
            max_elapsed_time: None,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.backoff_factor < 1.0 {
            return Err("Backoff factor must be at least 1".to_string());
        }
        if !(0.0..1.0).contains(&self.jitter) {
            return Err("Jitter must be in [0, 1)".to_string());
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err("Max delay should be >= base delay".to_string());
        }
        Ok(())
    }
}

/// Decision on whether to retry a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the request after the specified delay
    Retry { delay: Duration },
    /// Do not retry the request
    NoRetry,
}

/// Per-request retry state
#[derive(Debug)]
pub struct RetryHandler {
    policy: RetryPolicy,
    attempts: u32,
    backoff: ExponentialBackoff,
}

impl RetryHandler {
    pub fn new(policy: RetryPolicy) -> Self {
        let backoff = policy.create_backoff();
        Self {
            policy,
            attempts: 0,
            backoff,
        }
    }

    /// Classify the failure of the current attempt and advance the state
    pub fn should_retry(&mut self, error: &RequestError) -> RetryDecision {
        if !self.policy.classify(error, self.attempts) {
            return RetryDecision::NoRetry;
        }

        self.attempts += 1;
        let delay = self.next_delay(error);
        RetryDecision::Retry { delay }
    }

    fn next_delay(&mut self, error: &RequestError) -> Duration {
        let computed = self
            .backoff
            .next_backoff()
            .unwrap_or(Duration::from_millis(self.policy.max_delay_ms));

        match error.retry_after {
            Some(secs) if self.policy.respect_retry_after => {
                Duration::from_secs(secs).min(Duration::from_millis(self.policy.max_delay_ms))
            }
            _ => computed,
        }
    }

    /// Retries granted so far; also the index of the next attempt
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
        self.backoff.reset();
    }
}

/// Execute a request with retry logic
///
/// `request_fn` is invoked once per attempt. Cancellation aborts both an
/// in-flight attempt and a pending backoff delay.
pub async fn execute_with_retry<F, Fut, T>(
    mut request_fn: F,
    policy: &RetryPolicy,
    cancel: Option<&CancellationSignal>,
) -> Result<T, RequestError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RequestError>>,
{
    let mut handler = RetryHandler::new(policy.clone());

    loop {
        let error = match guarded(cancel, request_fn()).await {
            Ok(response) => return Ok(response),
            Err(error) => error,
        };

        match handler.should_retry(&error) {
            RetryDecision::Retry { delay } => {
                warn!(
                    attempt = handler.attempts(),
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Request failed, retrying"
                );
                guarded(cancel, async {
                    tokio::time::sleep(delay).await;
                    Ok(())
                })
                .await?;
            }
            RetryDecision::NoRetry => {
                debug!(
                    attempts = handler.attempts() + 1,
                    error = %error,
                    "Request failed, not retrying"
                );
                return Err(error);
            }
        }
    }
}
