//! Bounded retry for remote calls.
//!
//! Every call against the cluster goes through [`RetryClient::execute`].
//! Terminal errors propagate after one attempt; transient errors are retried
//! up to the policy's attempt limit, then the last error propagates.

use crate::cancellation::CancellationToken;
use crate::errors::ClusterError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Backoff strategy for retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BackoffStrategy {
    /// delay = base
    #[default]
    Constant,
    /// delay = base * attempt
    Linear,
    /// delay = base * 2^(attempt - 1)
    Exponential,
}

/// Jitter applied on top of the backoff delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum JitterStrategy {
    /// No jitter
    #[default]
    None,
    /// Random from 0 to delay
    Full,
    /// Half fixed, half random
    Equal,
}

/// How many times to try a call and how long to wait in between.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum attempts, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay between attempts in milliseconds.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    /// Cap on any single delay in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Backoff strategy.
    #[serde(default)]
    pub backoff: BackoffStrategy,
    /// Jitter strategy.
    #[serde(default)]
    pub jitter: JitterStrategy,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff: BackoffStrategy::Constant,
            jitter: JitterStrategy::None,
        }
    }
}

impl RetryPolicy {
    /// Creates the default policy: 3 attempts, 1 second apart.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_delay_ms(mut self, delay: u64) -> Self {
        self.delay_ms = delay;
        self
    }

    /// Sets the delay cap.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff = strategy;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, strategy: JitterStrategy) -> Self {
        self.jitter = strategy;
        self
    }

    /// The delay after failed attempt number `attempt` (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.delay_ms;
        let step = attempt.max(1);
        let delay = match self.backoff {
            BackoffStrategy::Constant => base,
            BackoffStrategy::Linear => base.saturating_mul(u64::from(step)),
            BackoffStrategy::Exponential => base.saturating_mul(2u64.saturating_pow(step - 1)),
        }
        .min(self.max_delay_ms.max(base));

        let jittered = match self.jitter {
            JitterStrategy::None => delay,
            JitterStrategy::Full => {
                if delay == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=delay)
                }
            }
            JitterStrategy::Equal => {
                let half = delay / 2;
                if half == 0 {
                    delay
                } else {
                    half + rand::thread_rng().gen_range(0..=half)
                }
            }
        };

        Duration::from_millis(jittered)
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry(Duration),
    /// Attempts are exhausted.
    GiveUp,
    /// The error is terminal.
    NotRetryable,
}

/// Applies a [`RetryPolicy`] to remote calls.
///
/// With a token attached, a cancellation cuts any pending delay short and
/// the last error propagates without further attempts.
#[derive(Debug, Clone, Default)]
pub struct RetryClient {
    policy: RetryPolicy,
    token: Option<Arc<CancellationToken>>,
}

impl RetryClient {
    /// Creates a retry client with `policy`.
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy, token: None }
    }

    /// Replaces the policy, keeping any attached token.
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Attaches a cancellation token.
    #[must_use]
    pub fn with_token(mut self, token: Arc<CancellationToken>) -> Self {
        self.token = Some(token);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.token.as_ref().is_some_and(|token| token.is_cancelled())
    }

    async fn pause(&self, delay: Duration) {
        match &self.token {
            Some(token) => {
                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    () = token.cancelled() => {}
                }
            }
            None => tokio::time::sleep(delay).await,
        }
    }

    /// The policy in use.
    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Decides what to do after attempt number `attempt` failed with `error`.
    #[must_use]
    pub fn decide(&self, attempt: u32, error: &ClusterError) -> RetryDecision {
        if error.is_terminal() {
            RetryDecision::NotRetryable
        } else if attempt >= self.policy.max_attempts.max(1) {
            RetryDecision::GiveUp
        } else {
            RetryDecision::Retry(self.policy.delay_for(attempt))
        }
    }

    /// Runs `call` until it succeeds, fails terminally, or runs out of attempts.
    pub async fn execute<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, ClusterError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ClusterError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let error = match call().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };
            match self.decide(attempt, &error) {
                RetryDecision::Retry(delay) => {
                    warn!(
                        operation,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %error,
                        "Retrying after transient error"
                    );
                    self.pause(delay).await;
                    if self.is_cancelled() {
                        debug!(operation, attempts = attempt, "Retry abandoned on cancellation");
                        return Err(error);
                    }
                }
                RetryDecision::GiveUp => {
                    warn!(operation, attempts = attempt, error = %error, "Giving up after retries");
                    return Err(error);
                }
                RetryDecision::NotRetryable => {
                    debug!(operation, error = %error, "Not retrying terminal error");
                    return Err(error);
                }
            }
        }
    }
}
