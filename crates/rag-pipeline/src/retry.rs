//! Bounded exponential-backoff retry for remote calls

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use crate::config::RetryConfig;
use crate::error::{Error, Result};

/// Retry policy: total attempts and the delay before the second attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Successful value together with the number of attempts it took
#[derive(Debug, Clone, PartialEq)]
pub struct Attempted<T> {
    pub value: T,
    pub attempts: u32,
}

impl RetryPolicy {
    /// Create a policy; zero attempts or a zero delay are raised to the minimum
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: base_delay.max(Duration::from_millis(1)),
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, Duration::from_millis(config.base_delay_ms))
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Wait after the given failed attempt (1-based): `base * 2^(attempt-1)`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exp)
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error, or
    /// runs out of attempts. Failures come back as `Error::RetryExhausted`.
    pub async fn execute<F, Fut, T>(&self, name: &str, operation: F) -> Result<Attempted<T>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!("{} succeeded on attempt {}", name, attempt);
                    }
                    return Ok(Attempted {
                        value,
                        attempts: attempt,
                    });
                }
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        "{} failed (attempt {}/{}), retrying in {:?}: {}",
                        name,
                        attempt,
                        self.max_attempts,
                        delay,
                        e
                    );
                    sleep(delay).await;
                }
                Err(e) => {
                    if e.is_retryable() {
                        tracing::error!(
                            "{} failed after {} attempt(s): {}",
                            name,
                            attempt,
                            e
                        );
                    } else {
                        tracing::error!("{} failed (not retryable): {}", name, e);
                    }
                    return Err(Error::RetryExhausted {
                        attempts: attempt,
                        source: Box::new(e),
                    });
                }
            }
        }
    }

    /// Like [`execute`](Self::execute) without the attempt count
    pub async fn run<F, Fut, T>(&self, name: &str, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.execute(name, operation).await.map(|a| a.value)
    }
}

/// An operation wrapped with a retry policy
pub struct Retrying<F> {
    policy: RetryPolicy,
    name: String,
    operation: F,
}

/// Wrap `operation` so every call goes through `policy`
pub fn with_retry<F>(policy: RetryPolicy, name: impl Into<String>, operation: F) -> Retrying<F> {
    Retrying {
        policy,
        name: name.into(),
        operation,
    }
}

impl<F, Fut, T> Retrying<F>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    pub async fn call(&self) -> Result<T> {
        self.policy.run(&self.name, &self.operation).await
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }
}
