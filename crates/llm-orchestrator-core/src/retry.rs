// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Exponential-backoff retry wrapper used by the workflow executor around
//! each step attempt.

use std::future::Future;
use std::time::Duration;

/// How many attempts to make and how long to wait between them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration, multiplier: f64, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            multiplier,
            max_delay,
        }
    }

    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            multiplier: 1.0,
            max_delay: Duration::ZERO,
        }
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let scaled = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32 - 1);
        Duration::from_secs_f64(scaled).min(self.max_delay)
    }
}

/// Runs an async operation up to `policy.max_attempts` times, sleeping with
/// exponential backoff between attempts. The last error is returned if every
/// attempt fails.
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub async fn execute<F, Fut, T, E>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if attempt >= self.policy.max_attempts {
                        return Err(err);
                    }
                    tracing::warn!(attempt, max_attempts = self.policy.max_attempts, "step attempt failed, retrying");
                    tokio::time::sleep(self.policy.delay_for_attempt(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_without_retrying_when_first_attempt_works() {
        let calls = AtomicU32::new(0);
        let executor = RetryExecutor::new(RetryPolicy::default());
        let result: Result<u32, &str> = executor
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(7) }
            })
            .await;
        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_until_exhausted_then_returns_last_error() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_millis(1), 1.0, Duration::from_millis(2));
        let executor = RetryExecutor::new(policy);
        let result: Result<u32, &str> = executor
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("boom") }
            })
            .await;
        assert_eq!(result, Err("boom"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn succeeds_on_a_later_attempt() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(5, Duration::from_millis(1), 1.0, Duration::from_millis(2));
        let executor = RetryExecutor::new(policy);
        let result: Result<u32, &str> = executor
            .execute(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move { if n < 3 { Err("not yet") } else { Ok(n) } }
            })
            .await;
        assert_eq!(result, Ok(3));
    }
}
