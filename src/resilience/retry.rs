// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Bounded retry with exponential backoff and jitter.

use super::classify::classify;
use crate::error::{AppError, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Jitter is drawn from `[0, JITTER_FRACTION * delay]`.
const JITTER_FRACTION: f64 = 0.1;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Total attempts including the first
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration, multiplier: f64, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_delay,
            multiplier,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Transaction conflicts and store outages.
    pub fn storage() -> Self {
        Self::new(Duration::from_millis(50), Duration::from_secs(2), 2.0, 3)
    }

    /// football-data.org calls; 429s need a longer backoff.
    pub fn upstream() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(10), 2.0, 4)
    }

    /// Backoff before retry number `attempt` (0-based), without jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = secs.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }

    /// Backoff plus up to 10% random jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let backoff = self.backoff(attempt);
        let jitter = rand::thread_rng().gen_range(0.0..=JITTER_FRACTION);
        backoff + backoff.mul_f64(jitter)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or
    /// runs out of attempts. Exhaustion wraps the last error.
    pub async fn run<T, F, Fut>(&self, operation: &'static str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !classify(&err).retryable {
                return Err(err);
            }
            if attempt >= self.max_attempts {
                return Err(AppError::RetriesExhausted {
                    operation,
                    attempts: attempt,
                    source: Box::new(err),
                });
            }

            let delay = self.delay_for(attempt - 1);
            tracing::warn!(
                operation,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Retrying after transient failure"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
