// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Circuit breaker guarding a dependency (the store, the upstream API).
//!
//! `Closed` counts consecutive failures; at the threshold the circuit
//! opens and calls fail fast with [`AppError::Unavailable`]. After the
//! reset timeout one trial call is let through (`HalfOpen`): success
//! closes the circuit, failure reopens it and restarts the timer.

use super::classify::{classify, ErrorKind};
use crate::error::{AppError, Result};
use parking_lot::Mutex;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// Time spent open before a trial call is allowed
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

/// Read-only view for the admin status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub name: &'static str,
    pub state: CircuitState,
    pub consecutive_failures: u32,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failures: u32,
    opened_at: Option<Instant>,
    /// Start of the in-flight half-open trial call, if any
    trial_started: Option<Instant>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    name: &'static str,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: &'static str, config: CircuitBreakerConfig) -> Self {
        Self {
            name,
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failures: 0,
                opened_at: None,
                trial_started: None,
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Current state. An open circuit whose timeout has elapsed reports
    /// `HalfOpen`, since the next call will be let through as a trial call.
    pub fn state(&self) -> CircuitState {
        let inner = self.inner.lock();
        match inner.state {
            CircuitState::Open if self.reset_elapsed(&inner, Instant::now()) => {
                CircuitState::HalfOpen
            }
            state => state,
        }
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let failures = self.inner.lock().failures;
        BreakerSnapshot {
            name: self.name,
            state: self.state(),
            consecutive_failures: failures,
        }
    }

    fn reset_elapsed(&self, inner: &Inner, now: Instant) -> bool {
        inner
            .opened_at
            .is_some_and(|opened| now.duration_since(opened) >= self.config.reset_timeout)
    }

    fn try_acquire(&self) -> Result<()> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                if self.reset_elapsed(&inner, now) {
                    tracing::info!(breaker = self.name, "Circuit half-open, allowing a trial call");
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_started = Some(now);
                    Ok(())
                } else {
                    Err(AppError::Unavailable(self.name))
                }
            }
            CircuitState::HalfOpen => {
                // A trial call abandoned by its caller must not wedge the breaker
                let trial_stale = inner
                    .trial_started
                    .map_or(true, |started| {
                        now.duration_since(started) >= self.config.reset_timeout
                    });
                if trial_stale {
                    inner.trial_started = Some(now);
                    Ok(())
                } else {
                    Err(AppError::Unavailable(self.name))
                }
            }
        }
    }

    fn on_success(&self) {
        let mut inner = self.inner.lock();
        if inner.state != CircuitState::Closed {
            tracing::info!(breaker = self.name, "Circuit closed");
        }
        inner.state = CircuitState::Closed;
        inner.failures = 0;
        inner.opened_at = None;
        inner.trial_started = None;
    }

    fn on_failure(&self) {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        inner.failures = inner.failures.saturating_add(1);
        let trip = match inner.state {
            CircuitState::HalfOpen => true,
            CircuitState::Closed => inner.failures >= self.config.failure_threshold,
            CircuitState::Open => false,
        };
        if trip {
            tracing::warn!(
                breaker = self.name,
                failures = inner.failures,
                "Circuit opened"
            );
            inner.state = CircuitState::Open;
            inner.opened_at = Some(now);
            inner.trial_started = None;
        }
    }

    /// Run `op` through the breaker. Rejections of the request itself
    /// (validation kind) say nothing about the dependency's health and
    /// count as successes.
    pub async fn call<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.try_acquire()?;
        let result = op().await;
        match &result {
            Ok(_) => self.on_success(),
            Err(err) if classify(err).kind == ErrorKind::Validation => self.on_success(),
            Err(_) => self.on_failure(),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::StoreError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                failure_threshold: 3,
                reset_timeout: Duration::from_secs(30),
            },
        )
    }

    async fn fail(b: &CircuitBreaker) -> Result<()> {
        b.call(|| async { Err(StoreError::Unavailable("down".into()).into()) })
            .await
    }

    async fn succeed(b: &CircuitBreaker) -> Result<()> {
        b.call(|| async { Ok(()) }).await
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_at_threshold_and_fails_fast() {
        let b = breaker();
        for _ in 0..3 {
            assert!(matches!(fail(&b).await, Err(AppError::Storage(_))));
        }
        assert_eq!(b.state(), CircuitState::Open);

        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = b
            .call(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(AppError::Unavailable("test"))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_failure_count() {
        let b = breaker();
        fail(&b).await.unwrap_err();
        fail(&b).await.unwrap_err();
        succeed(&b).await.unwrap();
        fail(&b).await.unwrap_err();
        assert_eq!(b.state(), CircuitState::Closed);
        assert_eq!(b.snapshot().consecutive_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_trial_success_closes() {
        let b = breaker();
        for _ in 0..3 {
            fail(&b).await.unwrap_err();
        }
        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(b.state(), CircuitState::HalfOpen);

        succeed(&b).await.unwrap();
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens_and_restarts_timer() {
        let b = breaker();
        for _ in 0..3 {
            fail(&b).await.unwrap_err();
        }
        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(matches!(fail(&b).await, Err(AppError::Storage(_))));
        assert_eq!(b.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(matches!(succeed(&b).await, Err(AppError::Unavailable(_))));
        tokio::time::advance(Duration::from_secs(1)).await;
        succeed(&b).await.unwrap();
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_validation_errors_do_not_trip() {
        let b = breaker();
        for _ in 0..10 {
            let r: Result<()> = b.call(|| async { Err(AppError::ImmutableRecord) }).await;
            assert!(matches!(r, Err(AppError::ImmutableRecord)));
        }
        assert_eq!(b.state(), CircuitState::Closed);
    }
}
