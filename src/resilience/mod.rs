// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Failure handling shared by every call-site: classification, bounded
//! retry with backoff, circuit breaking and upstream rate limiting.

pub mod breaker;
pub mod classify;
pub mod rate_limit;
pub mod retry;

pub use breaker::{BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use classify::{classify, report, report_for_user, Classification, ErrorKind, Severity};
pub use rate_limit::RateLimiter;
pub use retry::RetryPolicy;
