// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Rolling-window rate limiter for upstream calls.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Allows at most `max_requests` acquisitions in any `window`.
///
/// When the quota is used up, `acquire` sleeps until the oldest request
/// leaves the window. Waiters queue on the mutex, so they are served in
/// arrival order.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    sent: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        let max_requests = max_requests.max(1);
        Self {
            max_requests,
            window,
            sent: Mutex::new(VecDeque::with_capacity(max_requests)),
        }
    }

    fn prune(&self, sent: &mut VecDeque<Instant>, now: Instant) {
        while sent
            .front()
            .is_some_and(|&at| now.duration_since(at) >= self.window)
        {
            sent.pop_front();
        }
    }

    /// Wait for a slot in the window and claim it.
    pub async fn acquire(&self) {
        let mut sent = self.sent.lock().await;
        loop {
            let now = Instant::now();
            self.prune(&mut sent, now);
            if sent.len() < self.max_requests {
                sent.push_back(now);
                return;
            }

            let Some(&oldest) = sent.front() else {
                continue;
            };
            let wait = (oldest + self.window).saturating_duration_since(now);
            tracing::debug!(
                wait_ms = wait.as_millis() as u64,
                "Upstream rate limit reached, waiting"
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// Requests counted in the current window.
    pub async fn in_window(&self) -> usize {
        let mut sent = self.sent.lock().await;
        self.prune(&mut sent, Instant::now());
        sent.len()
    }
}
