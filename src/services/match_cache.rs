// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! TTL cache in front of the upstream match source.
//!
//! Every upstream attempt passes through the circuit breaker and then the
//! rate limiter; 429 and 5xx failures are retried with backoff. A failed
//! refresh is returned to the caller; expired data is never served.

use super::football_data::{MatchQuery, MatchSource};
use crate::error::Result;
use crate::models::Match;
use crate::resilience::{CircuitBreaker, CircuitBreakerConfig, RateLimiter, RetryPolicy};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct MatchCacheConfig {
    pub ttl: Duration,
    pub max_entries: usize,
    /// Upstream requests allowed per `rate_window`
    pub rate_limit: usize,
    pub rate_window: Duration,
    pub breaker: CircuitBreakerConfig,
    pub retry: RetryPolicy,
}

impl Default for MatchCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(5 * 60),
            max_entries: 1000,
            rate_limit: 10,
            rate_window: Duration::from_secs(60),
            breaker: CircuitBreakerConfig::default(),
            retry: RetryPolicy::upstream(),
        }
    }
}

#[derive(Clone)]
struct CacheEntry {
    data: Arc<Vec<Match>>,
    fetched_at: Instant,
}

/// A listing and whether it came from the cache.
#[derive(Debug, Clone)]
pub struct CachedMatches {
    pub data: Arc<Vec<Match>>,
    pub cached: bool,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    /// Keys with a refresh in progress
    pub in_flight: usize,
}

pub struct MatchCache {
    source: Arc<dyn MatchSource>,
    ttl: Duration,
    max_entries: usize,
    retry: RetryPolicy,
    entries: DashMap<String, CacheEntry>,
    /// Per-key mutex so concurrent misses on one key share a fetch.
    refresh_locks: DashMap<String, Arc<Mutex<()>>>,
    limiter: RateLimiter,
    breaker: CircuitBreaker,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MatchCache {
    pub fn new(source: Arc<dyn MatchSource>, config: MatchCacheConfig) -> Self {
        Self {
            source,
            ttl: config.ttl,
            max_entries: config.max_entries.max(1),
            retry: config.retry,
            entries: DashMap::new(),
            refresh_locks: DashMap::new(),
            limiter: RateLimiter::new(config.rate_limit, config.rate_window),
            breaker: CircuitBreaker::new("football-data", config.breaker),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.len(),
            in_flight: self.refresh_locks.len(),
        }
    }

    fn live_entry(&self, key: &str) -> Option<Arc<Vec<Match>>> {
        let entry = self.entries.get(key)?;
        if entry.fetched_at.elapsed() < self.ttl {
            Some(entry.data.clone())
        } else {
            None
        }
    }

    fn hit(&self, data: Arc<Vec<Match>>) -> CachedMatches {
        self.hits.fetch_add(1, Ordering::Relaxed);
        CachedMatches { data, cached: true }
    }

    /// Serve a listing from memory, or fetch and store it.
    pub async fn get(&self, query: &MatchQuery, force_refresh: bool) -> Result<CachedMatches> {
        let key = query.cache_key();

        if !force_refresh {
            if let Some(data) = self.live_entry(&key) {
                return Ok(self.hit(data));
            }
        }

        let lock = self
            .refresh_locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let outcome = {
            let _guard = lock.lock().await;
            self.refresh(&key, query, force_refresh).await
        };
        self.release_lock(&key);
        outcome
    }

    /// Runs with the key's refresh lock held.
    async fn refresh(
        &self,
        key: &str,
        query: &MatchQuery,
        force_refresh: bool,
    ) -> Result<CachedMatches> {
        // Another task may have refreshed while we waited
        if !force_refresh {
            if let Some(data) = self.live_entry(key) {
                return Ok(self.hit(data));
            }
        }

        let data = Arc::new(self.fetch_upstream(query).await?);
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                data: data.clone(),
                fetched_at: Instant::now(),
            },
        );
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.evict_oldest();

        tracing::debug!(key = %key, count = data.len(), "Match cache refreshed");
        Ok(CachedMatches {
            data,
            cached: false,
        })
    }

    /// Drop the key's lock unless another caller is waiting on it. The map
    /// and the releasing caller account for two references.
    fn release_lock(&self, key: &str) {
        self.refresh_locks
            .remove_if(key, |_, lock| Arc::strong_count(lock) <= 2);
    }

    async fn fetch_upstream(&self, query: &MatchQuery) -> Result<Vec<Match>> {
        self.retry
            .run("fetch_matches", move || {
                self.breaker.call(move || async move {
                    self.limiter.acquire().await;
                    self.source.fetch_matches(query).await
                })
            })
            .await
    }

    /// Drop strictly-oldest entries until within the size bound.
    fn evict_oldest(&self) {
        while self.entries.len() > self.max_entries {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.value().fetched_at)
                .map(|entry| entry.key().clone());
            let Some(key) = oldest else {
                break;
            };
            self.entries.remove(&key);
            tracing::debug!(key = %key, "Evicted match cache entry");
        }
    }

    /// Remove one listing, or everything when `query` is `None`.
    /// Returns the number of entries removed.
    pub fn invalidate(&self, query: Option<&MatchQuery>) -> usize {
        match query {
            Some(query) => {
                let key = query.cache_key();
                usize::from(self.entries.remove(&key).is_some())
            }
            None => {
                let removed = self.entries.len();
                self.entries.clear();
                removed
            }
        }
    }
}
