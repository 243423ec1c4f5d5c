// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Scorecast: score forecasts for football matches.
//!
//! This crate provides the backend for submitting forecasts, settling
//! finished matches into points, and serving cached match listings from
//! football-data.org.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod resilience;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::Store;
use resilience::{CircuitBreaker, RetryPolicy};
use services::{
    ForecastCoordinator, MatchCache, MatchSource, MatchSyncService, SettlementCoordinator,
};
use std::sync::Arc;
use time_utils::Clock;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn Store>,
    pub clock: Arc<dyn Clock>,
    pub forecasts: ForecastCoordinator,
    pub settlement: Arc<SettlementCoordinator>,
    pub match_cache: Arc<MatchCache>,
    pub sync: MatchSyncService,
    /// Shared by every coordinator that writes to the store
    pub storage_breaker: Arc<CircuitBreaker>,
}

impl AppState {
    /// Wire the coordinators around a store, an upstream source and a clock.
    pub fn new(
        config: Config,
        store: Arc<dyn Store>,
        source: Arc<dyn MatchSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let storage_breaker = Arc::new(CircuitBreaker::new("storage", config.breaker_config()));
        let match_cache = Arc::new(MatchCache::new(source, config.match_cache_config()));

        let forecasts = ForecastCoordinator::new(
            store.clone(),
            clock.clone(),
            RetryPolicy::storage(),
            storage_breaker.clone(),
        );
        let settlement = Arc::new(SettlementCoordinator::new(
            store.clone(),
            clock.clone(),
            RetryPolicy::storage(),
            storage_breaker.clone(),
        ));
        let sync = MatchSyncService::new(
            match_cache.clone(),
            store.clone(),
            settlement.clone(),
            clock.clone(),
            RetryPolicy::storage(),
        );

        Self {
            config,
            store,
            clock,
            forecasts,
            settlement,
            match_cache,
            sync,
            storage_breaker,
        }
    }
}
