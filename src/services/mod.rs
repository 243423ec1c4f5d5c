// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod football_data;
pub mod forecasts;
pub mod match_cache;
pub mod scoring;
pub mod settlement;
pub mod sync;
pub mod timing;

pub use football_data::{FootballDataClient, MatchQuery, MatchSource};
pub use forecasts::ForecastCoordinator;
pub use match_cache::{CacheStats, CachedMatches, MatchCache, MatchCacheConfig};
pub use scoring::{score, ScoreOutcome, ScoreReason, ScoringError};
pub use settlement::SettlementCoordinator;
pub use sync::{MatchSyncService, SyncReport};
pub use timing::{ForecastWindow, WindowStatus};
