// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Admin routes: settlement, sync and cache control.
//!
//! Guarded by `require_auth` plus `require_admin` (see routes/mod.rs).

use crate::error::Result;
use crate::models::SettlementSummary;
use crate::resilience::{report, BreakerSnapshot};
use crate::routes::api::MatchesQuery;
use crate::services::{CacheStats, SyncReport};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/admin/matches/{id}/settle", post(settle_match))
        .route("/admin/matches/{id}/resettle", post(resettle_match))
        .route("/admin/sync", post(sync_matches))
        .route("/admin/cache", delete(invalidate_cache))
        .route("/admin/status", get(status))
}

async fn settle_match(
    State(state): State<Arc<AppState>>,
    Path(match_id): Path<String>,
) -> Result<Json<SettlementSummary>> {
    Ok(Json(state.settlement.settle(&match_id).await?))
}

async fn resettle_match(
    State(state): State<Arc<AppState>>,
    Path(match_id): Path<String>,
) -> Result<Json<SettlementSummary>> {
    tracing::info!(match_id = %match_id, "Admin resettlement requested");
    Ok(Json(state.settlement.resettle(&match_id).await?))
}

async fn sync_matches(
    State(state): State<Arc<AppState>>,
    Query(params): Query<MatchesQuery>,
) -> Result<Json<SyncReport>> {
    let query = params.to_match_query()?;
    let summary = state.sync.sync(&query).await.inspect_err(|err| {
        report(err, "sync_matches", &query.cache_key());
    })?;
    Ok(Json(summary))
}

#[derive(Serialize)]
struct InvalidateResponse {
    removed: usize,
}

/// With a date range, drop that listing; with none, clear everything.
async fn invalidate_cache(
    State(state): State<Arc<AppState>>,
    Query(params): Query<MatchesQuery>,
) -> Result<Json<InvalidateResponse>> {
    let removed = if params.date_from.is_none() && params.date_to.is_none() {
        state.match_cache.invalidate(None)
    } else {
        let query = params.to_match_query()?;
        state.match_cache.invalidate(Some(&query))
    };
    tracing::info!(removed, "Match cache invalidated");
    Ok(Json(InvalidateResponse { removed }))
}

#[derive(Serialize)]
struct StatusResponse {
    cache: CacheStats,
    breakers: Vec<BreakerSnapshot>,
}

async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        cache: state.match_cache.stats(),
        breakers: vec![
            state.storage_breaker.snapshot(),
            state.match_cache.breaker().snapshot(),
        ],
    })
}
