// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Public and user API routes.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{Forecast, Match, User};
use crate::resilience::{report, report_for_user};
use crate::services::timing::{self, ForecastWindow};
use crate::services::MatchQuery;
use crate::time_utils::format_utc_rfc3339;
use crate::AppState;
use axum::{
    extract::{Query, State},
    routing::get,
    Extension, Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

const DEFAULT_LEADERBOARD_SIZE: u32 = 20;
const MAX_LEADERBOARD_SIZE: u32 = 100;

/// Routes that need no session.
pub fn public_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/matches", get(list_matches))
        .route("/api/leaderboard", get(get_leaderboard))
}

/// Routes that require authentication via JWT.
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/me", get(get_me))
        .route("/api/forecasts", get(list_forecasts).post(submit_forecast))
}

// ─── Matches ─────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct MatchesQuery {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    #[serde(default)]
    pub refresh: bool,
}

impl MatchesQuery {
    pub fn to_match_query(&self) -> Result<MatchQuery> {
        if let (Some(from), Some(to)) = (self.date_from, self.date_to) {
            if from > to {
                return Err(AppError::Validation("date_from must not be after date_to."));
            }
        }
        Ok(MatchQuery {
            date_from: self.date_from,
            date_to: self.date_to,
        })
    }
}

/// A match plus whether forecasts are open for it right now.
#[derive(Serialize)]
pub struct MatchView {
    #[serde(flatten)]
    pub game: Match,
    pub window: ForecastWindow,
}

#[derive(Serialize)]
pub struct MatchesResponse {
    pub matches: Vec<MatchView>,
    pub cached: bool,
}

async fn list_matches(
    State(state): State<Arc<AppState>>,
    Query(params): Query<MatchesQuery>,
) -> Result<Json<MatchesResponse>> {
    let query = params.to_match_query()?;
    let listing = state
        .match_cache
        .get(&query, params.refresh)
        .await
        .inspect_err(|err| {
            report(err, "list_matches", &query.cache_key());
        })?;

    let now = state.clock.now();
    let matches = listing
        .data
        .iter()
        .map(|game| MatchView {
            window: timing::evaluate(now, game.kickoff, game.status),
            game: game.clone(),
        })
        .collect();

    Ok(Json(MatchesResponse {
        matches,
        cached: listing.cached,
    }))
}

// ─── Forecasts ───────────────────────────────────────────────

/// Forecast submission payload.
#[derive(Debug, Deserialize, Validate)]
pub struct ForecastRequest {
    #[validate(length(min = 1, max = 128))]
    pub match_id: String,
    #[validate(range(min = 0, max = 20))]
    pub predicted_home: i64,
    #[validate(range(min = 0, max = 20))]
    pub predicted_away: i64,
}

/// Forecast as returned to its owner.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ForecastResponse {
    pub match_id: String,
    pub predicted_home: u32,
    pub predicted_away: u32,
    pub points: u32,
    pub settled: bool,
    pub updated_at: String,
}

impl From<Forecast> for ForecastResponse {
    fn from(forecast: Forecast) -> Self {
        Self {
            match_id: forecast.match_id,
            predicted_home: forecast.predicted_home,
            predicted_away: forecast.predicted_away,
            points: forecast.points,
            settled: forecast.settled,
            updated_at: format_utc_rfc3339(forecast.updated_at),
        }
    }
}

async fn submit_forecast(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<ForecastRequest>,
) -> Result<Json<ForecastResponse>> {
    payload.validate()?;

    // Range-checked above
    let home = u32::try_from(payload.predicted_home)
        .map_err(|_| AppError::Validation(crate::services::forecasts::INVALID_SCORE))?;
    let away = u32::try_from(payload.predicted_away)
        .map_err(|_| AppError::Validation(crate::services::forecasts::INVALID_SCORE))?;

    let forecast = state
        .forecasts
        .submit(&user.user_id, &payload.match_id, home, away)
        .await?;
    Ok(Json(forecast.into()))
}

async fn list_forecasts(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<ForecastResponse>>> {
    let forecasts = state
        .forecasts
        .list_for_user(&user.user_id)
        .await
        .inspect_err(|err| {
            report_for_user(err, "list_forecasts", &user.user_id, &user.user_id);
        })?;
    Ok(Json(forecasts.into_iter().map(Into::into).collect()))
}

// ─── Users ───────────────────────────────────────────────────

/// Current user response.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct UserResponse {
    pub id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub total_points: u32,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            display_name: user.display_name,
            avatar_url: user.avatar_url,
            total_points: user.total_points,
        }
    }
}

async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<UserResponse>> {
    let profile = state
        .store
        .get_user(&user.user_id)
        .await
        .map_err(AppError::from)
        .inspect_err(|err| {
            report_for_user(err, "get_me", &user.user_id, &user.user_id);
        })?
        .ok_or(AppError::NotFound("User not found."))?;
    Ok(Json(profile.into()))
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub limit: Option<u32>,
}

#[derive(Serialize)]
pub struct LeaderboardEntry {
    pub rank: u32,
    #[serde(flatten)]
    pub user: UserResponse,
}

async fn get_leaderboard(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LeaderboardQuery>,
) -> Result<Json<Vec<LeaderboardEntry>>> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_LEADERBOARD_SIZE)
        .clamp(1, MAX_LEADERBOARD_SIZE);
    let users = state
        .store
        .leaderboard(limit)
        .await
        .map_err(AppError::from)
        .inspect_err(|err| {
            report(err, "get_leaderboard", "leaderboard");
        })?;

    Ok(Json(
        users
            .into_iter()
            .zip(1..)
            .map(|(user, rank)| LeaderboardEntry {
                rank,
                user: user.into(),
            })
            .collect(),
    ))
}
