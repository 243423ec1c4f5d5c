// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! football-data.org API client.
//!
//! Handles:
//! - Fetching a competition's matches for an optional date range
//! - Mapping upstream statuses and scores onto [`Match`]
//! - Classifying failures (429, 5xx, other statuses, transport, decode)

use crate::error::{AppError, UpstreamFailure};
use crate::models::{Match, MatchStatus};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Deserialize;

/// Date range for a match listing. A missing bound is open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct MatchQuery {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

impl MatchQuery {
    /// The unkeyed "all matches" listing.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn range(date_from: NaiveDate, date_to: NaiveDate) -> Self {
        Self {
            date_from: Some(date_from),
            date_to: Some(date_to),
        }
    }

    /// Canonical cache key; `*` stands for an open bound.
    pub fn cache_key(&self) -> String {
        fn bound(date: Option<NaiveDate>) -> String {
            date.map_or_else(|| "*".to_string(), |d| d.format("%Y-%m-%d").to_string())
        }
        format!("{}..{}", bound(self.date_from), bound(self.date_to))
    }
}

/// Anything that can list matches: the live API, or a fake in tests.
#[async_trait]
pub trait MatchSource: Send + Sync {
    async fn fetch_matches(&self, query: &MatchQuery) -> Result<Vec<Match>, AppError>;
}

/// football-data.org v4 client.
#[derive(Clone)]
pub struct FootballDataClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    competition: String,
}

impl FootballDataClient {
    pub fn new(base_url: &str, api_key: String, competition: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            competition,
        }
    }

    /// Check response status and map failures onto [`UpstreamFailure`].
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, AppError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let failure = match status.as_u16() {
            429 => {
                tracing::warn!("football-data rate limit hit (429)");
                UpstreamFailure::RateLimited
            }
            code if status.is_server_error() => UpstreamFailure::Server(code),
            code => UpstreamFailure::Rejected(code),
        };
        Err(AppError::upstream(failure, body))
    }
}

#[async_trait]
impl MatchSource for FootballDataClient {
    async fn fetch_matches(&self, query: &MatchQuery) -> Result<Vec<Match>, AppError> {
        let url = format!(
            "{}/competitions/{}/matches",
            self.base_url,
            urlencoding::encode(&self.competition)
        );

        let mut params = Vec::new();
        if let Some(from) = query.date_from {
            params.push(("dateFrom", from.format("%Y-%m-%d").to_string()));
        }
        if let Some(to) = query.date_to {
            params.push(("dateTo", to.format("%Y-%m-%d").to_string()));
        }

        let response = self
            .http
            .get(&url)
            .header("X-Auth-Token", &self.api_key)
            .query(&params)
            .send()
            .await
            .map_err(|e| AppError::upstream(UpstreamFailure::Network, e.to_string()))?;

        let response = Self::check_response(response).await?;
        let listing: ApiMatchList = response
            .json()
            .await
            .map_err(|e| AppError::upstream(UpstreamFailure::Decode, e.to_string()))?;

        let now = Utc::now();
        let total = listing.matches.len();
        let matches: Vec<Match> = listing
            .matches
            .into_iter()
            .filter_map(|m| m.into_match(now))
            .collect();

        tracing::debug!(
            key = %query.cache_key(),
            total,
            mapped = matches.len(),
            "Fetched matches from football-data"
        );
        Ok(matches)
    }
}

/// Map an upstream status string. Unknown values yield `None`.
pub fn map_status(status: &str) -> Option<MatchStatus> {
    match status {
        "SCHEDULED" | "TIMED" | "POSTPONED" => Some(MatchStatus::Scheduled),
        "IN_PLAY" | "PAUSED" | "LIVE" => Some(MatchStatus::Live),
        "SUSPENDED" | "CANCELLED" => Some(MatchStatus::Halted),
        "FINISHED" | "AWARDED" => Some(MatchStatus::Finished),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct ApiMatchList {
    #[serde(default)]
    matches: Vec<ApiMatch>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiMatch {
    id: u64,
    utc_date: DateTime<Utc>,
    status: String,
    matchday: Option<u32>,
    season: Option<ApiSeason>,
    home_team: ApiTeam,
    away_team: ApiTeam,
    score: Option<ApiScore>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiSeason {
    start_date: NaiveDate,
    end_date: NaiveDate,
}

#[derive(Debug, Deserialize)]
struct ApiTeam {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiScore {
    full_time: Option<ApiGoals>,
}

#[derive(Debug, Deserialize)]
struct ApiGoals {
    home: Option<u32>,
    away: Option<u32>,
}

impl ApiMatch {
    fn into_match(self, now: DateTime<Utc>) -> Option<Match> {
        let Some(status) = map_status(&self.status) else {
            tracing::warn!(
                external_id = self.id,
                status = %self.status,
                "Skipping match with unknown status"
            );
            return None;
        };

        // Only a finished match carries a score
        let (home_score, away_score) = match (status, self.score.and_then(|s| s.full_time)) {
            (MatchStatus::Finished, Some(goals)) => (goals.home, goals.away),
            _ => (None, None),
        };

        let season = match self.season {
            Some(s) => format!("{}/{:02}", s.start_date.year(), s.end_date.year() % 100),
            None => self.utc_date.year().to_string(),
        };

        Some(Match {
            id: self.id.to_string(),
            external_id: self.id,
            home_team: self.home_team.name.unwrap_or_default(),
            away_team: self.away_team.name.unwrap_or_default(),
            status,
            home_score,
            away_score,
            kickoff: self.utc_date,
            round: self.matchday,
            season,
            created_at: now,
            updated_at: now,
        })
    }
}
