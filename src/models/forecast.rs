// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Forecast model for storage and API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Highest goal count accepted in a forecast.
pub const MAX_PREDICTED_GOALS: u32 = 20;

/// A user's predicted score for one match.
///
/// Exactly one forecast exists per (user, match); the document ID is derived
/// from that pair so the store enforces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    /// Document ID, see [`Forecast::doc_id`]
    pub id: String,
    pub user_id: String,
    pub match_id: String,
    pub predicted_home: u32,
    pub predicted_away: u32,
    /// Points earned (0, 2 or 5); meaningful once settled
    #[serde(default)]
    pub points: u32,
    #[serde(default)]
    pub settled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Forecast {
    pub fn new(
        user_id: &str,
        match_id: &str,
        predicted_home: u32,
        predicted_away: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Self::doc_id(user_id, match_id),
            user_id: user_id.to_string(),
            match_id: match_id.to_string(),
            predicted_home,
            predicted_away,
            points: 0,
            settled: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Deterministic document ID for a (user, match) pair.
    ///
    /// Both halves are url-encoded so an ID containing `_` cannot collide
    /// with a different pair.
    pub fn doc_id(user_id: &str, match_id: &str) -> String {
        format!(
            "{}_{}",
            urlencoding::encode(user_id),
            urlencoding::encode(match_id)
        )
    }
}
