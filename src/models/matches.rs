// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Match model and its consistency rules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Lifecycle of a match as reported by the upstream feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Scheduled,
    Live,
    Halted,
    Finished,
}

/// Stored match record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    /// Match ID (also used as document ID)
    pub id: String,
    /// ID of the match in the upstream feed
    pub external_id: u64,
    pub home_team: String,
    pub away_team: String,
    pub status: MatchStatus,
    /// Full-time home goals (Finished only)
    pub home_score: Option<u32>,
    /// Full-time away goals (Finished only)
    pub away_score: Option<u32>,
    pub kickoff: DateTime<Utc>,
    /// Competition round (1-38)
    pub round: Option<u32>,
    /// Season label, e.g. "2025/26"
    pub season: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const MIN_ROUND: u32 = 1;
pub const MAX_ROUND: u32 = 38;

/// Reasons a match record is rejected before it reaches storage.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatchInvariantError {
    #[error("home and away teams must differ")]
    SameTeams,
    #[error("finished match is missing a final score")]
    MissingScore,
    #[error("only finished matches may carry a score")]
    UnexpectedScore,
    #[error("round {0} is outside 1-38")]
    RoundOutOfRange(u32),
}

impl Match {
    /// Final score, present only once the match has finished.
    pub fn final_score(&self) -> Option<(u32, u32)> {
        match (self.status, self.home_score, self.away_score) {
            (MatchStatus::Finished, Some(home), Some(away)) => Some((home, away)),
            _ => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status == MatchStatus::Finished
    }

    /// Check the record-level invariants.
    pub fn validate(&self) -> Result<(), MatchInvariantError> {
        if self.home_team.trim().eq_ignore_ascii_case(self.away_team.trim()) {
            return Err(MatchInvariantError::SameTeams);
        }
        if let Some(round) = self.round {
            if !(MIN_ROUND..=MAX_ROUND).contains(&round) {
                return Err(MatchInvariantError::RoundOutOfRange(round));
            }
        }
        let has_any_score = self.home_score.is_some() || self.away_score.is_some();
        match self.status {
            MatchStatus::Finished if self.final_score().is_none() => {
                Err(MatchInvariantError::MissingScore)
            }
            MatchStatus::Finished => Ok(()),
            _ if has_any_score => Err(MatchInvariantError::UnexpectedScore),
            _ => Ok(()),
        }
    }
}
