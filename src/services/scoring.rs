// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Converts a forecast and a final score into points.

use crate::error::AppError;
use serde::Serialize;
use std::cmp::Ordering;

pub const EXACT_SCORE_POINTS: u32 = 5;
pub const CORRECT_OUTCOME_POINTS: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreReason {
    ExactScore,
    CorrectOutcome,
    Incorrect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScoreOutcome {
    pub points: u32,
    pub reason: ScoreReason,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScoringError {
    #[error("final score is not available")]
    InvalidInput,
}

impl From<ScoringError> for AppError {
    fn from(_: ScoringError) -> Self {
        AppError::PreconditionFailed("The match has no final score yet.")
    }
}

/// Home win, draw or away win.
fn outcome(home: u32, away: u32) -> Ordering {
    home.cmp(&away)
}

/// Score one forecast against the final result.
///
/// The actual score is optional so callers holding a match record can pass
/// it straight through; a missing half is `InvalidInput`.
pub fn score(
    predicted_home: u32,
    predicted_away: u32,
    actual_home: Option<u32>,
    actual_away: Option<u32>,
) -> Result<ScoreOutcome, ScoringError> {
    let (Some(actual_home), Some(actual_away)) = (actual_home, actual_away) else {
        return Err(ScoringError::InvalidInput);
    };

    let result = if predicted_home == actual_home && predicted_away == actual_away {
        ScoreOutcome {
            points: EXACT_SCORE_POINTS,
            reason: ScoreReason::ExactScore,
        }
    } else if outcome(predicted_home, predicted_away) == outcome(actual_home, actual_away) {
        ScoreOutcome {
            points: CORRECT_OUTCOME_POINTS,
            reason: ScoreReason::CorrectOutcome,
        }
    } else {
        ScoreOutcome {
            points: 0,
            reason: ScoreReason::Incorrect,
        }
    };
    Ok(result)
}
