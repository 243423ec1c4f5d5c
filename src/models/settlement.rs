// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Settlement results and the write-ahead intent record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Aggregate result of settling one match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SettlementSummary {
    pub settled_count: u32,
    pub total_points_awarded: u32,
}

impl SettlementSummary {
    pub fn absorb(&mut self, other: SettlementSummary) {
        self.settled_count += other.settled_count;
        self.total_points_awarded += other.total_points_awarded;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentState {
    Pending,
    Completed,
}

/// Points decided for one forecast when the intent was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementEntry {
    pub forecast_id: String,
    pub user_id: String,
    pub points: u32,
}

/// Write-ahead record for a settlement too large for one transaction.
///
/// Stored at `settlement_intents/{match_id}`. While `Pending`, the next
/// settle call for the match resumes it before looking for new work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementIntent {
    pub match_id: String,
    pub final_home: u32,
    pub final_away: u32,
    pub entries: Vec<SettlementEntry>,
    pub state: IntentState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SettlementIntent {
    pub fn is_pending(&self) -> bool {
        self.state == IntentState::Pending
    }
}
