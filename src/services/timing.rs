// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Forecast window: when a forecast may be created, edited, or is frozen.

use crate::models::MatchStatus;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Forecasts lock this long before kickoff.
pub const LOCK_WINDOW_HOURS: i64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "snake_case")]
pub enum WindowStatus {
    /// Create and edit allowed
    Available,
    /// Inside the lock window; existing forecast is visible but frozen
    Locked,
    /// Kicked off or no longer scheduled
    Expired,
}

impl std::fmt::Display for WindowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            WindowStatus::Available => "available",
            WindowStatus::Locked => "locked",
            WindowStatus::Expired => "expired",
        };
        f.write_str(label)
    }
}

/// Result of evaluating the forecast window for one match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForecastWindow {
    pub can_create: bool,
    pub can_edit: bool,
    pub is_locked: bool,
    pub is_expired: bool,
    pub status: WindowStatus,
    pub message: &'static str,
    /// When the window closes (kickoff minus the lock window)
    pub locks_at: DateTime<Utc>,
}

pub fn lock_window() -> Duration {
    Duration::hours(LOCK_WINDOW_HOURS)
}

/// Evaluate the forecast window.
///
/// Both boundaries are closed: exactly two hours before kickoff is already
/// locked, and kickoff itself is expired.
pub fn evaluate(now: DateTime<Utc>, kickoff: DateTime<Utc>, status: MatchStatus) -> ForecastWindow {
    let locks_at = kickoff - lock_window();

    let window_status = if status != MatchStatus::Scheduled || now >= kickoff {
        WindowStatus::Expired
    } else if kickoff - now <= lock_window() {
        WindowStatus::Locked
    } else {
        WindowStatus::Available
    };

    let open = window_status == WindowStatus::Available;
    ForecastWindow {
        can_create: open,
        can_edit: open,
        is_locked: window_status == WindowStatus::Locked,
        is_expired: window_status == WindowStatus::Expired,
        status: window_status,
        message: match window_status {
            WindowStatus::Available => "Forecasts are open.",
            WindowStatus::Locked => "Forecasts are locked in the 2 hours before kickoff.",
            WindowStatus::Expired => "This match has started or is no longer scheduled.",
        },
        locks_at,
    }
}
