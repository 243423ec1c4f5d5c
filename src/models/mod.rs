// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod forecast;
pub mod matches;
pub mod settlement;
pub mod user;

pub use forecast::Forecast;
pub use matches::{Match, MatchStatus};
pub use settlement::{IntentState, SettlementEntry, SettlementIntent, SettlementSummary};
pub use user::User;
