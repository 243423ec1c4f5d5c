// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User model for storage and API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User profile stored in Firestore.
///
/// Created by the login handoff; the core only ever touches `total_points`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Stable user ID (also used as document ID)
    pub id: String,
    /// Email address (unique per user)
    pub email: String,
    /// Name shown on the leaderboard
    pub display_name: String,
    /// Avatar URL
    pub avatar_url: Option<String>,
    /// Cumulative points, maintained incrementally by settlement
    #[serde(default)]
    pub total_points: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(id: &str, email: &str, display_name: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: id.to_string(),
            email: email.to_string(),
            display_name: display_name.to_string(),
            avatar_url: None,
            total_points: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Add settled points to the running total.
    pub fn award(&mut self, points: u32, now: DateTime<Utc>) {
        self.total_points = self.total_points.saturating_add(points);
        self.updated_at = now;
    }

    /// Reverse previously awarded points. Never goes below zero.
    pub fn revoke(&mut self, points: u32, now: DateTime<Utc>) {
        self.total_points = self.total_points.saturating_sub(points);
        self.updated_at = now;
    }
}
