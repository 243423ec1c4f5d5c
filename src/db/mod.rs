// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Database layer.
//!
//! Coordinators talk to storage only through [`Store`] and [`StoreTx`].
//! A transaction performs all of its reads first, buffers its writes and
//! applies them on commit, all or nothing. Uniqueness of forecasts is
//! carried by the document key, so a colliding create-only write fails at
//! commit with [`StoreError::UniqueViolation`].

pub mod firestore;
pub mod memory;

pub use self::firestore::FirestoreStore;
pub use memory::MemoryStore;

use crate::models::{Forecast, Match, SettlementIntent, User};
use async_trait::async_trait;

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    pub const MATCHES: &str = "matches";
    /// Keyed by `Forecast::doc_id(user_id, match_id)`
    pub const FORECASTS: &str = "forecasts";
    /// Write-ahead settlement records (keyed by match_id)
    pub const SETTLEMENT_INTENTS: &str = "settlement_intents";
}

/// Storage failures, kept distinct so callers can branch on them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// A create-only write hit an existing document.
    #[error("document already exists in {collection}")]
    UniqueViolation { collection: &'static str },

    /// Something read by the transaction changed before commit.
    #[error("transaction conflict")]
    Conflict,

    /// The backend is unreachable or overloaded; safe to retry.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The transaction staged more writes than the backend accepts.
    #[error("transaction exceeds write limit of {limit}")]
    WriteLimit { limit: usize },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("store error: {0}")]
    Backend(String),

    #[error("database not connected (offline mode)")]
    Offline,
}

/// Storage port used by the coordinators and their collaborators.
#[async_trait]
pub trait Store: Send + Sync {
    /// Begin a transaction.
    async fn begin<'a>(&'a self) -> Result<Box<dyn StoreTx + 'a>, StoreError>;

    /// Most writes one transaction may carry, if the backend is bounded.
    fn max_transaction_writes(&self) -> Option<usize>;

    async fn get_match(&self, match_id: &str) -> Result<Option<Match>, StoreError>;

    /// Insert or replace match records (ingestion path).
    async fn upsert_matches(&self, matches: &[Match]) -> Result<(), StoreError>;

    async fn get_user(&self, user_id: &str) -> Result<Option<User>, StoreError>;

    async fn upsert_user(&self, user: &User) -> Result<(), StoreError>;

    async fn get_forecast(
        &self,
        user_id: &str,
        match_id: &str,
    ) -> Result<Option<Forecast>, StoreError>;

    async fn forecasts_for_user(&self, user_id: &str) -> Result<Vec<Forecast>, StoreError>;

    /// Users ordered by total points, highest first.
    async fn leaderboard(&self, limit: u32) -> Result<Vec<User>, StoreError>;

    async fn get_settlement_intent(
        &self,
        match_id: &str,
    ) -> Result<Option<SettlementIntent>, StoreError>;
}

/// One atomic unit of work. Reads must precede writes.
#[async_trait]
pub trait StoreTx: Send {
    async fn get_match(&mut self, match_id: &str) -> Result<Option<Match>, StoreError>;

    async fn get_user(&mut self, user_id: &str) -> Result<Option<User>, StoreError>;

    async fn get_forecast(
        &mut self,
        user_id: &str,
        match_id: &str,
    ) -> Result<Option<Forecast>, StoreError>;

    /// Forecasts on a match with the given settled flag.
    async fn forecasts_for_match(
        &mut self,
        match_id: &str,
        settled: bool,
    ) -> Result<Vec<Forecast>, StoreError>;

    async fn get_settlement_intent(
        &mut self,
        match_id: &str,
    ) -> Result<Option<SettlementIntent>, StoreError>;

    /// Create-only write; collides with [`StoreError::UniqueViolation`] at commit.
    fn insert_forecast(&mut self, forecast: &Forecast) -> Result<(), StoreError>;

    fn update_forecast(&mut self, forecast: &Forecast) -> Result<(), StoreError>;

    fn upsert_forecasts(&mut self, forecasts: &[Forecast]) -> Result<(), StoreError>;

    fn upsert_users(&mut self, users: &[User]) -> Result<(), StoreError>;

    fn put_settlement_intent(&mut self, intent: &SettlementIntent) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// Commit `tx` if staging succeeded; otherwise roll it back and return the
/// staging error.
pub async fn finish<T, E>(tx: Box<dyn StoreTx + '_>, staged: Result<T, E>) -> Result<T, E>
where
    E: From<StoreError>,
{
    match staged {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback) = tx.rollback().await {
                tracing::warn!(error = %rollback, "Transaction rollback failed");
            }
            Err(err)
        }
    }
}
