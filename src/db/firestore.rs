// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides the [`Store`] port over Firestore:
//! - Users (profile and running point total)
//! - Matches (ingested from the football-data feed)
//! - Forecasts (document ID is the (user, match) pair)
//! - Settlement intents (write-ahead records for large settlements)
//!
//! Transactions read through a transaction-bound client so Firestore
//! tracks the read set and aborts on concurrent modification.

use super::{collections, Store, StoreError, StoreTx};
use crate::models::{Forecast, Match, SettlementIntent, User};
use async_trait::async_trait;
use firestore::errors::FirestoreError;
use firestore::{
    FirestoreConsistencySelector, FirestoreQueryDirection, FirestoreTransaction,
    FirestoreWritePrecondition,
};
use futures_util::{stream, StreamExt};

const MAX_CONCURRENT_DB_OPS: usize = 50;
// Firestore limits batch/transaction writes to 500 operations.
// We use a safe limit of 400 to allow headroom.
const BATCH_SIZE: usize = 400;

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreStore {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreStore {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, StoreError> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id).await.map_err(|e| {
            StoreError::Unavailable(format!("Failed to connect to Firestore: {}", e))
        })?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, StoreError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            StoreError::Unavailable(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, StoreError> {
        self.client.as_ref().ok_or(StoreError::Offline)
    }

    async fn get_doc<T>(&self, collection: &str, id: &str) -> Result<Option<T>, StoreError>
    where
        T: serde::de::DeserializeOwned + Send,
    {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collection)
            .obj()
            .one(id)
            .await
            .map_err(map_error)
    }
}

/// gRPC status names as carried in Firestore error details.
const ALREADY_EXISTS: &str = "AlreadyExists";
const ABORTED: &str = "Aborted";

/// Translate a Firestore error into the storage taxonomy.
fn map_error(err: FirestoreError) -> StoreError {
    match err {
        FirestoreError::DataConflictError(_) => StoreError::Conflict,
        // Contention on something the transaction read
        FirestoreError::DatabaseError(ref e) if e.public.code == ABORTED => StoreError::Conflict,
        FirestoreError::DatabaseError(_) | FirestoreError::NetworkError(_) => {
            StoreError::Unavailable(err.to_string())
        }
        FirestoreError::SerializeError(_) | FirestoreError::DeserializeError(_) => {
            StoreError::Serialization(err.to_string())
        }
        other => StoreError::Backend(other.to_string()),
    }
}

/// Commit failures: only ALREADY_EXISTS from a transaction holding a
/// create-only write is a uniqueness collision.
fn map_commit_error(err: FirestoreError, has_create: bool) -> StoreError {
    match err {
        FirestoreError::DataConflictError(ref e) if has_create && e.public.code == ALREADY_EXISTS => {
            StoreError::UniqueViolation {
                collection: collections::FORECASTS,
            }
        }
        other => map_error(other),
    }
}

#[async_trait]
impl Store for FirestoreStore {
    async fn begin<'a>(&'a self) -> Result<Box<dyn StoreTx + 'a>, StoreError> {
        let client = self.get_client()?;
        let transaction = client.begin_transaction().await.map_err(|e| {
            StoreError::Unavailable(format!("Failed to begin transaction: {}", e))
        })?;

        // Reads through this handle join the transaction's read set.
        let reader = client.clone_with_consistency_selector(
            FirestoreConsistencySelector::Transaction(transaction.transaction_id().clone()),
        );

        Ok(Box::new(FirestoreTx {
            client,
            reader,
            transaction,
            staged_writes: 0,
            has_create: false,
        }))
    }

    fn max_transaction_writes(&self) -> Option<usize> {
        Some(BATCH_SIZE)
    }

    async fn get_match(&self, match_id: &str) -> Result<Option<Match>, StoreError> {
        self.get_doc(collections::MATCHES, match_id).await
    }

    /// Store match records.
    ///
    /// Uses concurrent writes with a limit to avoid overloading Firestore.
    async fn upsert_matches(&self, matches: &[Match]) -> Result<(), StoreError> {
        let client = self.get_client()?;

        stream::iter(matches.to_vec())
            .map(|record| async move {
                let _: () = client
                    .fluent()
                    .update()
                    .in_col(collections::MATCHES)
                    .document_id(&record.id)
                    .object(&record)
                    .execute()
                    .await
                    .map_err(map_error)?;

                Ok::<_, StoreError>(())
            })
            .buffer_unordered(MAX_CONCURRENT_DB_OPS)
            .collect::<Vec<Result<(), StoreError>>>()
            .await
            .into_iter()
            .collect::<Result<Vec<()>, StoreError>>()?;

        Ok(())
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        self.get_doc(collections::USERS, user_id).await
    }

    async fn upsert_user(&self, user: &User) -> Result<(), StoreError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::USERS)
            .document_id(&user.id)
            .object(user)
            .execute()
            .await
            .map_err(map_error)?;
        Ok(())
    }

    async fn get_forecast(
        &self,
        user_id: &str,
        match_id: &str,
    ) -> Result<Option<Forecast>, StoreError> {
        self.get_doc(collections::FORECASTS, &Forecast::doc_id(user_id, match_id))
            .await
    }

    async fn forecasts_for_user(&self, user_id: &str) -> Result<Vec<Forecast>, StoreError> {
        let user_id = user_id.to_string();
        self.get_client()?
            .fluent()
            .select()
            .from(collections::FORECASTS)
            .filter(move |q| q.for_all([q.field("user_id").eq(user_id.clone())]))
            .order_by([("created_at", FirestoreQueryDirection::Descending)])
            .obj()
            .query()
            .await
            .map_err(map_error)
    }

    async fn leaderboard(&self, limit: u32) -> Result<Vec<User>, StoreError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::USERS)
            .order_by([("total_points", FirestoreQueryDirection::Descending)])
            .limit(limit)
            .obj()
            .query()
            .await
            .map_err(map_error)
    }

    async fn get_settlement_intent(
        &self,
        match_id: &str,
    ) -> Result<Option<SettlementIntent>, StoreError> {
        self.get_doc(collections::SETTLEMENT_INTENTS, match_id).await
    }
}

/// A Firestore transaction: reads via `reader`, writes buffered in `transaction`.
struct FirestoreTx<'a> {
    client: &'a firestore::FirestoreDb,
    reader: firestore::FirestoreDb,
    transaction: FirestoreTransaction<'a>,
    staged_writes: usize,
    has_create: bool,
}

impl FirestoreTx<'_> {
    async fn read_doc<T>(&self, collection: &str, id: &str) -> Result<Option<T>, StoreError>
    where
        T: serde::de::DeserializeOwned + Send,
    {
        self.reader
            .fluent()
            .select()
            .by_id_in(collection)
            .obj()
            .one(id)
            .await
            .map_err(map_error)
    }

    fn reserve(&mut self, count: usize) -> Result<(), StoreError> {
        if self.staged_writes + count > BATCH_SIZE {
            return Err(StoreError::WriteLimit { limit: BATCH_SIZE });
        }
        self.staged_writes += count;
        Ok(())
    }

    fn stage_put<T>(&mut self, collection: &str, id: &str, object: &T) -> Result<(), StoreError>
    where
        T: serde::Serialize + serde::de::DeserializeOwned + Sync + Send,
    {
        self.reserve(1)?;
        self.client
            .fluent()
            .update()
            .in_col(collection)
            .document_id(id)
            .object(object)
            .add_to_transaction(&mut self.transaction)
            .map_err(map_error)?;
        Ok(())
    }
}

#[async_trait]
impl StoreTx for FirestoreTx<'_> {
    async fn get_match(&mut self, match_id: &str) -> Result<Option<Match>, StoreError> {
        self.read_doc(collections::MATCHES, match_id).await
    }

    async fn get_user(&mut self, user_id: &str) -> Result<Option<User>, StoreError> {
        self.read_doc(collections::USERS, user_id).await
    }

    async fn get_forecast(
        &mut self,
        user_id: &str,
        match_id: &str,
    ) -> Result<Option<Forecast>, StoreError> {
        self.read_doc(collections::FORECASTS, &Forecast::doc_id(user_id, match_id))
            .await
    }

    async fn forecasts_for_match(
        &mut self,
        match_id: &str,
        settled: bool,
    ) -> Result<Vec<Forecast>, StoreError> {
        let match_id = match_id.to_string();
        self.reader
            .fluent()
            .select()
            .from(collections::FORECASTS)
            .filter(move |q| {
                q.for_all([
                    q.field("match_id").eq(match_id.clone()),
                    q.field("settled").eq(settled),
                ])
            })
            .obj()
            .query()
            .await
            .map_err(map_error)
    }

    async fn get_settlement_intent(
        &mut self,
        match_id: &str,
    ) -> Result<Option<SettlementIntent>, StoreError> {
        self.read_doc(collections::SETTLEMENT_INTENTS, match_id)
            .await
    }

    fn insert_forecast(&mut self, forecast: &Forecast) -> Result<(), StoreError> {
        self.reserve(1)?;
        self.has_create = true;
        self.client
            .fluent()
            .update()
            .in_col(collections::FORECASTS)
            .precondition(FirestoreWritePrecondition::Exists(false))
            .document_id(&forecast.id)
            .object(forecast)
            .add_to_transaction(&mut self.transaction)
            .map_err(map_error)?;
        Ok(())
    }

    fn update_forecast(&mut self, forecast: &Forecast) -> Result<(), StoreError> {
        self.stage_put(collections::FORECASTS, &forecast.id, forecast)
    }

    fn upsert_forecasts(&mut self, forecasts: &[Forecast]) -> Result<(), StoreError> {
        forecasts
            .iter()
            .try_for_each(|f| self.stage_put(collections::FORECASTS, &f.id, f))
    }

    fn upsert_users(&mut self, users: &[User]) -> Result<(), StoreError> {
        users
            .iter()
            .try_for_each(|u| self.stage_put(collections::USERS, &u.id, u))
    }

    fn put_settlement_intent(&mut self, intent: &SettlementIntent) -> Result<(), StoreError> {
        self.stage_put(collections::SETTLEMENT_INTENTS, &intent.match_id, intent)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let has_create = self.has_create;
        self.transaction
            .commit()
            .await
            .map(|_| ())
            .map_err(|e| map_commit_error(e, has_create))
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.transaction
            .rollback()
            .await
            .map(|_| ())
            .map_err(map_error)
    }
}
