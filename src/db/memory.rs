// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process document store.
//!
//! Documents are JSON values keyed by (collection, id), each with a
//! version. Transactions are optimistic: reads record the version they saw
//! and commit fails with [`StoreError::Conflict`] if any of them moved,
//! which makes every committed transaction serializable.
//!
//! Used for local development (`STORAGE_BACKEND=memory`) and tests.

use super::{collections, Store, StoreError, StoreTx};
use crate::models::{Forecast, Match, SettlementIntent, User};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

type DocKey = (&'static str, String);

struct Document {
    version: u64,
    body: Value,
}

#[derive(Default)]
struct Inner {
    docs: HashMap<DocKey, Document>,
    next_version: u64,
    /// Commits allowed through before `failing_commits` takes effect.
    passing_commits: u32,
    /// Commits that will fail with `Unavailable` before touching anything.
    failing_commits: u32,
    /// Non-transactional reads that will fail with `Unavailable`.
    failing_reads: u32,
}

impl Inner {
    fn take_read_failure(&mut self) -> Result<(), StoreError> {
        if self.failing_reads > 0 {
            self.failing_reads -= 1;
            return Err(StoreError::Unavailable("injected read failure".to_string()));
        }
        Ok(())
    }

    fn version_of(&self, key: &DocKey) -> Option<u64> {
        self.docs.get(key).map(|d| d.version)
    }

    fn put(&mut self, key: DocKey, body: Value) {
        self.next_version += 1;
        let version = self.next_version;
        self.docs.insert(key, Document { version, body });
    }

    /// (id, version) of every forecast on a match with the given flag.
    fn forecast_versions(&self, match_id: &str, settled: bool) -> Vec<(String, u64)> {
        let mut found: Vec<(String, u64)> = self
            .docs
            .iter()
            .filter(|((collection, _), _)| *collection == collections::FORECASTS)
            .filter(|(_, doc)| {
                doc.body.get("match_id").and_then(Value::as_str) == Some(match_id)
                    && doc.body.get("settled").and_then(Value::as_bool) == Some(settled)
            })
            .map(|((_, id), doc)| (id.clone(), doc.version))
            .collect();
        found.sort();
        found
    }
}

/// In-memory [`Store`] with serializable transactions.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    write_limit: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject transactions that stage more than `limit` writes.
    pub fn with_write_limit(limit: usize) -> Self {
        Self {
            inner: Arc::default(),
            write_limit: Some(limit),
        }
    }

    /// Make the next `count` commits fail as if the backend were down.
    pub fn fail_next_commits(&self, count: u32) {
        self.fail_commits_after(0, count);
    }

    /// Let `successes` commits through, then fail the following `count`.
    pub fn fail_commits_after(&self, successes: u32, count: u32) {
        let mut inner = self.inner.lock();
        inner.passing_commits = successes;
        inner.failing_commits = count;
    }

    /// Make the next `count` reads outside a transaction fail.
    pub fn fail_next_reads(&self, count: u32) {
        self.inner.lock().failing_reads = count;
    }

    /// Number of documents in a collection.
    pub fn document_count(&self, collection: &str) -> usize {
        self.inner
            .lock()
            .docs
            .keys()
            .filter(|(c, _)| *c == collection)
            .count()
    }

    fn read<T: DeserializeOwned>(
        &self,
        collection: &'static str,
        id: &str,
    ) -> Result<Option<T>, StoreError> {
        let mut inner = self.inner.lock();
        inner.take_read_failure()?;
        inner
            .docs
            .get(&(collection, id.to_string()))
            .map(|doc| decode(&doc.body))
            .transpose()
    }

    fn write<T: Serialize>(
        &self,
        collection: &'static str,
        id: &str,
        value: &T,
    ) -> Result<(), StoreError> {
        let body = encode(value)?;
        self.inner.lock().put((collection, id.to_string()), body);
        Ok(())
    }

    fn scan<T: DeserializeOwned>(
        &self,
        collection: &'static str,
        predicate: impl Fn(&Value) -> bool,
    ) -> Result<Vec<T>, StoreError> {
        let mut inner = self.inner.lock();
        inner.take_read_failure()?;
        inner
            .docs
            .iter()
            .filter(|((c, _), doc)| *c == collection && predicate(&doc.body))
            .map(|(_, doc)| decode(&doc.body))
            .collect()
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Value, StoreError> {
    serde_json::to_value(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(body: &Value) -> Result<T, StoreError> {
    serde_json::from_value(body.clone()).map_err(|e| StoreError::Serialization(e.to_string()))
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin<'a>(&'a self) -> Result<Box<dyn StoreTx + 'a>, StoreError> {
        Ok(Box::new(MemoryTx {
            store: self,
            reads: Vec::new(),
            writes: Vec::new(),
        }))
    }

    fn max_transaction_writes(&self) -> Option<usize> {
        self.write_limit
    }

    async fn get_match(&self, match_id: &str) -> Result<Option<Match>, StoreError> {
        self.read(collections::MATCHES, match_id)
    }

    async fn upsert_matches(&self, matches: &[Match]) -> Result<(), StoreError> {
        for m in matches {
            self.write(collections::MATCHES, &m.id, m)?;
        }
        Ok(())
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        self.read(collections::USERS, user_id)
    }

    async fn upsert_user(&self, user: &User) -> Result<(), StoreError> {
        self.write(collections::USERS, &user.id, user)
    }

    async fn get_forecast(
        &self,
        user_id: &str,
        match_id: &str,
    ) -> Result<Option<Forecast>, StoreError> {
        self.read(collections::FORECASTS, &Forecast::doc_id(user_id, match_id))
    }

    async fn forecasts_for_user(&self, user_id: &str) -> Result<Vec<Forecast>, StoreError> {
        let mut forecasts: Vec<Forecast> = self.scan(collections::FORECASTS, |body| {
            body.get("user_id").and_then(Value::as_str) == Some(user_id)
        })?;
        forecasts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(forecasts)
    }

    async fn leaderboard(&self, limit: u32) -> Result<Vec<User>, StoreError> {
        let mut users: Vec<User> = self.scan(collections::USERS, |_| true)?;
        users.sort_by(|a, b| b.total_points.cmp(&a.total_points).then(a.id.cmp(&b.id)));
        users.truncate(limit as usize);
        Ok(users)
    }

    async fn get_settlement_intent(
        &self,
        match_id: &str,
    ) -> Result<Option<SettlementIntent>, StoreError> {
        self.read(collections::SETTLEMENT_INTENTS, match_id)
    }
}

enum ReadRecord {
    Doc(DocKey, Option<u64>),
    ForecastsOnMatch {
        match_id: String,
        settled: bool,
        seen: Vec<(String, u64)>,
    },
}

enum Write {
    Create(DocKey, Value),
    Put(DocKey, Value),
}

/// Optimistic transaction over a [`MemoryStore`].
struct MemoryTx<'a> {
    store: &'a MemoryStore,
    reads: Vec<ReadRecord>,
    writes: Vec<Write>,
}

impl MemoryTx<'_> {
    fn read_doc<T: DeserializeOwned>(
        &mut self,
        collection: &'static str,
        id: &str,
    ) -> Result<Option<T>, StoreError> {
        let key = (collection, id.to_string());
        let inner = self.store.inner.lock();
        let doc = inner.docs.get(&key);
        let value = doc.map(|d| decode(&d.body)).transpose()?;
        self.reads.push(ReadRecord::Doc(key, doc.map(|d| d.version)));
        Ok(value)
    }

    fn stage(&mut self, write: Write) -> Result<(), StoreError> {
        if let Some(limit) = self.store.write_limit {
            if self.writes.len() >= limit {
                return Err(StoreError::WriteLimit { limit });
            }
        }
        self.writes.push(write);
        Ok(())
    }
}

#[async_trait]
impl StoreTx for MemoryTx<'_> {
    async fn get_match(&mut self, match_id: &str) -> Result<Option<Match>, StoreError> {
        self.read_doc(collections::MATCHES, match_id)
    }

    async fn get_user(&mut self, user_id: &str) -> Result<Option<User>, StoreError> {
        self.read_doc(collections::USERS, user_id)
    }

    async fn get_forecast(
        &mut self,
        user_id: &str,
        match_id: &str,
    ) -> Result<Option<Forecast>, StoreError> {
        self.read_doc(collections::FORECASTS, &Forecast::doc_id(user_id, match_id))
    }

    async fn forecasts_for_match(
        &mut self,
        match_id: &str,
        settled: bool,
    ) -> Result<Vec<Forecast>, StoreError> {
        let inner = self.store.inner.lock();
        let seen = inner.forecast_versions(match_id, settled);
        let forecasts = seen
            .iter()
            .filter_map(|(id, _)| inner.docs.get(&(collections::FORECASTS, id.clone())))
            .map(|doc| decode(&doc.body))
            .collect::<Result<Vec<Forecast>, StoreError>>()?;
        drop(inner);

        self.reads.push(ReadRecord::ForecastsOnMatch {
            match_id: match_id.to_string(),
            settled,
            seen,
        });
        Ok(forecasts)
    }

    async fn get_settlement_intent(
        &mut self,
        match_id: &str,
    ) -> Result<Option<SettlementIntent>, StoreError> {
        self.read_doc(collections::SETTLEMENT_INTENTS, match_id)
    }

    fn insert_forecast(&mut self, forecast: &Forecast) -> Result<(), StoreError> {
        let key = (collections::FORECASTS, forecast.id.clone());
        self.stage(Write::Create(key, encode(forecast)?))
    }

    fn update_forecast(&mut self, forecast: &Forecast) -> Result<(), StoreError> {
        let key = (collections::FORECASTS, forecast.id.clone());
        self.stage(Write::Put(key, encode(forecast)?))
    }

    fn upsert_forecasts(&mut self, forecasts: &[Forecast]) -> Result<(), StoreError> {
        forecasts.iter().try_for_each(|f| self.update_forecast(f))
    }

    fn upsert_users(&mut self, users: &[User]) -> Result<(), StoreError> {
        for user in users {
            let key = (collections::USERS, user.id.clone());
            self.stage(Write::Put(key, encode(user)?))?;
        }
        Ok(())
    }

    fn put_settlement_intent(&mut self, intent: &SettlementIntent) -> Result<(), StoreError> {
        let key = (collections::SETTLEMENT_INTENTS, intent.match_id.clone());
        self.stage(Write::Put(key, encode(intent)?))
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTx {
            store,
            reads,
            writes,
        } = *self;
        let mut inner = store.inner.lock();

        if inner.passing_commits > 0 {
            inner.passing_commits -= 1;
        } else if inner.failing_commits > 0 {
            inner.failing_commits -= 1;
            return Err(StoreError::Unavailable("injected commit failure".to_string()));
        }

        // Uniqueness is reported ahead of conflicts so racing creators see it.
        for write in &writes {
            if let Write::Create(key, _) = write {
                if inner.docs.contains_key(key) {
                    return Err(StoreError::UniqueViolation {
                        collection: key.0,
                    });
                }
            }
        }

        for read in &reads {
            let unchanged = match read {
                ReadRecord::Doc(key, version) => inner.version_of(key) == *version,
                ReadRecord::ForecastsOnMatch {
                    match_id,
                    settled,
                    seen,
                } => inner.forecast_versions(match_id, *settled) == *seen,
            };
            if !unchanged {
                return Err(StoreError::Conflict);
            }
        }

        for write in writes {
            let (Write::Create(key, body) | Write::Put(key, body)) = write;
            inner.put(key, body);
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
