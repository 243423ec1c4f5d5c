// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Forecast submission tests.
//!
//! Covers the forecast window, the one-forecast-per-(user, match) rule,
//! settled-record immutability and recovery from storage failures.

use async_trait::async_trait;
use chrono::Duration;
use scorecast::db::{collections, MemoryStore, Store, StoreError, StoreTx};
use scorecast::error::AppError;
use scorecast::models::{Forecast, Match, MatchStatus, SettlementIntent, User};
use scorecast::resilience::{CircuitBreaker, CircuitBreakerConfig, RetryPolicy};
use scorecast::services::{ForecastCoordinator, WindowStatus};
use scorecast::time_utils::ManualClock;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

mod common;
use common::{
    base_time, create_test_app, kickoff, make_match, seed_forecast, seed_match, LogCapture,
};

#[tokio::test(start_paused = true)]
async fn test_submit_creates_forecast() {
    let app = create_test_app();
    seed_match(&app.store, make_match("1", MatchStatus::Scheduled, None)).await;

    let forecast = app.state.forecasts.submit("u1", "1", 2, 1).await.unwrap();
    assert_eq!(forecast.id, "u1_1");
    assert_eq!((forecast.predicted_home, forecast.predicted_away), (2, 1));
    assert!(!forecast.settled);
    assert_eq!(forecast.created_at, base_time());

    let stored = app.store.get_forecast("u1", "1").await.unwrap().unwrap();
    assert_eq!(stored, forecast);
}

#[tokio::test(start_paused = true)]
async fn test_resubmit_updates_in_place() {
    let app = create_test_app();
    seed_match(&app.store, make_match("1", MatchStatus::Scheduled, None)).await;

    app.state.forecasts.submit("u1", "1", 2, 1).await.unwrap();
    app.clock.advance(Duration::minutes(10));
    let updated = app.state.forecasts.submit("u1", "1", 0, 0).await.unwrap();

    assert_eq!((updated.predicted_home, updated.predicted_away), (0, 0));
    assert_eq!(updated.created_at, base_time());
    assert_eq!(updated.updated_at, base_time() + Duration::minutes(10));
    assert_eq!(app.store.document_count(collections::FORECASTS), 1);
}

#[tokio::test(start_paused = true)]
async fn test_out_of_range_score_is_rejected() {
    let app = create_test_app();
    seed_match(&app.store, make_match("1", MatchStatus::Scheduled, None)).await;

    let err = app.state.forecasts.submit("u1", "1", 21, 0).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    let err = app.state.forecasts.submit("u1", "1", 0, 21).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    // The limit itself is fine
    app.state.forecasts.submit("u1", "1", 20, 20).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_unknown_match_is_not_found() {
    let app = create_test_app();
    let err = app.state.forecasts.submit("u1", "nope", 1, 0).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    assert_eq!(app.store.document_count(collections::FORECASTS), 0);
}

#[tokio::test(start_paused = true)]
async fn test_locked_two_hours_before_kickoff() {
    let app = create_test_app();
    seed_match(&app.store, make_match("1", MatchStatus::Scheduled, None)).await;

    // One second before the lock is still open
    app.clock.set(kickoff() - Duration::hours(2) - Duration::seconds(1));
    app.state.forecasts.submit("u1", "1", 1, 1).await.unwrap();

    app.clock.set(kickoff() - Duration::hours(2));
    let err = app.state.forecasts.submit("u1", "1", 2, 2).await.unwrap_err();
    assert!(matches!(err, AppError::TimingViolation(WindowStatus::Locked)), "{err:?}");

    // The earlier forecast is unchanged
    let stored = app.store.get_forecast("u1", "1").await.unwrap().unwrap();
    assert_eq!((stored.predicted_home, stored.predicted_away), (1, 1));
}

#[tokio::test(start_paused = true)]
async fn test_expired_at_kickoff() {
    let app = create_test_app();
    seed_match(&app.store, make_match("1", MatchStatus::Scheduled, None)).await;

    app.clock.set(kickoff());
    let err = app.state.forecasts.submit("u1", "1", 1, 0).await.unwrap_err();
    assert!(matches!(err, AppError::TimingViolation(WindowStatus::Expired)));
}

#[tokio::test(start_paused = true)]
async fn test_expired_once_match_leaves_scheduled() {
    let app = create_test_app();
    // Kickoff is hours away but the match is already marked live
    seed_match(&app.store, make_match("1", MatchStatus::Live, None)).await;

    let err = app.state.forecasts.submit("u1", "1", 1, 0).await.unwrap_err();
    assert!(matches!(err, AppError::TimingViolation(WindowStatus::Expired)));
    assert_eq!(app.store.document_count(collections::FORECASTS), 0);
}

#[tokio::test(start_paused = true)]
async fn test_settled_forecast_is_immutable() {
    let app = create_test_app();
    seed_match(&app.store, make_match("1", MatchStatus::Scheduled, None)).await;
    seed_forecast(&app.store, "u1", "1", 1, 0).await;

    let mut settled = app.store.get_forecast("u1", "1").await.unwrap().unwrap();
    settled.settled = true;
    settled.points = 2;
    let mut tx = app.store.begin().await.unwrap();
    tx.update_forecast(&settled).unwrap();
    tx.commit().await.unwrap();

    let err = app.state.forecasts.submit("u1", "1", 3, 3).await.unwrap_err();
    assert!(matches!(err, AppError::ImmutableRecord));

    let stored = app.store.get_forecast("u1", "1").await.unwrap().unwrap();
    assert_eq!(stored, settled);
}

/// Hands control back to the scheduler inside every forecast read, so two
/// submissions joined on one task interleave between read and commit.
struct YieldingStore {
    inner: MemoryStore,
    collisions: AtomicU32,
}

struct YieldingTx<'a> {
    inner: Box<dyn StoreTx + 'a>,
    collisions: &'a AtomicU32,
}

#[async_trait]
impl Store for YieldingStore {
    async fn begin<'a>(&'a self) -> Result<Box<dyn StoreTx + 'a>, StoreError> {
        Ok(Box::new(YieldingTx {
            inner: self.inner.begin().await?,
            collisions: &self.collisions,
        }))
    }

    fn max_transaction_writes(&self) -> Option<usize> {
        self.inner.max_transaction_writes()
    }

    async fn get_match(&self, match_id: &str) -> Result<Option<Match>, StoreError> {
        self.inner.get_match(match_id).await
    }

    async fn upsert_matches(&self, matches: &[Match]) -> Result<(), StoreError> {
        self.inner.upsert_matches(matches).await
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        self.inner.get_user(user_id).await
    }

    async fn upsert_user(&self, user: &User) -> Result<(), StoreError> {
        self.inner.upsert_user(user).await
    }

    async fn get_forecast(
        &self,
        user_id: &str,
        match_id: &str,
    ) -> Result<Option<Forecast>, StoreError> {
        self.inner.get_forecast(user_id, match_id).await
    }

    async fn forecasts_for_user(&self, user_id: &str) -> Result<Vec<Forecast>, StoreError> {
        self.inner.forecasts_for_user(user_id).await
    }

    async fn leaderboard(&self, limit: u32) -> Result<Vec<User>, StoreError> {
        self.inner.leaderboard(limit).await
    }

    async fn get_settlement_intent(
        &self,
        match_id: &str,
    ) -> Result<Option<SettlementIntent>, StoreError> {
        self.inner.get_settlement_intent(match_id).await
    }
}

#[async_trait]
impl StoreTx for YieldingTx<'_> {
    async fn get_match(&mut self, match_id: &str) -> Result<Option<Match>, StoreError> {
        self.inner.get_match(match_id).await
    }

    async fn get_user(&mut self, user_id: &str) -> Result<Option<User>, StoreError> {
        self.inner.get_user(user_id).await
    }

    async fn get_forecast(
        &mut self,
        user_id: &str,
        match_id: &str,
    ) -> Result<Option<Forecast>, StoreError> {
        let found = self.inner.get_forecast(user_id, match_id).await;
        tokio::task::yield_now().await;
        found
    }

    async fn forecasts_for_match(
        &mut self,
        match_id: &str,
        settled: bool,
    ) -> Result<Vec<Forecast>, StoreError> {
        self.inner.forecasts_for_match(match_id, settled).await
    }

    async fn get_settlement_intent(
        &mut self,
        match_id: &str,
    ) -> Result<Option<SettlementIntent>, StoreError> {
        self.inner.get_settlement_intent(match_id).await
    }

    fn insert_forecast(&mut self, forecast: &Forecast) -> Result<(), StoreError> {
        self.inner.insert_forecast(forecast)
    }

    fn update_forecast(&mut self, forecast: &Forecast) -> Result<(), StoreError> {
        self.inner.update_forecast(forecast)
    }

    fn upsert_forecasts(&mut self, forecasts: &[Forecast]) -> Result<(), StoreError> {
        self.inner.upsert_forecasts(forecasts)
    }

    fn upsert_users(&mut self, users: &[User]) -> Result<(), StoreError> {
        self.inner.upsert_users(users)
    }

    fn put_settlement_intent(&mut self, intent: &SettlementIntent) -> Result<(), StoreError> {
        self.inner.put_settlement_intent(intent)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let result = self.inner.commit().await;
        if matches!(result, Err(StoreError::UniqueViolation { .. })) {
            self.collisions.fetch_add(1, Ordering::SeqCst);
        }
        result
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.inner.rollback().await
    }
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_first_submissions_leave_one_forecast() {
    let memory = MemoryStore::new();
    seed_match(&memory, make_match("1", MatchStatus::Scheduled, None)).await;
    let store = Arc::new(YieldingStore {
        inner: memory.clone(),
        collisions: AtomicU32::new(0),
    });
    let forecasts = ForecastCoordinator::new(
        store.clone(),
        Arc::new(ManualClock::new(base_time())),
        RetryPolicy::storage(),
        Arc::new(CircuitBreaker::new("storage", CircuitBreakerConfig::default())),
    );

    let (a, b) = tokio::join!(
        forecasts.submit("u1", "1", 1, 0),
        forecasts.submit("u1", "1", 0, 1),
    );
    a.unwrap();
    b.unwrap();

    // Both read "no forecast" before either committed
    assert_eq!(store.collisions.load(Ordering::SeqCst), 1);
    assert_eq!(memory.document_count(collections::FORECASTS), 1);
    let stored = memory.get_forecast("u1", "1").await.unwrap().unwrap();
    let values = (stored.predicted_home, stored.predicted_away);
    assert!(values == (1, 0) || values == (0, 1), "{values:?}");
}

#[tokio::test(start_paused = true)]
async fn test_store_rejects_duplicate_create() {
    let app = create_test_app();
    seed_forecast(&app.store, "u1", "1", 1, 0).await;

    let duplicate = app.store.get_forecast("u1", "1").await.unwrap().unwrap();
    let mut tx = app.store.begin().await.unwrap();
    tx.insert_forecast(&duplicate).unwrap();
    let err = tx.commit().await.unwrap_err();
    assert!(matches!(err, StoreError::UniqueViolation { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_transient_commit_failure_is_retried() {
    let app = create_test_app();
    seed_match(&app.store, make_match("1", MatchStatus::Scheduled, None)).await;

    app.store.fail_next_commits(2);
    let forecast = app.state.forecasts.submit("u1", "1", 2, 2).await.unwrap();
    assert_eq!(forecast.predicted_home, 2);
    assert_eq!(app.store.document_count(collections::FORECASTS), 1);
}

#[tokio::test(start_paused = true)]
async fn test_persistent_failures_open_the_breaker() {
    let app = create_test_app();
    seed_match(&app.store, make_match("1", MatchStatus::Scheduled, None)).await;

    app.store.fail_next_commits(100);
    let err = app.state.forecasts.submit("u1", "1", 2, 2).await.unwrap_err();
    assert!(matches!(err, AppError::RetriesExhausted { attempts: 3, .. }));

    // Two more failures reach the threshold of five, then the circuit
    // fails fast without touching the store
    let err = app.state.forecasts.submit("u1", "1", 2, 2).await.unwrap_err();
    assert!(matches!(err, AppError::Unavailable("storage")), "{err:?}");

    let err = app.state.forecasts.submit("u1", "1", 2, 2).await.unwrap_err();
    assert!(matches!(err, AppError::Unavailable("storage")));
    assert_eq!(app.store.document_count(collections::FORECASTS), 0);
}

#[tokio::test(start_paused = true)]
async fn test_breaker_recovers_after_reset_timeout() {
    let app = create_test_app();
    seed_match(&app.store, make_match("1", MatchStatus::Scheduled, None)).await;

    app.store.fail_next_commits(5);
    let _ = app.state.forecasts.submit("u1", "1", 2, 2).await;
    let _ = app.state.forecasts.submit("u1", "1", 2, 2).await;
    assert!(matches!(
        app.state.forecasts.submit("u1", "1", 2, 2).await,
        Err(AppError::Unavailable(_))
    ));

    tokio::time::advance(std::time::Duration::from_secs(31)).await;
    let forecast = app.state.forecasts.submit("u1", "1", 2, 2).await.unwrap();
    assert_eq!(forecast.predicted_away, 2);
}

#[tokio::test(start_paused = true)]
async fn test_validation_errors_do_not_trip_breaker() {
    let app = create_test_app();
    for _ in 0..10 {
        let err = app.state.forecasts.submit("u1", "missing", 1, 1).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
    seed_match(&app.store, make_match("1", MatchStatus::Scheduled, None)).await;
    app.state.forecasts.submit("u1", "1", 1, 1).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_list_forecasts_for_user() {
    let app = create_test_app();
    for id in ["1", "2"] {
        seed_match(&app.store, make_match(id, MatchStatus::Scheduled, None)).await;
        app.state.forecasts.submit("u1", id, 1, 0).await.unwrap();
    }
    app.state.forecasts.submit("u2", "1", 0, 0).await.unwrap();

    let mine = app.state.forecasts.list_for_user("u1").await.unwrap();
    assert_eq!(mine.len(), 2);
    assert!(mine.iter().all(|f| f.user_id == "u1"));

    assert!(app.state.forecasts.get("u2", "2").await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_failure_log_names_user_and_match() {
    let app = create_test_app();
    seed_match(&app.store, make_match("1", MatchStatus::Scheduled, None)).await;
    let (logs, _guard) = LogCapture::install();

    app.store.fail_next_commits(3);
    let err = app.state.forecasts.submit("u7", "1", 2, 2).await.unwrap_err();
    assert!(matches!(err, AppError::RetriesExhausted { .. }));

    let errors = logs.operation_events("ERROR", "submit_forecast");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["fields"]["user_id"], "u7");
    assert_eq!(errors[0]["fields"]["entity_id"], "1");

    // Rejections carry the same context at debug level
    app.clock.set(kickoff());
    app.state.forecasts.submit("u7", "1", 0, 0).await.unwrap_err();
    let rejected = logs.operation_events("DEBUG", "submit_forecast");
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0]["fields"]["user_id"], "u7");
}
