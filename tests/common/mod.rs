// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;
use scorecast::config::Config;
use scorecast::db::{FirestoreStore, MemoryStore, Store};
use scorecast::error::{AppError, UpstreamFailure};
use scorecast::middleware::auth::create_jwt;
use scorecast::models::{Forecast, Match, MatchStatus, User};
use scorecast::routes::create_router;
use scorecast::services::{MatchQuery, MatchSource};
use scorecast::time_utils::ManualClock;
use scorecast::AppState;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_firestore() -> FirestoreStore {
    FirestoreStore::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Saturday lunchtime, three hours before the standard test kickoff.
#[allow(dead_code)]
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 8, 16, 12, 0, 0).unwrap()
}

#[allow(dead_code)]
pub fn kickoff() -> DateTime<Utc> {
    base_time() + Duration::hours(3)
}

#[allow(dead_code)]
pub fn make_match(id: &str, status: MatchStatus, score: Option<(u32, u32)>) -> Match {
    Match {
        id: id.to_string(),
        external_id: id.parse().unwrap_or(0),
        home_team: format!("Home {id}"),
        away_team: format!("Away {id}"),
        status,
        home_score: score.map(|(h, _)| h),
        away_score: score.map(|(_, a)| a),
        kickoff: kickoff(),
        round: Some(1),
        season: "2025/26".to_string(),
        created_at: base_time(),
        updated_at: base_time(),
    }
}

#[allow(dead_code)]
pub fn make_user(id: &str) -> User {
    User::new(id, &format!("{id}@example.com"), &format!("User {id}"), base_time())
}

#[allow(dead_code)]
pub async fn seed_match(store: &dyn Store, game: Match) {
    store.upsert_matches(&[game]).await.unwrap();
}

#[allow(dead_code)]
pub async fn seed_user(store: &dyn Store, id: &str) -> User {
    let user = make_user(id);
    store.upsert_user(&user).await.unwrap();
    user
}

/// Insert a forecast directly, bypassing the forecast window.
#[allow(dead_code)]
pub async fn seed_forecast(store: &dyn Store, user_id: &str, match_id: &str, home: u32, away: u32) {
    let forecast = Forecast::new(user_id, match_id, home, away, base_time());
    let mut tx = store.begin().await.unwrap();
    tx.insert_forecast(&forecast).unwrap();
    tx.commit().await.unwrap();
}

#[allow(dead_code)]
pub async fn total_points(store: &dyn Store, user_id: &str) -> u32 {
    store.get_user(user_id).await.unwrap().unwrap().total_points
}

/// Scripted upstream: queued failures first, then the current listing.
#[derive(Default)]
pub struct FakeSource {
    matches: Mutex<Vec<Match>>,
    failures: Mutex<VecDeque<UpstreamFailure>>,
    calls: AtomicU32,
}

#[allow(dead_code)]
impl FakeSource {
    pub fn new(matches: Vec<Match>) -> Self {
        Self {
            matches: Mutex::new(matches),
            ..Self::default()
        }
    }

    pub fn set_matches(&self, matches: Vec<Match>) {
        *self.matches.lock() = matches;
    }

    pub fn fail_next(&self, count: usize, failure: UpstreamFailure) {
        let mut failures = self.failures.lock();
        failures.extend(std::iter::repeat(failure).take(count));
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MatchSource for FakeSource {
    async fn fetch_matches(&self, _query: &MatchQuery) -> Result<Vec<Match>, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(failure) = self.failures.lock().pop_front() {
            return Err(AppError::upstream(failure, "scripted failure"));
        }
        Ok(self.matches.lock().clone())
    }
}

/// A router plus handles on everything behind it.
#[allow(dead_code)]
pub struct TestApp {
    pub router: axum::Router,
    pub state: Arc<AppState>,
    pub store: MemoryStore,
    pub clock: Arc<ManualClock>,
    pub source: Arc<FakeSource>,
}

#[allow(dead_code)]
impl TestApp {
    pub fn token(&self, user_id: &str) -> String {
        create_jwt(user_id, &self.state.config.jwt_signing_key).unwrap()
    }
}

/// Create a test app over an in-memory store with the clock at [`base_time`].
#[allow(dead_code)]
pub fn create_test_app() -> TestApp {
    create_test_app_with(MemoryStore::new())
}

#[allow(dead_code)]
pub fn create_test_app_with(store: MemoryStore) -> TestApp {
    let config = Config::test_default();
    let clock = Arc::new(ManualClock::new(base_time()));
    let source = Arc::new(FakeSource::default());

    let state = Arc::new(AppState::new(
        config,
        Arc::new(store.clone()),
        source.clone(),
        clock.clone(),
    ));

    TestApp {
        router: create_router(state.clone()),
        state,
        store,
        clock,
        source,
    }
}

/// Collects JSON log lines emitted while its guard is held on this thread.
#[allow(dead_code)]
#[derive(Clone, Default)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl std::io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[allow(dead_code)]
impl LogCapture {
    /// Install as this thread's default subscriber until the guard drops.
    /// Needs a current-thread runtime so spawned work stays on this thread.
    pub fn install() -> (Self, tracing::subscriber::DefaultGuard) {
        let capture = Self::default();
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(capture.clone())
            .finish();
        let guard = tracing::subscriber::set_default(subscriber);
        (capture, guard)
    }

    pub fn events(&self) -> Vec<serde_json::Value> {
        String::from_utf8_lossy(&self.buffer.lock())
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }

    /// Events at `level` whose `operation` field matches.
    pub fn operation_events(&self, level: &str, operation: &str) -> Vec<serde_json::Value> {
        self.events()
            .into_iter()
            .filter(|event| event["level"] == level && event["fields"]["operation"] == operation)
            .collect()
    }
}
