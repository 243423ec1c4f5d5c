use chrono::{Duration, Utc};
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use scorecast::db::{MemoryStore, Store};
use scorecast::models::{Forecast, Match, MatchStatus, User};
use scorecast::resilience::{CircuitBreaker, CircuitBreakerConfig, RetryPolicy};
use scorecast::services::{score, timing, SettlementCoordinator};
use scorecast::time_utils::SystemClock;
use std::hint::black_box;
use std::sync::Arc;

const FORECASTS: usize = 2_000;

fn benchmark_scoring(c: &mut Criterion) {
    let predictions: Vec<(u32, u32)> = (0..FORECASTS as u32).map(|i| (i % 5, i % 4)).collect();

    c.bench_function("score_batch", |b| {
        b.iter(|| {
            predictions
                .iter()
                .map(|&(h, a)| score(h, a, Some(2), Some(1)).map_or(0, |o| o.points))
                .sum::<u32>()
        })
    });

    let now = Utc::now();
    let kickoff = now + Duration::hours(2);
    c.bench_function("evaluate_window", |b| {
        b.iter(|| timing::evaluate(black_box(now), black_box(kickoff), MatchStatus::Scheduled))
    });
}

/// A finished match with one open forecast per user.
fn seeded_store(runtime: &tokio::runtime::Runtime) -> MemoryStore {
    let store = MemoryStore::new();
    let now = Utc::now();
    runtime.block_on(async {
        store
            .upsert_matches(&[Match {
                id: "bench".to_string(),
                external_id: 1,
                home_team: "Home".to_string(),
                away_team: "Away".to_string(),
                status: MatchStatus::Finished,
                home_score: Some(2),
                away_score: Some(1),
                kickoff: now,
                round: Some(1),
                season: "2025/26".to_string(),
                created_at: now,
                updated_at: now,
            }])
            .await
            .unwrap();

        let mut tx = store.begin().await.unwrap();
        let mut users = Vec::with_capacity(FORECASTS);
        for i in 0..FORECASTS {
            let user_id = format!("user{i}");
            let home = (i % 5) as u32;
            tx.insert_forecast(&Forecast::new(&user_id, "bench", home, 1, now))
                .unwrap();
            users.push(User::new(&user_id, &format!("{user_id}@example.com"), &user_id, now));
        }
        tx.upsert_users(&users).unwrap();
        tx.commit().await.unwrap();
    });
    store
}

fn benchmark_settlement(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("settle_match_2000_forecasts", |b| {
        b.iter_batched(
            || {
                let store: Arc<dyn Store> = Arc::new(seeded_store(&runtime));
                SettlementCoordinator::new(
                    store,
                    Arc::new(SystemClock),
                    RetryPolicy::storage(),
                    Arc::new(CircuitBreaker::new("bench", CircuitBreakerConfig::default())),
                )
            },
            |coordinator| runtime.block_on(coordinator.settle("bench")).unwrap(),
            BatchSize::LargeInput,
        )
    });
}

criterion_group!(benches, benchmark_scoring, benchmark_settlement);
criterion_main!(benches);
