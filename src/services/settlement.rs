// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Match settlement: turn a final score into points for every open forecast.
//!
//! Settling flips each forecast to `settled` and adds its points to the
//! owner's total in the same transaction, so a forecast's points are
//! counted exactly when it is marked settled.
//!
//! When the batch needs more writes than one transaction allows, a
//! [`SettlementIntent`] recording every forecast's points is committed
//! first (in the transaction that read the batch), then applied in
//! budget-sized chunks and marked completed. Any later settle call for the
//! match finishes a pending intent before doing anything else.

use crate::db::{self, Store, StoreTx};
use crate::error::{AppError, Result};
use crate::models::{
    Forecast, IntentState, SettlementEntry, SettlementIntent, SettlementSummary, User,
};
use crate::resilience::{report, CircuitBreaker, RetryPolicy};
use crate::services::scoring;
use crate::time_utils::Clock;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

const NOT_FINISHED: &str = "The match has not finished or has no final score.";

pub struct SettlementCoordinator {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    breaker: Arc<CircuitBreaker>,
}

/// A forecast together with the points it is about to receive.
struct Award {
    forecast: Forecast,
    points: u32,
}

impl SettlementCoordinator {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            store,
            clock,
            retry,
            breaker,
        }
    }

    /// Settle every unsettled forecast on a finished match.
    ///
    /// Idempotent: a second call finds nothing unsettled and returns zeros.
    pub async fn settle(&self, match_id: &str) -> Result<SettlementSummary> {
        // Chunks committed by a failed attempt stay committed, so the
        // tally spans every attempt.
        let credited = Mutex::new(SettlementSummary::default());
        let credited = &credited;
        let result = self
            .retry
            .run("settle_match", move || {
                self.breaker.call(move || self.settle_once(match_id, credited))
            })
            .await
            .map(|()| *credited.lock());

        match &result {
            Ok(summary) => tracing::info!(
                match_id,
                settled_count = summary.settled_count,
                total_points_awarded = summary.total_points_awarded,
                "Match settled"
            ),
            Err(err) => {
                report(err, "settle_match", match_id);
            }
        }
        result
    }

    /// Administrative correction: take back previously awarded points,
    /// reopen the forecasts, then settle again against the current score.
    pub async fn resettle(&self, match_id: &str) -> Result<SettlementSummary> {
        let reversed = self
            .retry
            .run("reverse_settlement", move || {
                self.breaker.call(move || self.reverse_once(match_id))
            })
            .await;

        match reversed {
            Ok(reversed) => tracing::info!(
                match_id,
                forecasts = reversed.settled_count,
                points_revoked = reversed.total_points_awarded,
                "Settlement reversed"
            ),
            Err(err) => {
                report(&err, "reverse_settlement", match_id);
                return Err(err);
            }
        }

        self.settle(match_id).await
    }

    /// Writes one transaction may carry, if bounded.
    fn write_budget(&self) -> Option<usize> {
        self.store.max_transaction_writes()
    }

    async fn load_finished<'t>(
        tx: &mut (dyn StoreTx + 't),
        match_id: &str,
    ) -> Result<(u32, u32)> {
        let game = tx
            .get_match(match_id)
            .await?
            .ok_or(AppError::NotFound("Match not found."))?;
        game.final_score()
            .ok_or(AppError::PreconditionFailed(NOT_FINISHED))
    }

    async fn settle_once(
        &self,
        match_id: &str,
        credited: &Mutex<SettlementSummary>,
    ) -> Result<()> {
        loop {
            let mut tx = self.store.begin().await?;
            let staged = self.plan(&mut *tx, match_id).await;
            let plan = match staged {
                Ok(plan) => plan,
                Err(err) => return db::finish(tx, Err(err)).await,
            };

            match plan {
                Plan::Resume(intent) => {
                    tx.rollback().await?;
                    self.apply_intent(intent, credited).await?;
                    // Forecasts outside the intent may still be open
                }
                Plan::Nothing => {
                    tx.rollback().await?;
                    return Ok(());
                }
                Plan::Direct { awards, users } => {
                    let now = self.clock.now();
                    let staged = stage_awards(&mut *tx, &awards, users, now);
                    db::finish(tx, staged).await?;
                    credited.lock().absorb(totals(&awards));
                    return Ok(());
                }
                Plan::Intent(intent) => {
                    let staged = tx.put_settlement_intent(&intent).map_err(AppError::from);
                    db::finish(tx, staged).await?;
                    tracing::info!(
                        match_id,
                        entries = intent.entries.len(),
                        "Large settlement, wrote intent"
                    );
                    return self.apply_intent(intent, credited).await;
                }
            }
        }
    }

    /// Read everything the settlement needs and decide how to write it.
    async fn plan<'t>(&self, tx: &mut (dyn StoreTx + 't), match_id: &str) -> Result<Plan> {
        let (home, away) = Self::load_finished(tx, match_id).await?;

        if let Some(intent) = tx.get_settlement_intent(match_id).await? {
            if intent.is_pending() {
                return Ok(Plan::Resume(intent));
            }
        }

        let open = tx.forecasts_for_match(match_id, false).await?;
        if open.is_empty() {
            return Ok(Plan::Nothing);
        }

        let awards = open
            .into_iter()
            .map(|forecast| -> Result<Award> {
                let outcome = scoring::score(
                    forecast.predicted_home,
                    forecast.predicted_away,
                    Some(home),
                    Some(away),
                )?;
                Ok(Award {
                    forecast,
                    points: outcome.points,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let owners = distinct_users(awards.iter().map(|a| a.forecast.user_id.as_str()));
        let writes = awards.len() + owners.len();
        if self.write_budget().is_some_and(|budget| writes > budget) {
            let now = self.clock.now();
            return Ok(Plan::Intent(SettlementIntent {
                match_id: match_id.to_string(),
                final_home: home,
                final_away: away,
                entries: awards
                    .iter()
                    .map(|a| SettlementEntry {
                        forecast_id: a.forecast.id.clone(),
                        user_id: a.forecast.user_id.clone(),
                        points: a.points,
                    })
                    .collect(),
                state: IntentState::Pending,
                created_at: now,
                updated_at: now,
            }));
        }

        let users = load_users(tx, &owners).await?;
        Ok(Plan::Direct { awards, users })
    }

    /// Apply a pending intent chunk by chunk, then mark it completed.
    /// Each committed chunk is added to `credited` as soon as it lands.
    async fn apply_intent(
        &self,
        intent: SettlementIntent,
        credited: &Mutex<SettlementSummary>,
    ) -> Result<()> {
        // Worst case every forecast in a chunk has a different owner
        let chunk_size = self.write_budget().map_or(intent.entries.len(), |b| (b / 2).max(1));

        for chunk in intent.entries.chunks(chunk_size.max(1)) {
            let mut tx = self.store.begin().await?;
            let staged = self.stage_chunk(&mut *tx, &intent.match_id, chunk).await;
            let applied = db::finish(tx, staged).await?;
            credited.lock().absorb(applied);
        }

        let mut tx = self.store.begin().await?;
        let staged = self.stage_completion(&mut *tx, &intent.match_id).await;
        db::finish(tx, staged).await?;

        tracing::info!(
            match_id = %intent.match_id,
            entries = intent.entries.len(),
            "Settlement intent completed"
        );
        Ok(())
    }

    async fn stage_completion<'t>(
        &self,
        tx: &mut (dyn StoreTx + 't),
        match_id: &str,
    ) -> Result<()> {
        if let Some(mut current) = tx.get_settlement_intent(match_id).await? {
            if current.is_pending() {
                current.state = IntentState::Completed;
                current.updated_at = self.clock.now();
                tx.put_settlement_intent(&current)?;
            }
        }
        Ok(())
    }

    async fn stage_chunk<'t>(
        &self,
        tx: &mut (dyn StoreTx + 't),
        match_id: &str,
        chunk: &[SettlementEntry],
    ) -> Result<SettlementSummary> {
        let mut awards = Vec::with_capacity(chunk.len());
        for entry in chunk {
            match tx.get_forecast(&entry.user_id, match_id).await? {
                // Already applied by an earlier, interrupted run
                Some(forecast) if forecast.settled => {}
                Some(forecast) => awards.push(Award {
                    forecast,
                    points: entry.points,
                }),
                None => tracing::warn!(
                    match_id,
                    forecast_id = %entry.forecast_id,
                    "Forecast in settlement intent no longer exists"
                ),
            }
        }

        let owners = distinct_users(awards.iter().map(|a| a.forecast.user_id.as_str()));
        let users = load_users(tx, &owners).await?;
        stage_awards(tx, &awards, users, self.clock.now())?;
        Ok(totals(&awards))
    }

    async fn reverse_once(&self, match_id: &str) -> Result<SettlementSummary> {
        let mut reversed = SettlementSummary::default();

        loop {
            let mut tx = self.store.begin().await?;
            let staged = self.stage_reversal(&mut *tx, match_id).await;
            match staged {
                Ok(Reversal::Resume(intent)) => {
                    tx.rollback().await?;
                    // Points credited here are taken back by the next chunk
                    self.apply_intent(intent, &Mutex::new(SettlementSummary::default()))
                        .await?;
                }
                Ok(Reversal::Done) => {
                    tx.rollback().await?;
                    return Ok(reversed);
                }
                Ok(Reversal::Chunk(summary)) => {
                    tx.commit().await?;
                    reversed.absorb(summary);
                }
                Err(err) => return db::finish(tx, Err(err)).await,
            }
        }
    }

    /// Reopen up to one transaction's worth of settled forecasts.
    async fn stage_reversal<'t>(
        &self,
        tx: &mut (dyn StoreTx + 't),
        match_id: &str,
    ) -> Result<Reversal> {
        Self::load_finished(tx, match_id).await?;

        // Finish any half-applied settlement so the totals line up
        if let Some(intent) = tx.get_settlement_intent(match_id).await? {
            if intent.is_pending() {
                return Ok(Reversal::Resume(intent));
            }
        }

        let mut settled = tx.forecasts_for_match(match_id, true).await?;
        if settled.is_empty() {
            return Ok(Reversal::Done);
        }
        if let Some(budget) = self.write_budget() {
            settled.truncate((budget / 2).max(1));
        }

        let owners = distinct_users(settled.iter().map(|f| f.user_id.as_str()));
        let mut users = load_users(tx, &owners).await?;
        let now = self.clock.now();

        let mut summary = SettlementSummary::default();
        for forecast in &mut settled {
            if let Some(user) = users.get_mut(&forecast.user_id) {
                user.revoke(forecast.points, now);
            }
            summary.settled_count += 1;
            summary.total_points_awarded += forecast.points;
            forecast.settled = false;
            forecast.points = 0;
            forecast.updated_at = now;
        }

        tx.upsert_forecasts(&settled)?;
        let users: Vec<User> = users.into_values().collect();
        tx.upsert_users(&users)?;
        Ok(Reversal::Chunk(summary))
    }
}

enum Plan {
    Resume(SettlementIntent),
    Nothing,
    Direct {
        awards: Vec<Award>,
        users: BTreeMap<String, User>,
    },
    Intent(SettlementIntent),
}

enum Reversal {
    Resume(SettlementIntent),
    Chunk(SettlementSummary),
    Done,
}

fn distinct_users<'a>(ids: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut owners: Vec<String> = ids.map(str::to_string).collect();
    owners.sort();
    owners.dedup();
    owners
}

/// Read the owners inside the transaction. A missing owner is an error in
/// the data, but must not block everyone else's settlement.
async fn load_users<'t>(
    tx: &mut (dyn StoreTx + 't),
    owners: &[String],
) -> Result<BTreeMap<String, User>> {
    let mut users = BTreeMap::new();
    for user_id in owners {
        match tx.get_user(user_id).await? {
            Some(user) => {
                users.insert(user_id.clone(), user);
            }
            None => tracing::error!(
                user_id = %user_id,
                "Forecast owner not found, points not credited"
            ),
        }
    }
    Ok(users)
}

/// Stage settled forecasts and the matching user totals.
fn stage_awards<'t>(
    tx: &mut (dyn StoreTx + 't),
    awards: &[Award],
    mut users: BTreeMap<String, User>,
    now: DateTime<Utc>,
) -> Result<()> {
    let forecasts: Vec<Forecast> = awards
        .iter()
        .map(|award| {
            if let Some(user) = users.get_mut(&award.forecast.user_id) {
                user.award(award.points, now);
            }
            Forecast {
                points: award.points,
                settled: true,
                updated_at: now,
                ..award.forecast.clone()
            }
        })
        .collect();

    tx.upsert_forecasts(&forecasts)?;
    let users: Vec<User> = users.into_values().collect();
    tx.upsert_users(&users)?;
    Ok(())
}

fn totals(awards: &[Award]) -> SettlementSummary {
    SettlementSummary {
        settled_count: awards.len() as u32,
        total_points_awarded: awards.iter().map(|a| a.points).sum(),
    }
}
