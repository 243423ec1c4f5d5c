// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Forecast submission.
//!
//! One transaction per attempt:
//! 1. Load the match
//! 2. Check the forecast window
//! 3. Update the existing forecast, or create it with a create-only write
//!
//! Two callers racing to create the same (user, match) forecast are
//! serialized by the store: the loser's insert collides, and it retries
//! once as an update.

use crate::db::{self, Store, StoreError, StoreTx};
use crate::error::{AppError, Result};
use crate::models::forecast::MAX_PREDICTED_GOALS;
use crate::models::Forecast;
use crate::resilience::{report_for_user, CircuitBreaker, RetryPolicy};
use crate::services::timing;
use crate::time_utils::Clock;
use std::sync::Arc;

pub const INVALID_SCORE: &str = "Predicted scores must be whole numbers between 0 and 20.";

pub struct ForecastCoordinator {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    breaker: Arc<CircuitBreaker>,
}

/// Whether a missing forecast may be created on this attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    CreateOrUpdate,
    UpdateOnly,
}

impl ForecastCoordinator {
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

    /// Create or update the caller's forecast for a match.
    pub async fn submit(
        &self,
        user_id: &str,
        match_id: &str,
        predicted_home: u32,
        predicted_away: u32,
    ) -> Result<Forecast> {
        if predicted_home > MAX_PREDICTED_GOALS || predicted_away > MAX_PREDICTED_GOALS {
            return Err(AppError::Validation(INVALID_SCORE));
        }

        let result = self
            .retry
            .run("submit_forecast", move || {
                self.breaker.call(move || {
                    self.submit_once(user_id, match_id, predicted_home, predicted_away)
                })
            })
            .await;

        match &result {
            Ok(forecast) => tracing::info!(
                user_id,
                match_id,
                predicted_home = forecast.predicted_home,
                predicted_away = forecast.predicted_away,
                "Forecast saved"
            ),
            Err(err) => {
                report_for_user(err, "submit_forecast", user_id, match_id);
            }
        }
        result
    }

    async fn submit_once(
        &self,
        user_id: &str,
        match_id: &str,
        predicted_home: u32,
        predicted_away: u32,
    ) -> Result<Forecast> {
        let first = self
            .write(user_id, match_id, predicted_home, predicted_away, Mode::CreateOrUpdate)
            .await;
        match first {
            Err(AppError::AlreadyExists) => {
                tracing::debug!(user_id, match_id, "Lost create race, retrying as update");
                self.write(user_id, match_id, predicted_home, predicted_away, Mode::UpdateOnly)
                    .await
            }
            other => other,
        }
    }

    async fn write(
        &self,
        user_id: &str,
        match_id: &str,
        predicted_home: u32,
        predicted_away: u32,
        mode: Mode,
    ) -> Result<Forecast> {
        let mut tx = self.store.begin().await?;
        let staged = self
            .stage(&mut *tx, user_id, match_id, predicted_home, predicted_away, mode)
            .await;
        db::finish(tx, staged).await.map_err(|err| match err {
            AppError::Storage(StoreError::UniqueViolation { .. }) => AppError::AlreadyExists,
            other => other,
        })
    }

    async fn stage<'t>(
        &self,
        tx: &mut (dyn StoreTx + 't),
        user_id: &str,
        match_id: &str,
        predicted_home: u32,
        predicted_away: u32,
        mode: Mode,
    ) -> Result<Forecast> {
        let game = tx
            .get_match(match_id)
            .await?
            .ok_or(AppError::NotFound("Match not found."))?;

        let now = self.clock.now();
        let window = timing::evaluate(now, game.kickoff, game.status);
        if !(window.can_create && window.can_edit) {
            return Err(AppError::TimingViolation(window.status));
        }

        match tx.get_forecast(user_id, match_id).await? {
            Some(existing) if existing.settled => Err(AppError::ImmutableRecord),
            Some(mut existing) => {
                existing.predicted_home = predicted_home;
                existing.predicted_away = predicted_away;
                existing.updated_at = now;
                tx.update_forecast(&existing)?;
                Ok(existing)
            }
            None if mode == Mode::CreateOrUpdate => {
                let forecast =
                    Forecast::new(user_id, match_id, predicted_home, predicted_away, now);
                tx.insert_forecast(&forecast)?;
                Ok(forecast)
            }
            // The collision said it exists; if it vanished since, give up
            None => Err(AppError::AlreadyExists),
        }
    }

    /// The caller's forecasts, newest first.
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<Forecast>> {
        Ok(self.store.forecasts_for_user(user_id).await?)
    }

    pub async fn get(&self, user_id: &str, match_id: &str) -> Result<Option<Forecast>> {
        Ok(self.store.get_forecast(user_id, match_id).await?)
    }
}
