// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Match ingestion: pull listings through the cache, store them, and
//! settle whatever has finished.

use crate::db::Store;
use crate::error::Result;
use crate::resilience::RetryPolicy;
use crate::services::football_data::MatchQuery;
use crate::services::match_cache::MatchCache;
use crate::services::settlement::SettlementCoordinator;
use crate::time_utils::Clock;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub fetched: u32,
    pub stored: u32,
    /// Records rejected by validation
    pub skipped: u32,
    /// Finished matches where settlement awarded anything
    pub settled_matches: u32,
    pub points_awarded: u32,
}

pub struct MatchSyncService {
    cache: Arc<MatchCache>,
    store: Arc<dyn Store>,
    settlement: Arc<SettlementCoordinator>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl MatchSyncService {
    pub fn new(
        cache: Arc<MatchCache>,
        store: Arc<dyn Store>,
        settlement: Arc<SettlementCoordinator>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            cache,
            store,
            settlement,
            clock,
            retry,
        }
    }

    pub async fn sync(&self, query: &MatchQuery) -> Result<SyncReport> {
        let listing = self.cache.get(query, true).await?;
        let now = self.clock.now();
        let mut report = SyncReport {
            fetched: listing.data.len() as u32,
            ..SyncReport::default()
        };

        let mut records = Vec::with_capacity(listing.data.len());
        for fetched in listing.data.iter() {
            if let Err(reason) = fetched.validate() {
                tracing::warn!(
                    match_id = %fetched.id,
                    reason = %reason,
                    "Skipping invalid match record"
                );
                report.skipped += 1;
                continue;
            }

            let mut record = fetched.clone();
            if let Some(existing) = self.store.get_match(&record.id).await? {
                record.created_at = existing.created_at;
            }
            record.updated_at = now;
            records.push(record);
        }

        let records = &records;
        self.retry
            .run("upsert_matches", move || async move {
                Ok(self.store.upsert_matches(records).await?)
            })
            .await?;
        report.stored = records.len() as u32;

        for finished in records.iter().filter(|m| m.is_finished()) {
            // Failures are reported by the coordinator; keep going
            if let Ok(summary) = self.settlement.settle(&finished.id).await {
                if summary.settled_count > 0 {
                    report.settled_matches += 1;
                    report.points_awarded += summary.total_points_awarded;
                }
            }
        }

        tracing::info!(
            key = %query.cache_key(),
            fetched = report.fetched,
            stored = report.stored,
            skipped = report.skipped,
            settled_matches = report.settled_matches,
            "Match sync complete"
        );
        Ok(report)
    }
}
