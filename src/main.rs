// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Scorecast API Server
//!
//! Serves match listings, accepts score forecasts and settles finished
//! matches into points.

use anyhow::Context;
use scorecast::{
    config::{Config, StorageBackend},
    db::{FirestoreStore, MemoryStore, Store},
    services::{FootballDataClient, MatchSource},
    time_utils::SystemClock,
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured JSON logging for GCP
    init_logging()?;

    // Load configuration from environment
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(port = config.port, "Starting Scorecast API");

    let store: Arc<dyn Store> = match config.storage_backend {
        StorageBackend::Firestore => Arc::new(
            FirestoreStore::new(&config.gcp_project_id)
                .await
                .context("Failed to connect to Firestore")?,
        ),
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory store; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let source: Arc<dyn MatchSource> = Arc::new(FootballDataClient::new(
        &config.football_api_url,
        config.football_api_key.clone().unwrap_or_default(),
        config.football_competition.clone(),
    ));
    tracing::info!(
        competition = %config.football_competition,
        rate_limit = config.upstream_rate_limit,
        "football-data client initialized"
    );

    // Build shared state
    let port = config.port;
    let state = Arc::new(AppState::new(config, store, source, Arc::new(SystemClock)));

    // Build router
    let app = scorecast::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() -> anyhow::Result<()> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("scorecast=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}
