// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.

use crate::resilience::{CircuitBreakerConfig, RetryPolicy};
use crate::services::MatchCacheConfig;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_FOOTBALL_API_URL: &str = "https://api.football-data.org/v4";

/// Where documents are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Firestore,
    /// In-process store for local development; nothing survives a restart
    Memory,
}

impl FromStr for StorageBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "firestore" => Ok(StorageBackend::Firestore),
            "memory" => Ok(StorageBackend::Memory),
            _ => Err(()),
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Frontend URL (CORS origin)
    pub frontend_url: String,
    /// GCP project ID
    pub gcp_project_id: String,
    /// Server port
    pub port: u16,
    pub storage_backend: StorageBackend,
    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,

    // --- Upstream match data ---
    pub football_api_url: String,
    /// Required with the Firestore backend
    pub football_api_key: Option<String>,
    /// Competition code, e.g. "PL"
    pub football_competition: String,

    /// Users allowed on /admin routes
    pub admin_user_ids: Vec<String>,

    pub cache_ttl: Duration,
    pub cache_max_entries: usize,
    pub upstream_rate_limit: usize,
    pub upstream_rate_window: Duration,
    pub breaker_failure_threshold: u32,
    pub breaker_reset: Duration,
}

/// Parse a numeric variable into its field type. Values outside the
/// type's range are rejected, not truncated.
fn parse<T: FromStr>(
    var: &impl Fn(&'static str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    var(name).map_or(Ok(default), |raw| {
        raw.parse().map_err(|_| ConfigError::Invalid(name, raw))
    })
}

impl Config {
    /// Load configuration from environment variables (and `.env` if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build a configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let var = |name: &'static str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let storage_backend = match var("STORAGE_BACKEND") {
            None => StorageBackend::Firestore,
            Some(raw) => raw
                .parse()
                .map_err(|_| ConfigError::Invalid("STORAGE_BACKEND", raw))?,
        };

        let football_api_key = var("FOOTBALL_API_KEY");
        if storage_backend == StorageBackend::Firestore && football_api_key.is_none() {
            return Err(ConfigError::Missing("FOOTBALL_API_KEY"));
        }

        let port: u16 = parse(&var, "PORT", 8080)?;

        Ok(Self {
            frontend_url: var("FRONTEND_URL").unwrap_or_else(|| "http://localhost:5173".to_string()),
            gcp_project_id: var("GCP_PROJECT_ID").unwrap_or_else(|| "local-dev".to_string()),
            port,
            storage_backend,
            jwt_signing_key: var("JWT_SIGNING_KEY")
                .ok_or(ConfigError::Missing("JWT_SIGNING_KEY"))?
                .into_bytes(),
            football_api_url: var("FOOTBALL_API_URL")
                .unwrap_or_else(|| DEFAULT_FOOTBALL_API_URL.to_string()),
            football_api_key,
            football_competition: var("FOOTBALL_COMPETITION").unwrap_or_else(|| "PL".to_string()),
            admin_user_ids: var("ADMIN_USER_IDS")
                .map(|ids| {
                    ids.split(',')
                        .map(str::trim)
                        .filter(|id| !id.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            cache_ttl: Duration::from_secs(parse(&var, "CACHE_TTL_SECS", 300)?),
            cache_max_entries: parse(&var, "CACHE_MAX_ENTRIES", 1000)?,
            upstream_rate_limit: parse(&var, "UPSTREAM_RATE_LIMIT", 10)?,
            upstream_rate_window: Duration::from_secs(parse(
                &var,
                "UPSTREAM_RATE_WINDOW_SECS",
                60,
            )?),
            breaker_failure_threshold: parse(&var, "BREAKER_FAILURE_THRESHOLD", 5)?,
            breaker_reset: Duration::from_secs(parse(&var, "BREAKER_RESET_SECS", 30)?),
        })
    }

    /// Configuration for tests: memory store, default limits.
    pub fn test_default() -> Self {
        Self {
            frontend_url: "http://localhost:5173".to_string(),
            gcp_project_id: "test-project".to_string(),
            port: 8080,
            storage_backend: StorageBackend::Memory,
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            football_api_url: "http://localhost:9".to_string(),
            football_api_key: None,
            football_competition: "PL".to_string(),
            admin_user_ids: vec!["admin".to_string()],
            cache_ttl: Duration::from_secs(300),
            cache_max_entries: 1000,
            upstream_rate_limit: 10,
            upstream_rate_window: Duration::from_secs(60),
            breaker_failure_threshold: 5,
            breaker_reset: Duration::from_secs(30),
        }
    }

    pub fn is_admin(&self, user_id: &str) -> bool {
        self.admin_user_ids.iter().any(|id| id == user_id)
    }

    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.breaker_failure_threshold.max(1),
            reset_timeout: self.breaker_reset,
        }
    }

    pub fn match_cache_config(&self) -> MatchCacheConfig {
        MatchCacheConfig {
            ttl: self.cache_ttl,
            max_entries: self.cache_max_entries,
            rate_limit: self.upstream_rate_limit,
            rate_window: self.upstream_rate_window,
            breaker: self.breaker_config(),
            retry: RetryPolicy::upstream(),
        }
    }
}

/// Configuration errors
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1:?}")]
    Invalid(&'static str, String),
}
