// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.
//!
//! Every error carries a stable machine code and a fixed user-facing
//! message. Raw upstream and storage text is only ever logged.

use crate::db::StoreError;
use crate::services::timing::WindowStatus;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// How an upstream (football-data) call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamFailure {
    /// HTTP 429
    RateLimited,
    /// HTTP 5xx
    Server(u16),
    /// Any other non-success status
    Rejected(u16),
    /// Connection, TLS or timeout failure
    Network,
    /// Response body did not match the expected shape
    Decode,
}

impl std::fmt::Display for UpstreamFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpstreamFailure::RateLimited => write!(f, "rate limited (429)"),
            UpstreamFailure::Server(status) => write!(f, "server error ({})", status),
            UpstreamFailure::Rejected(status) => write!(f, "rejected ({})", status),
            UpstreamFailure::Network => write!(f, "network failure"),
            UpstreamFailure::Decode => write!(f, "malformed response"),
        }
    }
}

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    Validation(&'static str),

    #[error("Resource not found: {0}")]
    NotFound(&'static str),

    #[error("Forecast window is {0}")]
    TimingViolation(WindowStatus),

    #[error("Forecast is already settled")]
    ImmutableRecord,

    #[error("Forecast already exists")]
    AlreadyExists,

    #[error("Precondition failed: {0}")]
    PreconditionFailed(&'static str),

    #[error("Authentication required")]
    Unauthorized,

    #[error("Not allowed")]
    Forbidden,

    #[error("Upstream {failure}: {detail}")]
    Upstream {
        failure: UpstreamFailure,
        detail: String,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("{0} is temporarily unavailable (circuit open)")]
    Unavailable(&'static str),

    #[error("{operation} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        operation: &'static str,
        attempts: u32,
        #[source]
        source: Box<AppError>,
    },

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn upstream(failure: UpstreamFailure, detail: impl Into<String>) -> Self {
        AppError::Upstream {
            failure,
            detail: detail.into(),
        }
    }

    /// The innermost error, looking through retry wrappers.
    pub fn root(&self) -> &AppError {
        match self {
            AppError::RetriesExhausted { source, .. } => source.root(),
            other => other,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::NotFound(_) => "not_found",
            AppError::TimingViolation(_) => "timing_violation",
            AppError::ImmutableRecord => "immutable_record",
            AppError::AlreadyExists => "already_exists",
            AppError::PreconditionFailed(_) => "precondition_failed",
            AppError::Unauthorized => "unauthorized",
            AppError::Forbidden => "forbidden",
            AppError::Upstream {
                failure: UpstreamFailure::RateLimited,
                ..
            } => "rate_limited",
            AppError::Upstream { .. } => "upstream_error",
            AppError::Storage(_) => "storage_error",
            AppError::Unavailable(_) | AppError::RetriesExhausted { .. } => {
                "temporarily_unavailable"
            }
            AppError::Internal(_) => "internal_error",
        }
    }

    /// User-facing message. Only these static strings ever leave the server.
    pub fn public_message(&self) -> &'static str {
        match self {
            AppError::Validation(reason) => *reason,
            AppError::NotFound(what) => *what,
            AppError::TimingViolation(WindowStatus::Locked) => {
                "Forecasts for this match are locked (less than 2 hours to kickoff)."
            }
            AppError::TimingViolation(_) => "This match has already started or finished.",
            AppError::ImmutableRecord => "This forecast has been settled and can no longer change.",
            AppError::AlreadyExists => "A forecast for this match already exists.",
            AppError::PreconditionFailed(reason) => *reason,
            AppError::Unauthorized => "Authentication required.",
            AppError::Forbidden => "You are not allowed to perform this action.",
            AppError::Upstream {
                failure: UpstreamFailure::RateLimited,
                ..
            } => "The match data provider is busy. Please try again shortly.",
            AppError::Upstream { .. } => "The match data provider is not responding correctly.",
            AppError::Storage(_) | AppError::Internal(_) => {
                "Something went wrong on our side. Please try again."
            }
            AppError::Unavailable(_) | AppError::RetriesExhausted { .. } => {
                "The service is temporarily unavailable. Please try again later."
            }
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::TimingViolation(_) | AppError::ImmutableRecord | AppError::AlreadyExists => {
                StatusCode::CONFLICT
            }
            AppError::PreconditionFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::Upstream {
                failure: UpstreamFailure::RateLimited,
                ..
            } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            AppError::Storage(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Unavailable(_) | AppError::RetriesExhausted { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(_: validator::ValidationErrors) -> Self {
        AppError::Validation("Predicted scores must be whole numbers between 0 and 20.")
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: &'static str,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Internal(err) = &self {
            tracing::error!(error = %err, "Internal server error");
        }

        let body = ErrorResponse {
            error: self.code(),
            message: self.public_message(),
        };

        (self.status_code(), Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
