// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Maps every [`AppError`] onto a small taxonomy that drives logging,
//! alerting and retry decisions.

use crate::db::StoreError;
use crate::error::{AppError, UpstreamFailure};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Storage,
    Auth,
    Validation,
    RateLimit,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub kind: ErrorKind,
    pub severity: Severity,
    pub should_log: bool,
    pub should_alert: bool,
    pub retryable: bool,
}

impl Classification {
    /// Default handling for each kind.
    pub fn for_kind(kind: ErrorKind) -> Self {
        let (severity, should_log, should_alert, retryable) = match kind {
            ErrorKind::Validation => (Severity::Low, false, false, false),
            ErrorKind::Auth | ErrorKind::Network | ErrorKind::RateLimit => {
                (Severity::Medium, true, false, true)
            }
            ErrorKind::Storage => (Severity::High, true, true, true),
            ErrorKind::Unknown => (Severity::Critical, true, true, false),
        };
        Self {
            kind,
            severity,
            should_log,
            should_alert,
            retryable,
        }
    }

    fn terminal(self) -> Self {
        Self {
            retryable: false,
            ..self
        }
    }
}

fn classify_store(err: &StoreError) -> Classification {
    match err {
        // Collisions are a control-flow branch, not a fault
        StoreError::UniqueViolation { .. } => Classification::for_kind(ErrorKind::Validation),
        StoreError::Conflict | StoreError::Unavailable(_) | StoreError::Backend(_) => {
            Classification::for_kind(ErrorKind::Storage)
        }
        StoreError::WriteLimit { .. } | StoreError::Offline => {
            Classification::for_kind(ErrorKind::Storage).terminal()
        }
        StoreError::Serialization(_) => Classification::for_kind(ErrorKind::Unknown),
    }
}

pub fn classify(err: &AppError) -> Classification {
    match err {
        AppError::Validation(_)
        | AppError::NotFound(_)
        | AppError::TimingViolation(_)
        | AppError::ImmutableRecord
        | AppError::AlreadyExists
        | AppError::PreconditionFailed(_) => Classification::for_kind(ErrorKind::Validation),
        AppError::Unauthorized | AppError::Forbidden => Classification::for_kind(ErrorKind::Auth),
        AppError::Upstream { failure, .. } => match failure {
            UpstreamFailure::RateLimited => Classification::for_kind(ErrorKind::RateLimit),
            UpstreamFailure::Server(_) | UpstreamFailure::Network => {
                Classification::for_kind(ErrorKind::Network)
            }
            // A 4xx will not change on retry
            UpstreamFailure::Rejected(_) => Classification::for_kind(ErrorKind::Network).terminal(),
            UpstreamFailure::Decode => Classification::for_kind(ErrorKind::Unknown),
        },
        AppError::Storage(store) => classify_store(store),
        // Open circuit: failing fast is the point
        AppError::Unavailable(_) => Classification::for_kind(ErrorKind::Network).terminal(),
        AppError::RetriesExhausted { source, .. } => classify(source).terminal(),
        AppError::Internal(_) => Classification::for_kind(ErrorKind::Unknown),
    }
}

/// Classify and log an error with its context. The full error text is
/// logged here and never sent to the client.
pub fn report(err: &AppError, operation: &'static str, entity_id: &str) -> Classification {
    emit(err, operation, None, entity_id)
}

/// [`report`] for work done on behalf of a user.
pub fn report_for_user(
    err: &AppError,
    operation: &'static str,
    user_id: &str,
    entity_id: &str,
) -> Classification {
    emit(err, operation, Some(user_id), entity_id)
}

// `user_id` is left off the event when absent
fn emit(
    err: &AppError,
    operation: &'static str,
    user_id: Option<&str>,
    entity_id: &str,
) -> Classification {
    let class = classify(err);
    if !class.should_log {
        tracing::debug!(
            operation,
            user_id,
            entity_id,
            kind = ?class.kind,
            error = %err,
            "Operation rejected"
        );
        return class;
    }

    match class.severity {
        Severity::Low | Severity::Medium => tracing::warn!(
            operation,
            user_id,
            entity_id,
            kind = ?class.kind,
            severity = ?class.severity,
            error = %err,
            "Operation failed"
        ),
        Severity::High | Severity::Critical => tracing::error!(
            operation,
            user_id,
            entity_id,
            kind = ?class.kind,
            severity = ?class.severity,
            alert = class.should_alert,
            error = %err,
            "Operation failed"
        ),
    }
    class
}
