//! Error types for the ingestion, storage, and alerting layers.
//!
//! Each subsystem gets its own small `thiserror` enum; [`ServiceError`]
//! composes them at the HTTP boundary so `web` can map failures onto status
//! codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Failures from the indexed (relational) store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("not found")]
    NotFound,

    #[error("constraint violated: {0}")]
    Constraint(String),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Failures from the blob (file) store.
#[derive(Debug, Error)]
pub enum BlobError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("not found")]
    NotFound,

    #[error("invalid relative path: {0}")]
    InvalidPath(String),
}

/// Failures surfaced by a single alert-sink dispatch. Logged and isolated
/// by the Alerter; never propagated to the ingestion caller.
#[derive(Debug, Error)]
pub enum AlertError {
    #[error("webhook request failed: {0}")]
    Webhook(#[from] reqwest::Error),

    #[error("smtp send failed: {0}")]
    Smtp(String),

    #[error("missing required config key: {0}")]
    MissingConfig(String),

    #[error("request timed out")]
    Timeout,
}

/// Failures from one app's sweep. Logged by the sweeper; never aborts the
/// surrounding loop over apps.
#[derive(Debug, Error)]
pub enum SweepError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Blob(#[from] BlobError),
}

/// Failures from `Ingestor::submit`.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for IngestError {
    fn from(e: StoreError) -> Self {
        IngestError::Internal(e.to_string())
    }
}

/// Top-level error exposed at the HTTP boundary.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("unauthorized")]
    Unauthorized,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServiceError::Ingest(IngestError::Validation(msg)) => {
                (StatusCode::BAD_REQUEST, msg.clone())
            }
            ServiceError::Ingest(IngestError::Internal(_)) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal error".to_string(),
            ),
            ServiceError::Store(StoreError::NotFound) => {
                (StatusCode::NOT_FOUND, "not found".to_string())
            }
            ServiceError::Store(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal error".to_string(),
            ),
            ServiceError::Unauthorized => {
                (StatusCode::UNAUTHORIZED, "unauthorized".to_string())
            }
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }

        (status, message).into_response()
    }
}
