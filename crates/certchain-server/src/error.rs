//! Error types for the certchain server.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::ledger::LedgerError;
use crate::lifecycle::DeletedCounts;
use crate::store::StoreError;

/// Application error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// A database write failed after an irreversible ledger submission.
    #[error("Persistence failed after ledger transaction {tx_hash}: {message}")]
    Persistence { message: String, tx_hash: String },

    #[error("Delete incomplete: {message}")]
    PartialDelete {
        message: String,
        counts: DeletedCounts,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) | AppError::Store(StoreError::Duplicate(_)) => {
                StatusCode::CONFLICT
            }
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Ledger(LedgerError::InvalidSigner(_)) => StatusCode::BAD_REQUEST,
            AppError::Ledger(LedgerError::Pending { .. }) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Ledger(_) => StatusCode::BAD_GATEWAY,
            AppError::Persistence { .. }
            | AppError::PartialDelete { .. }
            | AppError::Store(_)
            | AppError::Config(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-checkable error code.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "validation_error",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) | AppError::Store(StoreError::Duplicate(_)) => "conflict",
            AppError::PayloadTooLarge(_) => "payload_too_large",
            AppError::Ledger(LedgerError::InvalidSigner(_)) => "validation_error",
            AppError::Ledger(LedgerError::Pending { .. }) => "ledger_pending",
            AppError::Ledger(_) => "upstream_error",
            AppError::Persistence { .. } => "persistence_error",
            AppError::PartialDelete { .. } => "partial_delete",
            AppError::Store(_) | AppError::Config(_) | AppError::Internal(_) => "internal_error",
        }
    }

    /// Message safe to show to callers.
    fn public_message(&self) -> String {
        match self {
            AppError::Store(StoreError::Duplicate(what)) => format!("{} already exists", what),
            AppError::Store(_) | AppError::Config(_) | AppError::Internal(_) => {
                "Internal server error".to_string()
            }
            AppError::Persistence { tx_hash, .. } => format!(
                "Ledger transaction {} succeeded but the certificate could not be saved",
                tx_hash
            ),
            AppError::Ledger(e) => e.to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Store(e) => tracing::error!("Store error: {}", e),
            AppError::Internal(msg) => tracing::error!("Internal error: {}", msg),
            AppError::Config(msg) => tracing::error!("Configuration error: {}", msg),
            AppError::Ledger(e) => tracing::warn!(
                method = e.method().unwrap_or("-"),
                tx_hash = e.tx_hash().unwrap_or("-"),
                payload = e.payload().unwrap_or("-"),
                "Ledger call failed: {}",
                e
            ),
            AppError::Persistence { message, tx_hash } => {
                tracing::error!(%tx_hash, "Persistence failed after ledger success: {}", message)
            }
            _ => {}
        }

        let status = self.status();
        let mut body = json!({
            "success": false,
            "code": self.code(),
            "message": self.public_message(),
        });
        if let AppError::PartialDelete { counts, .. } = &self {
            body["deletedCounts"] = json!(counts);
        }

        (status, Json(body)).into_response()
    }
}
