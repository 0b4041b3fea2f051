//! HTTP error mapping.
//!
//! Every failure leaves a handler as `{ "error": message, "code": CODE }`.
//! Internal detail (SQL text, store messages) is logged, never returned.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use creator_cloud::ProviderError;
use creator_core::error::CoreError;
use creator_pipeline::StoreError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The cloud provider rejected or failed a request.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Malformed request detected before any state was touched.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

pub type AppResult<T> = Result<T, AppError>;

/// Status, machine-readable code, and the message shown to the caller.
struct Rejection {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl Rejection {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            "An internal error occurred",
        )
    }
}

impl AppError {
    fn rejection(&self) -> Rejection {
        match self {
            AppError::Core(CoreError::NotFound { entity, id }) => Rejection::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("{entity} with id {id} not found"),
            ),
            AppError::Core(CoreError::Validation(msg)) => {
                Rejection::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.as_str())
            }
            AppError::Core(CoreError::Conflict(msg)) => {
                Rejection::new(StatusCode::CONFLICT, "CONFLICT", msg.as_str())
            }
            AppError::Core(CoreError::Internal(msg)) => {
                tracing::error!(error = %msg, "Internal core error");
                Rejection::internal()
            }
            AppError::Database(err) => classify_sqlx_error(err),
            AppError::Store(err) => {
                tracing::error!(error = %err, "Store error");
                Rejection::internal()
            }
            AppError::Provider(err) => {
                tracing::error!(error = %err, "Provider error");
                let status = match err {
                    ProviderError::ActionTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                    _ => StatusCode::BAD_GATEWAY,
                };
                Rejection::new(status, "PROVIDER_ERROR", err.to_string())
            }
            AppError::BadRequest(msg) => {
                Rejection::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.as_str())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let Rejection {
            status,
            code,
            message,
        } = self.rejection();
        (status, axum::Json(json!({ "error": message, "code": code }))).into_response()
    }
}

/// `RowNotFound` is 404 and a unique violation (SQLSTATE 23505, a provider
/// id recorded twice) is 409. Anything else is an opaque 500.
fn classify_sqlx_error(err: &sqlx::Error) -> Rejection {
    match err {
        sqlx::Error::RowNotFound => {
            Rejection::new(StatusCode::NOT_FOUND, "NOT_FOUND", "Resource not found")
        }
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505") => {
            Rejection::new(
                StatusCode::CONFLICT,
                "CONFLICT",
                format!(
                    "Duplicate value violates unique constraint: {}",
                    db_err.constraint().unwrap_or("unknown")
                ),
            )
        }
        other => {
            tracing::error!(error = %other, "Database error");
            Rejection::internal()
        }
    }
}
