use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use crate::core::types::ErrorResponse;

/// Crate-wide error taxonomy (§7) — kinds, not raw exception types. Each
/// variant maps to the HTTP-surface policy named in the spec; internal library
/// code not at an HTTP boundary keeps using `anyhow::Result` as elsewhere in
/// this codebase.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Missing/invalid date, unknown website on admin endpoints, schedule
    /// cadence below the minimum. Policy: reject with a 4xx response.
    #[error("bad input: {0}")]
    BadInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// A specific backing store failed on a write or read that was on the
    /// request path (not a background fanout step, which logs and continues
    /// instead of surfacing here).
    #[error("store error ({store}): {source}")]
    Store {
        store: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// Transient upstream I/O (adapter fetch, embedding/sentiment provider).
    #[error("upstream error: {0}")]
    Upstream(#[from] anyhow::Error),

    /// A genuine internal fault (invariant violation, serialization bug) that
    /// isn't a store failure or an upstream I/O problem. Policy: 500, never
    /// mislabeled as a gateway error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::BadInput(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Store { store, source } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("{} store error: {}", store, source),
            ),
            AppError::Upstream(e) => (StatusCode::BAD_GATEWAY, e.to_string()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        if status.is_server_error() {
            tracing::error!("{}", message);
        } else {
            tracing::warn!("{}", message);
        }

        (
            status,
            Json(ErrorResponse {
                status: "error",
                message,
            }),
        )
            .into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
