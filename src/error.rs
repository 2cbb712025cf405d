use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Errors produced by the core (grid/store/fetcher/coverage/credits).
/// Kept free of axum types so the core never depends on the HTTP layer;
/// `ApiError` is its projection onto the HTTP boundary.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid coordinates: {0}")]
    Domain(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("upstream error ({status}): {body}")]
    Upstream { status: u16, body: String },
    #[error("receipt verification failed (status {status})")]
    Auth { status: i64 },
    #[error("credit balance exhausted")]
    CreditExhausted,
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        CoreError::Storage(err.to_string())
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(err: reqwest::Error) -> Self {
        CoreError::Upstream {
            status: err.status().map(|s| s.as_u16()).unwrap_or(0),
            body: err.to_string(),
        }
    }
}

#[derive(Serialize)]
pub struct ApiErrorBody {
    pub error: String,
    pub code: &'static str,
}

pub struct ApiError {
    pub status: StatusCode,
    pub body: ApiErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ApiErrorBody {
                error: message.into(),
                code,
            },
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "SERVICE_UNAVAILABLE",
            message,
        )
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", message)
    }

    /// Mirrors an upstream status code verbatim; falls back to 502 if it's
    /// not a valid HTTP status (e.g. a transport-level failure with no
    /// response at all).
    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
        Self::new(status, "UPSTREAM_ERROR", message)
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Domain(msg) => ApiError::bad_request(msg),
            CoreError::Storage(msg) => {
                tracing::error!("storage error: {}", msg);
                ApiError::internal("Database error")
            }
            CoreError::Upstream { status, body } => {
                tracing::warn!("upstream error {}: {}", status, body);
                ApiError::with_status(status, body)
            }
            CoreError::Auth { status } => {
                ApiError::bad_request(format!("verification failed with status {status}"))
            }
            CoreError::CreditExhausted => ApiError::bad_request("insufficient credits"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
