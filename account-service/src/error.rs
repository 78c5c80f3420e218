use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use ledger_core::CoreError;
use serde::Serialize;

/// Service-level error: the shared [`CoreError`] taxonomy, plus the one
/// thing that's specific to this process — how it renders to HTTP.
#[derive(Debug, Clone)]
pub struct AppError {
    pub core: CoreError,
    pub path: Option<String>,
}

impl AppError {
    #[must_use]
    pub fn new(core: CoreError) -> Self {
        Self { core, path: None }
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

impl From<CoreError> for AppError {
    fn from(core: CoreError) -> Self {
        Self::new(core)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::new(CoreError::Internal(err.to_string()))
    }
}

/// The user-visible error body shape from spec §7:
/// `{timestamp, status, error, message, path, validationErrors?, transactionId?}`.
#[derive(Debug, Serialize)]
struct ErrorBody {
    timestamp: chrono::DateTime<Utc>,
    status: u16,
    error: &'static str,
    message: String,
    path: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.core.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let message = if matches!(self.core, CoreError::Internal(_)) {
            "an internal error occurred".to_string()
        } else {
            self.core.to_string()
        };
        let body = ErrorBody {
            timestamp: Utc::now(),
            status: status.as_u16(),
            error: self.core.error_tag(),
            message,
            path: self.path,
        };
        (status, Json(body)).into_response()
    }
}
