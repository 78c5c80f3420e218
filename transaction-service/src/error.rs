use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use ledger_core::CoreError;
use serde::Serialize;

/// Service-level error: the shared [`CoreError`] taxonomy, plus the bits
/// that are specific to rendering it as an HTTP response in this process
/// (spec §7's `{timestamp, status, error, message, path, transactionId?}`).
#[derive(Debug, Clone)]
pub struct AppError {
    pub core: CoreError,
    pub path: Option<String>,
    pub transaction_id: Option<String>,
    pub retry_after_secs: Option<u64>,
}

impl AppError {
    #[must_use]
    pub fn new(core: CoreError) -> Self {
        Self {
            core,
            path: None,
            transaction_id: None,
            retry_after_secs: None,
        }
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_transaction_id(mut self, id: impl Into<String>) -> Self {
        self.transaction_id = Some(id.into());
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

impl From<crate::orchestrator::OrchestratorError> for AppError {
    fn from(err: crate::orchestrator::OrchestratorError) -> Self {
        let mut app_err = Self::new(err.core);
        if let Some(id) = err.transaction_id {
            app_err = app_err.with_transaction_id(id.to_string());
        }
        app_err
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    timestamp: chrono::DateTime<Utc>,
    status: u16,
    error: &'static str,
    message: String,
    path: Option<String>,
    #[serde(rename = "transactionId", skip_serializing_if = "Option::is_none")]
    transaction_id: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Spec §7's table carves out one BUSINESS_REJECTION as 409 rather
        // than 400: a transaction that's already been reversed is a
        // conflict with existing state, not a malformed request.
        let status_code = if matches!(&self.core, CoreError::BusinessRejection(msg) if msg == "ALREADY_REVERSED") {
            409
        } else {
            self.core.status_code()
        };
        let status = StatusCode::from_u16(status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
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
            transaction_id: self.transaction_id,
        };
        let mut response = (status, Json(body)).into_response();
        // Per spec §7: UPSTREAM_UNAVAILABLE carries `Retry-After: 30` so a
        // well-behaved caller backs off instead of hammering a tripped
        // circuit breaker.
        if matches!(self.core, CoreError::UpstreamUnavailable(_)) {
            let retry_after = self.retry_after_secs.unwrap_or(30);
            response.headers_mut().insert(
                axum::http::header::RETRY_AFTER,
                axum::http::HeaderValue::from_str(&retry_after.to_string()).unwrap(),
            );
        }
        response
    }
}
