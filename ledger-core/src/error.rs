use thiserror::Error;

/// The wire-level error taxonomy from spec §7, shared by both services so
/// that the HTTP facades map it to a response body/status the same way.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Malformed input, missing required field.
    #[error("validation error: {0}")]
    Validation(String),
    /// Insufficient funds, limit exceeded, state-machine violation.
    #[error("business rejection: {0}")]
    BusinessRejection(String),
    /// Entity missing.
    #[error("not found: {0}")]
    NotFound(String),
    /// Principal lacks permission.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Circuit open or retries exhausted against the Account Service.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    /// Unexpected failure; message is sanitized before reaching the client.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience alias for `Result<T, CoreError>`.
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// The HTTP status code this error category maps to (spec §7 table).
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            CoreError::Validation(_) => 400,
            CoreError::BusinessRejection(_) => 400,
            CoreError::NotFound(_) => 404,
            CoreError::Forbidden(_) => 403,
            CoreError::UpstreamUnavailable(_) => 503,
            CoreError::Internal(_) => 500,
        }
    }

    /// The short machine-readable error tag used in the response body's
    /// `error` field.
    #[must_use]
    pub fn error_tag(&self) -> &'static str {
        match self {
            CoreError::Validation(_) => "VALIDATION",
            CoreError::BusinessRejection(_) => "BUSINESS_REJECTION",
            CoreError::NotFound(_) => "NOT_FOUND",
            CoreError::Forbidden(_) => "FORBIDDEN",
            CoreError::UpstreamUnavailable(_) => "UPSTREAM_UNAVAILABLE",
            CoreError::Internal(_) => "INTERNAL",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_spec_table() {
        assert_eq!(CoreError::Validation("x".into()).status_code(), 400);
        assert_eq!(CoreError::NotFound("x".into()).status_code(), 404);
        assert_eq!(CoreError::Forbidden("x".into()).status_code(), 403);
        assert_eq!(CoreError::UpstreamUnavailable("x".into()).status_code(), 503);
        assert_eq!(CoreError::Internal("x".into()).status_code(), 500);
    }
}
