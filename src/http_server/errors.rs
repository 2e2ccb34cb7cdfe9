//! # API Errors
//!
//! Every failure a handler can return, mapped to a status code and a
//! `{error, code}` JSON body. Store failures are logged here and answered
//! with a fixed message; their detail never reaches the client.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::gatekeeper::{GateError, Verdict};
use crate::observability::{log_event_with_fields, Event};
use crate::store::StoreError;

/// Result type for handlers
pub type ApiResult<T> = Result<T, ApiError>;

/// Message returned for every store failure
pub const DATABASE_ERROR: &str = "Database error";

#[derive(Debug, Clone, Error)]
pub enum ApiError {
    // ==================
    // Client Errors (4xx)
    // ==================
    /// Body is not JSON or does not have the expected shape
    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    #[error("Missing required parameter: {0}")]
    MissingParam(String),

    #[error("Invalid parameter: {0}")]
    InvalidParam(String),

    #[error("{0}")]
    InvalidId(String),

    /// The planner would answer with a full collection scan
    #[error("{0}")]
    ScanRejected(String),

    #[error("{0}")]
    NotFound(String),

    // ==================
    // Server Errors (5xx)
    // ==================
    #[error("Database error")]
    Store(#[from] StoreError),
}

impl ApiError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidBody(_)
            | ApiError::MissingParam(_)
            | ApiError::InvalidParam(_)
            | ApiError::InvalidId(_)
            | ApiError::ScanRejected(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable error code for the response body
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidBody(_) => "INVALID_BODY",
            ApiError::MissingParam(_) => "MISSING_PARAM",
            ApiError::InvalidParam(_) => "INVALID_PARAM",
            ApiError::InvalidId(_) => "INVALID_ID",
            ApiError::ScanRejected(_) => "COLLSCAN_REJECTED",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Store(_) => "DATABASE_ERROR",
        }
    }

    /// Turns a rejecting verdict into an error. Callers check `allowed`.
    pub fn rejected(verdict: Verdict) -> Self {
        ApiError::ScanRejected(verdict.reason.unwrap_or_else(|| "Query rejected".to_string()))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidBody(rejection.body_text())
    }
}

impl From<GateError> for ApiError {
    fn from(err: GateError) -> Self {
        match err {
            GateError::InvalidId(e) => ApiError::InvalidId(e.to_string()),
            GateError::Store(e) => ApiError::Store(e),
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Store(ref err) = self {
            let detail = err.to_string();
            log_event_with_fields(
                Event::OperationFailed,
                &[("code", err.code()), ("detail", detail.as_str())],
            );
        }

        let status = self.status_code();
        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: self.code(),
        });
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gatekeeper::InvalidIdError;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::MissingParam("collection".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::ScanRejected("no".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::NotFound("x".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::Store(StoreError::NotConnected).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_store_detail_hidden() {
        let err = ApiError::Store(StoreError::Internal("disk on fire".into()));
        assert_eq!(err.to_string(), DATABASE_ERROR);
    }

    #[test]
    fn test_gate_error_mapping() {
        let input: ApiError = GateError::InvalidId(InvalidIdError { raw: "x".into() }).into();
        assert!(matches!(input, ApiError::InvalidId(_)));

        let store: ApiError = GateError::Store(StoreError::NotConnected).into();
        assert!(matches!(store, ApiError::Store(StoreError::NotConnected)));
    }

    #[test]
    fn test_rejection_carries_reason() {
        let err = ApiError::rejected(Verdict::reject("use an index"));
        assert_eq!(err.to_string(), "use an index");
        assert_eq!(err.code(), "COLLSCAN_REJECTED");
    }
}
