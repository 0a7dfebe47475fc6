//! Error classification and HTTP error responses
//!
//! This module provides:
//! - Error codes with categories and retryability
//! - A serializable [`ApiError`] carrying a unique error id
//! - Conversion from [`ReportError`] into an HTTP response

use crate::report::ReportError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// ERROR CODES
// =============================================================================

/// Error codes reported to HTTP clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// The record source could not supply customers or calls
    SourceUnavailable,
    /// The workbook could not be encoded
    SerializationFailure,
    /// Internal layout defect; the report engine tried to overwrite a cell
    /// or write outside the worksheet
    LayoutViolation,
    /// Unexpected internal failure
    InternalError,
}

impl ErrorCode {
    /// Check if this error type is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::SourceUnavailable | ErrorCode::SerializationFailure
        )
    }

    /// Get the error category for metrics
    pub fn category(&self) -> &'static str {
        match self {
            ErrorCode::SourceUnavailable => "source_unavailable",
            ErrorCode::SerializationFailure => "serialization_failure",
            ErrorCode::LayoutViolation => "layout_violation",
            ErrorCode::InternalError => "server_error",
        }
    }

    /// HTTP status used when this error ends a request
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::SourceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::SerializationFailure
            | ErrorCode::LayoutViolation
            | ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.category())
    }
}

impl From<&ReportError> for ErrorCode {
    fn from(error: &ReportError) -> Self {
        match error {
            ReportError::SourceUnavailable(_) => ErrorCode::SourceUnavailable,
            ReportError::Serialization(_) => ErrorCode::SerializationFailure,
            ReportError::Layout(_) => ErrorCode::LayoutViolation,
        }
    }
}

// =============================================================================
// API ERROR
// =============================================================================

/// Error body returned to HTTP clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub category: String,
    pub message: String,
    /// Unique error ID for correlating client reports with logs
    pub error_id: String,
    pub retryable: bool,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            category: code.category().to_string(),
            message: message.into(),
            error_id: Self::generate_error_id(),
            retryable: code.is_retryable(),
            timestamp: chrono::Utc::now(),
        }
    }

    /// Generate a unique error ID
    fn generate_error_id() -> String {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let count = COUNTER.fetch_add(1, Ordering::Relaxed);
        let timestamp = chrono::Utc::now().timestamp_millis();
        format!("err_{:x}_{:x}", timestamp, count)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

impl From<&ReportError> for ApiError {
    fn from(error: &ReportError) -> Self {
        let code = ErrorCode::from(error);
        // Layout defects are internal; keep their detail in the logs.
        let message = match code {
            ErrorCode::LayoutViolation => "report generation failed".to_string(),
            _ => error.to_string(),
        };
        ApiError::new(code, message)
    }
}

impl From<ReportError> for ApiError {
    fn from(error: ReportError) -> Self {
        ApiError::from(&error)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        ApiError::new(ErrorCode::InternalError, error.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.code.status_code();
        (status, Json(self)).into_response()
    }
}
