//! API error responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use super::middleware::correlation;
use crate::error::ErrorKind;
use crate::DriveError;

/// API error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Error detail.
#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: ErrorKind,
    /// Human-readable message.
    pub message: String,
    /// Path the error is about, else the request path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

/// API error type.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: ErrorKind,
    message: String,
    path: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            path: None,
        }
    }

    /// Create a bad request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ErrorKind::BadRequest, message)
    }

    /// Create an internal server error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::InternalError,
            message,
        )
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> ErrorKind {
        self.code
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
                path: self.path.or_else(correlation::request_path),
                correlation_id: correlation::current(),
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

impl From<DriveError> for ApiError {
    fn from(err: DriveError) -> Self {
        let status = err.status_code();
        let code = err.kind();
        if err.is_internal() {
            tracing::error!(error = %err, "internal error");
            return ApiError::new(status, code, "an internal error occurred");
        }

        let path = match &err {
            DriveError::FileNotFound(p)
            | DriveError::FileAlreadyExists(p)
            | DriveError::Unauthorized { path: p, .. } => Some(p.clone()),
            _ => None,
        };
        let api = ApiError::new(status, code, err.to_string());
        match path {
            Some(p) => api.with_path(p),
            None => api,
        }
    }
}
