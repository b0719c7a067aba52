//! Error types for driveshed.

use axum::http::StatusCode;
use serde::Serialize;
use thiserror::Error;

use crate::auth::Permission;
use crate::storage::StorageError;

/// Common error type for driveshed.
#[derive(Error, Debug)]
pub enum DriveError {
    /// No file exists at the given path.
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// A file already occupies the given path.
    #[error("file already exists: {0}")]
    FileAlreadyExists(String),

    /// No user with the given id.
    #[error("user not found: {0}")]
    UserNotFound(String),

    /// Session is unknown or expired.
    #[error("session not found")]
    SessionNotFound,

    /// No share with the given id.
    #[error("share not found: {0}")]
    ShareNotFound(String),

    /// The effective permissions lack a required capability.
    #[error("missing {needed} permission on {path}")]
    Unauthorized {
        /// Path the capability was checked on.
        path: String,
        /// The capability that was missing.
        needed: Permission,
    },

    /// Malformed or unsatisfiable byte range.
    #[error("range not satisfiable: {0}")]
    RangeNotSatisfiable(String),

    /// Object store failure.
    #[error("storage error: {0}")]
    Storage(StorageError),

    /// Database error.
    ///
    /// Database errors from sqlx are converted into this variant.
    #[error("database error: {0}")]
    Database(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Validation error for caller input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Stable error kind exposed to API callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    FileNotFound,
    FileAlreadyExists,
    UserNotFound,
    SessionNotFound,
    ShareNotFound,
    Unauthorized,
    RangeNotSatisfiable,
    StorageFailure,
    BadRequest,
    InternalError,
}

impl DriveError {
    /// The caller-visible kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DriveError::FileNotFound(_) => ErrorKind::FileNotFound,
            DriveError::FileAlreadyExists(_) => ErrorKind::FileAlreadyExists,
            DriveError::UserNotFound(_) => ErrorKind::UserNotFound,
            DriveError::SessionNotFound => ErrorKind::SessionNotFound,
            DriveError::ShareNotFound(_) => ErrorKind::ShareNotFound,
            DriveError::Unauthorized { .. } => ErrorKind::Unauthorized,
            DriveError::RangeNotSatisfiable(_) => ErrorKind::RangeNotSatisfiable,
            DriveError::Storage(_) => ErrorKind::StorageFailure,
            DriveError::Validation(_) => ErrorKind::BadRequest,
            DriveError::Database(_) | DriveError::Io(_) | DriveError::Config(_) => {
                ErrorKind::InternalError
            }
        }
    }

    /// HTTP status used when this error reaches the web layer.
    pub fn status_code(&self) -> StatusCode {
        match self {
            DriveError::FileNotFound(_)
            | DriveError::UserNotFound(_)
            | DriveError::ShareNotFound(_)
            | DriveError::Storage(StorageError::NotFound(_)) => StatusCode::NOT_FOUND,
            DriveError::FileAlreadyExists(_) => StatusCode::CONFLICT,
            DriveError::SessionNotFound => StatusCode::UNAUTHORIZED,
            DriveError::Unauthorized { .. } => StatusCode::FORBIDDEN,
            DriveError::RangeNotSatisfiable(_) => StatusCode::RANGE_NOT_SATISFIABLE,
            DriveError::Validation(_) => StatusCode::BAD_REQUEST,
            DriveError::Storage(_)
            | DriveError::Database(_)
            | DriveError::Io(_)
            | DriveError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the error is an internal failure whose details stay server-side.
    pub fn is_internal(&self) -> bool {
        self.status_code().is_server_error()
    }
}

impl From<sqlx::Error> for DriveError {
    fn from(e: sqlx::Error) -> Self {
        DriveError::Database(e.to_string())
    }
}

impl From<StorageError> for DriveError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::RangeNotSatisfiable(msg) => DriveError::RangeNotSatisfiable(msg),
            other => DriveError::Storage(other),
        }
    }
}

/// Result type alias for driveshed operations.
pub type Result<T> = std::result::Result<T, DriveError>;
