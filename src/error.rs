//! Service-wide error type and its HTTP mapping
//!
//! Every fallible operation in the crate returns [`ServiceError`]. The
//! variants mirror what a client can actually act on: malformed input,
//! a taken code, a missing record, and so on. Storage failures are kept
//! separate so they surface as 500s instead of being mistaken for 404s.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Requested code is not at least two ASCII alphanumeric characters.
    #[error("requested code must be at least 2 alphanumeric characters")]
    InvalidFormat,

    /// Code collides with a live link or a reserved path.
    #[error("requested code is already taken")]
    CodeTaken,

    /// No link record exists under the given code.
    #[error("short link not found")]
    NotFound,

    /// Account name collides with an existing account.
    #[error("account already exists")]
    DuplicateUser,

    /// Every pre-generated code has been handed out. The service cannot
    /// mint further short codes; this is an operator problem, not a
    /// client one.
    #[error("short code pool exhausted")]
    PoolExhausted,

    /// No valid session token accompanied the request.
    #[error("unauthenticated")]
    Unauthorized,

    /// The session is valid but does not own the resource.
    #[error("not allowed to manage this resource")]
    Forbidden,

    /// Malformed or incomplete request body.
    #[error("{0}")]
    BadRequest(String),

    /// The code pool file on disk cannot be parsed.
    #[error("code pool file is corrupt: {0}")]
    Persistence(String),

    /// Underlying storage engine failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Failure inside a cryptographic dependency (hashing, TOTP).
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Stable machine-readable identifier included in error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::InvalidFormat => "invalid_format",
            ServiceError::CodeTaken => "code_taken",
            ServiceError::NotFound => "not_found",
            ServiceError::DuplicateUser => "duplicate_account",
            ServiceError::PoolExhausted => "pool_exhausted",
            ServiceError::Unauthorized => "unauthenticated",
            ServiceError::Forbidden => "forbidden",
            ServiceError::BadRequest(_) => "bad_request",
            ServiceError::Persistence(_) => "persistence",
            ServiceError::Storage(_) => "storage",
            ServiceError::Internal(_) => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ServiceError::InvalidFormat | ServiceError::CodeTaken | ServiceError::DuplicateUser => {
                StatusCode::CONFLICT
            }
            ServiceError::NotFound => StatusCode::NOT_FOUND,
            ServiceError::PoolExhausted => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Unauthorized => StatusCode::UNAUTHORIZED,
            ServiceError::Forbidden => StatusCode::FORBIDDEN,
            ServiceError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServiceError::Persistence(_) | ServiceError::Storage(_) | ServiceError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();

        // 5xx details stay in the logs; clients get a generic message.
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
            return (
                status,
                Json(json!({
                    "error": "internal server error",
                    "code": self.code()
                })),
            )
                .into_response();
        }

        (
            status,
            Json(json!({
                "error": self.to_string(),
                "code": self.code()
            })),
        )
            .into_response()
    }
}

impl From<std::io::Error> for ServiceError {
    fn from(err: std::io::Error) -> Self {
        ServiceError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::Storage(err.to_string())
    }
}

impl From<redb::Error> for ServiceError {
    fn from(err: redb::Error) -> Self {
        ServiceError::Storage(err.to_string())
    }
}

impl From<redb::DatabaseError> for ServiceError {
    fn from(err: redb::DatabaseError) -> Self {
        ServiceError::Storage(err.to_string())
    }
}

impl From<redb::TransactionError> for ServiceError {
    fn from(err: redb::TransactionError) -> Self {
        ServiceError::Storage(err.to_string())
    }
}

impl From<redb::TableError> for ServiceError {
    fn from(err: redb::TableError) -> Self {
        ServiceError::Storage(err.to_string())
    }
}

impl From<redb::StorageError> for ServiceError {
    fn from(err: redb::StorageError) -> Self {
        ServiceError::Storage(err.to_string())
    }
}

impl From<redb::CommitError> for ServiceError {
    fn from(err: redb::CommitError) -> Self {
        ServiceError::Storage(err.to_string())
    }
}
