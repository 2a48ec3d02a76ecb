//! Crate-wide error type.
//!
//! Cache operations and registry lookups return [`Error`]; handlers convert
//! it into an HTTP response via [`IntoResponse`].

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Requested fingerprint or user id is absent.
    #[error("{0} not found")]
    NotFound(String),

    /// Cache file missing, unreadable or unwritable.
    #[error("user cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Cache file is not a valid JSON mapping.
    #[error("user cache parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// A disk operation exceeded the configured deadline.
    #[error("user cache operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// A connection references a user that is not in the store.
    #[error("connection {fingerprint} references unknown user {user_id}")]
    DanglingUser {
        fingerprint: String,
        user_id: String,
    },
}

impl Error {
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Error::NotFound(what.to_string())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
            let body = Json(serde_json::json!({ "error": "internal server error" }));
            return (status, body).into_response();
        }
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
