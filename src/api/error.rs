//! Shared error handling for API endpoints.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;

use crate::db::StoreError;
use crate::session::SessionError;

/// Extension trait for concise error mapping on Results.
pub trait ResultExt<T> {
    fn db_err(self, msg: &str) -> Result<T, ApiError>;
}

impl<T> ResultExt<T> for Result<T, StoreError> {
    fn db_err(self, msg: &str) -> Result<T, ApiError> {
        self.map_err(|e| match e {
            StoreError::DuplicateIsbn => ApiError::conflict("A book with this ISBN already exists"),
            StoreError::DuplicateEmail => ApiError::conflict("Email is already registered"),
            StoreError::Unavailable(e) => ApiError::unavailable(msg, e),
        })
    }
}

/// API error type with automatic response conversion.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    TooManyRequests(String),
    Internal(String),
    Unavailable(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn too_many_requests(msg: impl Into<String>) -> Self {
        Self::TooManyRequests(msg.into())
    }

    /// Log the detail, answer with a generic message.
    pub fn internal(context: &str, e: impl std::fmt::Display) -> Self {
        error!("{}: {}", context, e);
        Self::Internal("Internal server error".into())
    }

    /// Log the detail, answer with a generic message.
    pub fn unavailable(context: &str, e: impl std::fmt::Display) -> Self {
        error!("{}: {}", context, e);
        Self::Unavailable("Service temporarily unavailable".into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::InvalidCredentials
            | SessionError::MissingCredentials
            | SessionError::InvalidOrExpiredToken
            | SessionError::InvalidToken
            | SessionError::TokenReuseDetected
            | SessionError::TokenExpired
            | SessionError::TokenMalformed
            | SessionError::UserNotFound
            | SessionError::Unauthenticated => ApiError::Unauthorized(e.to_string()),
            SessionError::Forbidden => ApiError::Forbidden(e.to_string()),
            SessionError::DuplicateEmail | SessionError::RotationConflict => {
                ApiError::Conflict(e.to_string())
            }
            SessionError::StorageUnavailable(detail) => {
                ApiError::unavailable("Storage unavailable", detail)
            }
            SessionError::Internal(detail) => ApiError::internal("Session error", detail),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::BadRequest(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg)
            | ApiError::Conflict(msg)
            | ApiError::TooManyRequests(msg)
            | ApiError::Internal(msg)
            | ApiError::Unavailable(msg) => msg,
        };
        (
            status,
            Json(ErrorResponse {
                success: false,
                error: message,
            }),
        )
            .into_response()
    }
}

/// Validate a UUID string format.
pub fn validate_uuid(uuid: &str) -> Result<(), ApiError> {
    if uuid.is_empty() {
        return Err(ApiError::bad_request("UUID cannot be empty"));
    }
    if uuid.len() > 36 {
        return Err(ApiError::bad_request("UUID is too long"));
    }
    if uuid::Uuid::parse_str(uuid).is_err() {
        return Err(ApiError::bad_request("Invalid UUID format"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_error_statuses() {
        let cases = [
            (SessionError::InvalidCredentials, StatusCode::UNAUTHORIZED),
            (SessionError::TokenReuseDetected, StatusCode::UNAUTHORIZED),
            (SessionError::TokenExpired, StatusCode::UNAUTHORIZED),
            (SessionError::Forbidden, StatusCode::FORBIDDEN),
            (SessionError::DuplicateEmail, StatusCode::CONFLICT),
            (SessionError::RotationConflict, StatusCode::CONFLICT),
            (
                SessionError::StorageUnavailable("pool timed out".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                SessionError::Internal("boom".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(ApiError::from(error).status(), status);
        }
    }

    #[test]
    fn test_server_errors_hide_detail() {
        let ApiError::Unavailable(msg) =
            ApiError::from(SessionError::StorageUnavailable("secret path".into()))
        else {
            panic!("expected Unavailable");
        };
        assert!(!msg.contains("secret path"));
    }

    #[test]
    fn test_validate_uuid() {
        assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(validate_uuid("").is_err());
        assert!(validate_uuid("not-a-uuid").is_err());
    }
}
