//! Session error kinds.

use thiserror::Error;

use crate::db::StoreError;
use crate::hash::HashError;
use crate::jwt::JwtError;

/// Every way a session operation can fail.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Refresh token and family are required")]
    MissingCredentials,

    #[error("Invalid or expired refresh token")]
    InvalidOrExpiredToken,

    #[error("Invalid refresh token")]
    InvalidToken,

    #[error("Refresh token reuse detected, session revoked")]
    TokenReuseDetected,

    /// Another request rotated the same token first. The session stays alive.
    #[error("Refresh token was already rotated by a concurrent request")]
    RotationConflict,

    #[error("Access token expired")]
    TokenExpired,

    #[error("Invalid access token")]
    TokenMalformed,

    #[error("User not found")]
    UserNotFound,

    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Insufficient permissions")]
    Forbidden,

    #[error("Email is already registered")]
    DuplicateEmail,

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for SessionError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateEmail => SessionError::DuplicateEmail,
            // Books never flow through the session layer.
            StoreError::DuplicateIsbn => SessionError::Internal(e.to_string()),
            StoreError::Unavailable(e) => SessionError::StorageUnavailable(e.to_string()),
        }
    }
}

impl From<HashError> for SessionError {
    fn from(e: HashError) -> Self {
        SessionError::Internal(e.to_string())
    }
}

impl From<JwtError> for SessionError {
    fn from(e: JwtError) -> Self {
        match e {
            JwtError::Expired => SessionError::TokenExpired,
            JwtError::Malformed(_) => SessionError::TokenMalformed,
            JwtError::Encoding(_) | JwtError::TimeError => SessionError::Internal(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_map_to_kinds() {
        assert!(matches!(
            SessionError::from(StoreError::DuplicateEmail),
            SessionError::DuplicateEmail
        ));
        assert!(matches!(
            SessionError::from(StoreError::Unavailable(sqlx::Error::PoolTimedOut)),
            SessionError::StorageUnavailable(_)
        ));
    }

    #[test]
    fn test_jwt_errors_map_to_kinds() {
        assert!(matches!(
            SessionError::from(JwtError::Expired),
            SessionError::TokenExpired
        ));
        assert!(matches!(
            SessionError::from(JwtError::TimeError),
            SessionError::Internal(_)
        ));
    }
}
