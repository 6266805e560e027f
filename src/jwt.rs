//! JWT access token generation and validation.
//!
//! Access tokens are short-lived and stateless: they are verified by signature
//! and expiry only and cannot be revoked before they expire. Session state
//! lives in the refresh token records instead.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::{User, UserRole};

/// Token type marker carried in the `typ` claim. Decoding rejects any other value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
}

/// JWT claims for access tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject (user UUID)
    pub sub: String,
    /// Display name
    pub name: String,
    pub email: String,
    pub role: UserRole,
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Default access token lifetime: 15 minutes.
pub const ACCESS_TOKEN_DURATION_SECS: u64 = 15 * 60;

/// Result of generating an access token.
#[derive(Debug, Clone)]
pub struct AccessTokenResult {
    pub token: String,
    /// Expiration timestamp (Unix seconds)
    pub expires_at: u64,
    /// Token duration in seconds
    pub duration: u64,
}

/// Signing keys plus the access token lifetime. Read-only after startup.
#[derive(Clone)]
pub struct JwtConfig {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl: Duration,
}

impl JwtConfig {
    /// Create a new JWT configuration with the given secret and the default lifetime.
    pub fn new(secret: &[u8]) -> Self {
        Self::with_access_ttl(secret, Duration::from_secs(ACCESS_TOKEN_DURATION_SECS))
    }

    pub fn with_access_ttl(secret: &[u8], access_ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            access_ttl,
        }
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    /// Sign an access token carrying the user's public claims.
    pub fn generate_access_token(&self, user: &User) -> Result<AccessTokenResult, JwtError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| JwtError::TimeError)?
            .as_secs();

        let duration = self.access_ttl.as_secs();
        let exp = now + duration;

        let claims = AccessClaims {
            sub: user.uuid.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
            token_type: TokenType::Access,
            iat: now,
            exp,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(JwtError::Encoding)?;

        Ok(AccessTokenResult {
            token,
            expires_at: exp,
            duration,
        })
    }

    /// Validate signature and expiry and decode the claims.
    pub fn validate_access_token(&self, token: &str) -> Result<AccessClaims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let token_data =
            jsonwebtoken::decode::<AccessClaims>(token, &self.decoding_key, &validation).map_err(
                |e| match e.kind() {
                    ErrorKind::ExpiredSignature => JwtError::Expired,
                    _ => JwtError::Malformed(e),
                },
            )?;

        Ok(token_data.claims)
    }
}

/// Errors that can occur during JWT operations.
#[derive(Debug, Error)]
pub enum JwtError {
    #[error("failed to encode token: {0}")]
    Encoding(jsonwebtoken::errors::Error),

    #[error("token has expired")]
    Expired,

    #[error("malformed token: {0}")]
    Malformed(jsonwebtoken::errors::Error),

    #[error("system time error")]
    TimeError,
}
