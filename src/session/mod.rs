//! Authentication sessions: login, registration, refresh token rotation and revocation.
//!
//! A login opens a *family*: a chain of refresh tokens where each successful
//! refresh spends the current token and issues its successor. At most one
//! record per family is live at any time. Presenting a spent token again means
//! it was copied, so the whole family is revoked.
//!
//! Access tokens are minted by [`JwtConfig`] and verified statelessly.

mod error;
mod gate;

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::{
    Database, NewRefreshToken, NewUser, RefreshTokenRecord, UserProfile, UserRole, unix_now,
};
use crate::hash::{HashError, OneWayHasher, TokenFingerprinter};
use crate::jwt::{AccessClaims, AccessTokenResult, JwtConfig};

pub use error::SessionError;
pub use gate::authorize;

/// Default refresh token lifetime: 7 days.
pub const REFRESH_TOKEN_DURATION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Number of random bytes in a refresh token.
const REFRESH_TOKEN_BYTES: usize = 32;

/// Request metadata recorded with each refresh token.
#[derive(Debug, Clone, Default)]
pub struct ClientMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Result of a successful login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub access_token: AccessTokenResult,
    pub refresh_token: String,
    pub family: String,
    pub user: UserProfile,
}

/// Result of a successful refresh. The family never changes.
#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    pub access_token: AccessTokenResult,
    pub refresh_token: String,
    pub family: String,
}

/// A live session as shown to its owner.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub family: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: i64,
    pub expires_at: i64,
}

impl From<RefreshTokenRecord> for SessionInfo {
    fn from(record: RefreshTokenRecord) -> Self {
        Self {
            family: record.family,
            ip_address: record.ip_address,
            user_agent: record.user_agent,
            created_at: record.created_at,
            expires_at: record.expires_at,
        }
    }
}

/// Trim and lowercase an email address.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Generate a refresh token: 32 random bytes, base64url without padding.
fn generate_refresh_token() -> String {
    let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Owns every refresh token state transition. Cloning shares the backends.
#[derive(Clone)]
pub struct SessionManager {
    db: Database,
    jwt: Arc<JwtConfig>,
    hasher: Arc<dyn OneWayHasher>,
    fingerprinter: Arc<TokenFingerprinter>,
    refresh_ttl: Duration,
    dummy_hash: Arc<OnceLock<String>>,
}

impl SessionManager {
    pub fn new(
        db: Database,
        jwt: Arc<JwtConfig>,
        hasher: Arc<dyn OneWayHasher>,
        fingerprinter: Arc<TokenFingerprinter>,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            db,
            jwt,
            hasher,
            fingerprinter,
            refresh_ttl,
            dummy_hash: Arc::new(OnceLock::new()),
        }
    }

    pub fn jwt(&self) -> &JwtConfig {
        &self.jwt
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Run hasher work off the async runtime.
    async fn blocking<T, F>(&self, f: F) -> Result<T, SessionError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn OneWayHasher) -> Result<T, HashError> + Send + 'static,
    {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || f(hasher.as_ref()))
            .await
            .map_err(|e| SessionError::Internal(e.to_string()))?
            .map_err(SessionError::from)
    }

    /// Check a password against a digest, or against a throwaway digest when
    /// there is no user so both paths cost one verification.
    async fn verify_password(
        &self,
        password: &str,
        digest: Option<String>,
    ) -> Result<bool, SessionError> {
        let password = password.to_string();
        let dummy = self.dummy_hash.clone();
        self.blocking(move |hasher| match digest {
            Some(digest) => hasher.verify(&password, &digest),
            None => {
                let dummy = dummy.get_or_init(|| hasher.hash("not-a-password").unwrap_or_default());
                let _ = hasher.verify(&password, dummy);
                Ok(false)
            }
        })
        .await
    }

    /// Create a new account with the `user` role.
    pub async fn register(
        &self,
        email: &str,
        name: &str,
        password: &str,
    ) -> Result<UserProfile, SessionError> {
        self.create_user(email, name, password, UserRole::User).await
    }

    /// Create an account with an explicit role. Used by `--create-admin`.
    pub async fn create_user(
        &self,
        email: &str,
        name: &str,
        password: &str,
        role: UserRole,
    ) -> Result<UserProfile, SessionError> {
        let email = normalize_email(email);
        let plaintext = password.to_string();
        let password_hash = self.blocking(move |hasher| hasher.hash(&plaintext)).await?;
        let uuid = Uuid::new_v4().to_string();

        let user = self
            .db
            .users()
            .create(NewUser {
                uuid: &uuid,
                email: &email,
                name: name.trim(),
                password_hash: &password_hash,
                role,
            })
            .await?;

        info!(user = %user.uuid, role = user.role.as_str(), "User registered");
        Ok(UserProfile::from(&user))
    }

    /// Authenticate with email and password and open a new session family.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        client: &ClientMeta,
    ) -> Result<LoginOutcome, SessionError> {
        let email = normalize_email(email);
        let user = self.db.users().get_by_email(&email).await?;

        let digest = user.as_ref().map(|u| u.password_hash.clone());
        let matches = self.verify_password(password, digest).await?;

        let user = match user {
            Some(user) if matches => user,
            _ => {
                debug!("Login rejected");
                return Err(SessionError::InvalidCredentials);
            }
        };

        let access_token = self.jwt.generate_access_token(&user)?;
        let family = Uuid::new_v4().to_string();
        let refresh_token = generate_refresh_token();
        let lookup_hash = self.fingerprinter.fingerprint(&refresh_token)?;
        let plaintext = refresh_token.clone();
        let token_hash = self.blocking(move |hasher| hasher.hash(&plaintext)).await?;

        let now = unix_now();
        self.db
            .refresh_tokens()
            .create(
                NewRefreshToken {
                    user_id: user.id,
                    token_hash: &token_hash,
                    lookup_hash: &lookup_hash,
                    family: &family,
                    expires_at: now + self.refresh_ttl.as_secs() as i64,
                    ip_address: client.ip_address.as_deref(),
                    user_agent: client.user_agent.as_deref(),
                },
                now,
            )
            .await?;

        info!(user = %user.uuid, family = %family, "User logged in");

        Ok(LoginOutcome {
            access_token,
            refresh_token,
            family,
            user: UserProfile::from(&user),
        })
    }

    /// Find the active record of `family` that `plaintext` belongs to.
    ///
    /// The keyed lookup digest selects at most one candidate, so this costs at
    /// most one slow verification however long the family's history is.
    /// Errors with `InvalidOrExpiredToken` when the family has no active record.
    async fn find_matching(
        &self,
        plaintext: &str,
        family: &str,
        now: i64,
    ) -> Result<Option<RefreshTokenRecord>, SessionError> {
        let store = self.db.refresh_tokens();
        let lookup_hash = self.fingerprinter.fingerprint(plaintext)?;

        let Some(record) = store.find_active_by_lookup(family, &lookup_hash, now).await? else {
            if store.count_active_in_family(family, now).await? == 0 {
                return Err(SessionError::InvalidOrExpiredToken);
            }
            return Ok(None);
        };

        let plaintext = plaintext.to_string();
        let digest = record.token_hash.clone();
        let matches = self
            .blocking(move |hasher| hasher.verify(&plaintext, &digest))
            .await?;
        Ok(matches.then_some(record))
    }

    /// Spend the presented refresh token and issue its successor.
    pub async fn refresh(
        &self,
        refresh_token: Option<&str>,
        family: Option<&str>,
        client: &ClientMeta,
    ) -> Result<RefreshOutcome, SessionError> {
        let (Some(plaintext), Some(family)) = (
            refresh_token.filter(|t| !t.is_empty()),
            family.filter(|f| !f.is_empty()),
        ) else {
            return Err(SessionError::MissingCredentials);
        };

        let now = unix_now();
        let current = self
            .find_matching(plaintext, family, now)
            .await?
            .ok_or(SessionError::InvalidToken)?;

        if current.is_spent() {
            let revoked = self.db.refresh_tokens().revoke_family(family, now).await?;
            warn!(
                family = %family,
                user_id = current.user_id,
                revoked,
                "Refresh token reuse detected, family revoked"
            );
            return Err(SessionError::TokenReuseDetected);
        }

        let user = self
            .db
            .users()
            .get_by_id(current.user_id)
            .await?
            .ok_or(SessionError::UserNotFound)?;

        let refresh_token = generate_refresh_token();
        let lookup_hash = self.fingerprinter.fingerprint(&refresh_token)?;
        let new_plaintext = refresh_token.clone();
        let token_hash = self
            .blocking(move |hasher| hasher.hash(&new_plaintext))
            .await?;

        let rotated = self
            .db
            .refresh_tokens()
            .rotate(
                current.id,
                NewRefreshToken {
                    user_id: user.id,
                    token_hash: &token_hash,
                    lookup_hash: &lookup_hash,
                    family,
                    expires_at: now + self.refresh_ttl.as_secs() as i64,
                    ip_address: client.ip_address.as_deref(),
                    user_agent: client.user_agent.as_deref(),
                },
                now,
            )
            .await?;

        if rotated.is_none() {
            warn!(family = %family, "Concurrent refresh lost the rotation");
            return Err(SessionError::RotationConflict);
        }

        let access_token = self.jwt.generate_access_token(&user)?;
        debug!(user = %user.uuid, family = %family, "Refresh token rotated");

        Ok(RefreshOutcome {
            access_token,
            refresh_token,
            family: family.to_string(),
        })
    }

    /// Revoke the session the presented token belongs to. Never fails.
    pub async fn logout(&self, refresh_token: Option<&str>, family: Option<&str>) {
        let (Some(plaintext), Some(family)) = (
            refresh_token.filter(|t| !t.is_empty()),
            family.filter(|f| !f.is_empty()),
        ) else {
            debug!("Logout without session cookies");
            return;
        };

        let now = unix_now();
        match self.find_matching(plaintext, family, now).await {
            Ok(Some(_)) => match self.db.refresh_tokens().revoke_family(family, now).await {
                Ok(revoked) => info!(family = %family, revoked, "Session logged out"),
                Err(e) => warn!(family = %family, error = %e, "Failed to revoke session on logout"),
            },
            Ok(None) => debug!(family = %family, "Logout token does not match family"),
            Err(SessionError::InvalidOrExpiredToken) => {
                debug!(family = %family, "Logout for unknown or expired family")
            }
            Err(e) => warn!(family = %family, error = %e, "Logout lookup failed"),
        }
    }

    /// Revoke every session of a user. Returns the number of records revoked.
    pub async fn logout_all(&self, user_id: i64) -> Result<u64, SessionError> {
        let revoked = self
            .db
            .refresh_tokens()
            .revoke_all_for_user(user_id, unix_now())
            .await?;
        info!(user_id, revoked, "All sessions revoked");
        Ok(revoked)
    }

    /// Verify an access token's signature, expiry and type.
    pub fn verify_access_token(&self, token: &str) -> Result<AccessClaims, SessionError> {
        Ok(self.jwt.validate_access_token(token)?)
    }

    /// Live sessions of a user, newest first.
    pub async fn list_sessions(&self, user_id: i64) -> Result<Vec<SessionInfo>, SessionError> {
        let records = self
            .db
            .refresh_tokens()
            .list_sessions_by_user(user_id, unix_now())
            .await?;
        Ok(records.into_iter().map(SessionInfo::from).collect())
    }

    /// Revoke one of the user's own session families.
    /// Returns false when the family is unknown or belongs to someone else.
    pub async fn revoke_session(&self, user_id: i64, family: &str) -> Result<bool, SessionError> {
        let revoked = self
            .db
            .refresh_tokens()
            .revoke_family_for_user(user_id, family, unix_now())
            .await?;
        if revoked > 0 {
            info!(user_id, family = %family, "Session revoked");
        }
        Ok(revoked > 0)
    }
}
