//! Authentication API endpoints.
//!
//! - POST `/register` - Create an account
//! - POST `/login` - Exchange credentials for an access token and session cookies
//! - POST `/refresh` - Rotate the refresh token, returns a new access token
//! - POST `/logout` - Revoke the current session and clear cookies
//! - POST `/logout-all` - Revoke every session of the caller
//! - GET `/me` - Current user profile
//! - GET `/sessions` - List the caller's live sessions
//! - DELETE `/sessions/{family}` - Revoke one of the caller's sessions

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::{ApiError, ResultExt};
use crate::auth::{
    Auth, FAMILY_COOKIE_NAME, REFRESH_COOKIE_NAME, append_cleared_cookies,
    append_session_cookies, get_cookie,
};
use crate::cli::IpExtractor;
use crate::db::{Database, User, UserProfile};
use crate::impl_has_auth_backend;
use crate::rate_limit::{RateLimitConfig, rate_limit_auth};
use crate::session::{ClientMeta, SessionError, SessionInfo, SessionManager};

const MAX_EMAIL_LEN: usize = 254;
const MAX_NAME_LEN: usize = 100;
const MIN_PASSWORD_LEN: usize = 8;
/// bcrypt ignores input past 72 bytes.
const MAX_PASSWORD_BYTES: usize = 72;

#[derive(Clone)]
pub struct AuthState {
    pub db: Database,
    pub sessions: SessionManager,
    pub secure_cookies: bool,
    pub no_signup: bool,
    pub ip_extractor: Option<IpExtractor>,
    pub rate_limit_config: Arc<RateLimitConfig>,
}

impl_has_auth_backend!(AuthState);

pub fn router(state: AuthState) -> Router {
    let credential_routes = Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.rate_limit_config.clone(),
            rate_limit_auth,
        ));

    Router::new()
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .route("/logout-all", post(logout_all))
        .route("/me", get(me))
        .route("/sessions", get(list_sessions))
        .route("/sessions/{family}", delete(revoke_session))
        .with_state(state)
        .merge(credential_routes)
}

#[derive(Deserialize)]
struct RegisterRequest {
    email: String,
    name: String,
    password: String,
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Serialize)]
struct UserResponse {
    success: bool,
    data: UserProfile,
}

#[derive(Serialize)]
struct LoginResponse {
    success: bool,
    token: String,
    data: UserProfile,
}

#[derive(Serialize)]
struct TokenResponse {
    success: bool,
    token: String,
}

#[derive(Serialize)]
struct SuccessResponse {
    success: bool,
}

#[derive(Serialize)]
struct RevokedCountResponse {
    success: bool,
    revoked: u64,
}

#[derive(Serialize)]
struct RevokedResponse {
    success: bool,
    revoked: bool,
}

#[derive(Serialize)]
struct SessionsResponse {
    success: bool,
    data: Vec<SessionInfo>,
}

fn validate_email(email: &str) -> Result<(), ApiError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(ApiError::bad_request("Email cannot be empty"));
    }
    if email.len() > MAX_EMAIL_LEN {
        return Err(ApiError::bad_request("Email is too long"));
    }
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(ApiError::bad_request("Invalid email address")),
    }
}

fn validate_registration(payload: &RegisterRequest) -> Result<(), ApiError> {
    validate_email(&payload.email)?;

    let name = payload.name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("Name cannot be empty"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(ApiError::bad_request(format!(
            "Name cannot be longer than {} characters",
            MAX_NAME_LEN
        )));
    }

    if payload.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    if payload.password.len() > MAX_PASSWORD_BYTES {
        return Err(ApiError::bad_request("Password is too long"));
    }
    Ok(())
}

/// Resolve the caller's database record from their access token.
async fn current_user(state: &AuthState, auth: &Auth) -> Result<User, ApiError> {
    state
        .db
        .users()
        .get_by_uuid(&auth.claims.sub)
        .await
        .db_err("Failed to get user")?
        .ok_or_else(|| SessionError::UserNotFound.into())
}

async fn register(
    State(state): State<AuthState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if state.no_signup {
        return Err(ApiError::forbidden("Signups are disabled"));
    }

    validate_registration(&payload)?;

    let user = state
        .sessions
        .register(&payload.email, &payload.name, &payload.password)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(UserResponse {
            success: true,
            data: user,
        }),
    ))
}

async fn login(
    State(state): State<AuthState>,
    client: ClientMeta,
    Json(payload): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    if payload.email.trim().is_empty() || payload.password.is_empty() {
        return Err(ApiError::bad_request("Email and password are required"));
    }

    let outcome = state
        .sessions
        .login(&payload.email, &payload.password, &client)
        .await?;

    let mut response = Json(LoginResponse {
        success: true,
        token: outcome.access_token.token,
        data: outcome.user,
    })
    .into_response();

    append_session_cookies(
        response.headers_mut(),
        &outcome.refresh_token,
        &outcome.family,
        state.sessions.refresh_ttl().as_secs(),
        state.secure_cookies,
    );

    Ok(response)
}

/// Error response for a failed refresh.
///
/// A 401 means the presented session is dead, so its cookies are cleared.
/// A lost concurrent rotation (409) leaves them alone: the winning response
/// carries the live token.
fn refresh_failure(error: SessionError, secure_cookies: bool) -> Response {
    let error = ApiError::from(error);
    let clear = error.status() == StatusCode::UNAUTHORIZED;
    let mut response = error.into_response();
    if clear {
        append_cleared_cookies(response.headers_mut(), secure_cookies);
    }
    response
}

/// Rotate the refresh token.
async fn refresh(
    State(state): State<AuthState>,
    client: ClientMeta,
    headers: HeaderMap,
) -> Response {
    let refresh_token = get_cookie(&headers, REFRESH_COOKIE_NAME);
    let family = get_cookie(&headers, FAMILY_COOKIE_NAME);

    match state.sessions.refresh(refresh_token, family, &client).await {
        Ok(outcome) => {
            let mut response = Json(TokenResponse {
                success: true,
                token: outcome.access_token.token,
            })
            .into_response();
            append_session_cookies(
                response.headers_mut(),
                &outcome.refresh_token,
                &outcome.family,
                state.sessions.refresh_ttl().as_secs(),
                state.secure_cookies,
            );
            response
        }
        Err(e) => refresh_failure(e, state.secure_cookies),
    }
}

/// Always succeeds and clears the session cookies.
async fn logout(State(state): State<AuthState>, headers: HeaderMap) -> Response {
    state
        .sessions
        .logout(
            get_cookie(&headers, REFRESH_COOKIE_NAME),
            get_cookie(&headers, FAMILY_COOKIE_NAME),
        )
        .await;

    let mut response = Json(SuccessResponse { success: true }).into_response();
    append_cleared_cookies(response.headers_mut(), state.secure_cookies);
    response
}

async fn logout_all(State(state): State<AuthState>, auth: Auth) -> Result<Response, ApiError> {
    let user = current_user(&state, &auth).await?;
    let revoked = state.sessions.logout_all(user.id).await?;

    let mut response = Json(RevokedCountResponse {
        success: true,
        revoked,
    })
    .into_response();
    append_cleared_cookies(response.headers_mut(), state.secure_cookies);
    Ok(response)
}

async fn me(State(state): State<AuthState>, auth: Auth) -> Result<impl IntoResponse, ApiError> {
    let user = current_user(&state, &auth).await?;
    Ok(Json(UserResponse {
        success: true,
        data: UserProfile::from(&user),
    }))
}

async fn list_sessions(
    State(state): State<AuthState>,
    auth: Auth,
) -> Result<impl IntoResponse, ApiError> {
    let user = current_user(&state, &auth).await?;
    let sessions = state.sessions.list_sessions(user.id).await?;
    Ok(Json(SessionsResponse {
        success: true,
        data: sessions,
    }))
}

async fn revoke_session(
    State(state): State<AuthState>,
    auth: Auth,
    Path(family): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user = current_user(&state, &auth).await?;
    let revoked = state.sessions.revoke_session(user.id, &family).await?;
    Ok(Json(RevokedResponse {
        success: true,
        revoked,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::SET_COOKIE;

    fn request(email: &str, name: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            name: name.to_string(),
            password: password.to_string(),
        }
    }

    #[test]
    fn test_validate_registration() {
        assert!(validate_registration(&request("a@example.com", "Alice", "Secret1!")).is_ok());
        assert!(validate_registration(&request(" A@Example.com ", "Alice", "Secret1!")).is_ok());

        assert!(validate_registration(&request("", "Alice", "Secret1!")).is_err());
        assert!(validate_registration(&request("no-at-sign", "Alice", "Secret1!")).is_err());
        assert!(validate_registration(&request("a@localhost", "Alice", "Secret1!")).is_err());
        assert!(validate_registration(&request("a@example.com", "  ", "Secret1!")).is_err());
        assert!(validate_registration(&request("a@example.com", "Alice", "short")).is_err());
        assert!(
            validate_registration(&request("a@example.com", "Alice", &"x".repeat(73))).is_err()
        );
    }

    #[test]
    fn test_lost_rotation_keeps_cookies() {
        let response = refresh_failure(SessionError::RotationConflict, false);
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert!(response.headers().get(SET_COOKIE).is_none());
    }

    #[test]
    fn test_dead_session_clears_cookies() {
        for error in [
            SessionError::TokenReuseDetected,
            SessionError::InvalidOrExpiredToken,
            SessionError::MissingCredentials,
        ] {
            let response = refresh_failure(error, true);
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            let cleared: Vec<_> = response.headers().get_all(SET_COOKIE).iter().collect();
            assert_eq!(cleared.len(), 2);
            for cookie in cleared {
                let cookie = cookie.to_str().unwrap();
                assert!(cookie.contains("Max-Age=0"));
                assert!(cookie.contains("Secure"));
            }
        }
    }
}
