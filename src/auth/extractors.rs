//! Axum extractors for authentication.

use std::convert::Infallible;
use std::marker::PhantomData;

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};

use super::ip::extract_client_ip;
use super::state::HasAuthBackend;
use crate::api::ApiError;
use crate::db::UserRole;
use crate::jwt::AccessClaims;
use crate::session::{ClientMeta, SessionError, authorize};

/// Longest user agent string recorded with a session.
const MAX_USER_AGENT_LEN: usize = 512;

/// Set of roles an endpoint admits.
pub trait RoleConstraint: Send + Sync + 'static {
    const ALLOWED: &'static [UserRole];
}

/// Any authenticated user.
pub struct AnyRole;

impl RoleConstraint for AnyRole {
    const ALLOWED: &'static [UserRole] = &[UserRole::User, UserRole::Admin];
}

/// Admins only.
pub struct AdminOnly;

impl RoleConstraint for AdminOnly {
    const ALLOWED: &'static [UserRole] = &[UserRole::Admin];
}

/// Extractor for endpoints that require a valid access token.
///
/// The token is read from `Authorization: Bearer <token>` and verified
/// statelessly, then the caller's role is checked against `R`.
pub struct Auth<R: RoleConstraint = AnyRole> {
    pub claims: AccessClaims,
    _role: PhantomData<R>,
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

impl<S, R> FromRequestParts<S> for Auth<R>
where
    S: HasAuthBackend + Send + Sync,
    R: RoleConstraint,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let claims = match bearer_token(parts) {
            Some(token) => Some(state.sessions().verify_access_token(token)?),
            None => None,
        };

        authorize(claims.as_ref(), R::ALLOWED)?;
        let claims = claims.ok_or(SessionError::Unauthenticated)?;

        Ok(Self {
            claims,
            _role: PhantomData,
        })
    }
}

/// Client address and user agent, recorded with refresh tokens. Never fails;
/// an undeterminable address is recorded as absent.
impl<S> FromRequestParts<S> for ClientMeta
where
    S: HasAuthBackend + Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user_agent = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(|ua| ua.chars().take(MAX_USER_AGENT_LEN).collect());

        Ok(ClientMeta {
            ip_address: extract_client_ip(parts, state.ip_extractor()).ok(),
            user_agent,
        })
    }
}
