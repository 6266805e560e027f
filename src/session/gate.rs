//! Role-based authorization check.

use super::SessionError;
use crate::db::UserRole;
use crate::jwt::AccessClaims;

/// Admit `claims` if present and carrying one of `allowed`.
pub fn authorize(claims: Option<&AccessClaims>, allowed: &[UserRole]) -> Result<(), SessionError> {
    let claims = claims.ok_or(SessionError::Unauthenticated)?;
    if allowed.contains(&claims.role) {
        Ok(())
    } else {
        Err(SessionError::Forbidden)
    }
}
