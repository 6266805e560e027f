//! Session cookie parsing and construction.

use axum::http::{HeaderMap, HeaderValue, header};

/// Cookie name for the refresh token plaintext.
pub const REFRESH_COOKIE_NAME: &str = "refreshToken";

/// Cookie name for the session family identifier.
pub const FAMILY_COOKIE_NAME: &str = "tokenFamily";

/// Session cookies are only sent to the auth endpoints.
pub const COOKIE_PATH: &str = "/api/auth";

/// Extract a cookie value from the Cookie header.
pub fn get_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    for part in cookie_header.split(';') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            if key.trim() == name {
                return Some(value.trim());
            }
        }
    }
    None
}

/// Build a `Set-Cookie` value for a session cookie.
pub fn session_cookie(name: &str, value: &str, max_age_secs: u64, secure: bool) -> String {
    let secure = if secure { "; Secure" } else { "" };
    format!(
        "{}={}; HttpOnly; SameSite=Strict; Path={}; Max-Age={}{}",
        name, value, COOKIE_PATH, max_age_secs, secure
    )
}

/// Build a `Set-Cookie` value that removes a session cookie.
pub fn clear_cookie(name: &str, secure: bool) -> String {
    session_cookie(name, "", 0, secure)
}

/// Append both session cookies to a header map.
pub fn append_session_cookies(
    headers: &mut HeaderMap,
    refresh_token: &str,
    family: &str,
    max_age_secs: u64,
    secure: bool,
) {
    for cookie in [
        session_cookie(REFRESH_COOKIE_NAME, refresh_token, max_age_secs, secure),
        session_cookie(FAMILY_COOKIE_NAME, family, max_age_secs, secure),
    ] {
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            headers.append(header::SET_COOKIE, value);
        }
    }
}

/// Append cookies clearing both session cookies to a header map.
pub fn append_cleared_cookies(headers: &mut HeaderMap, secure: bool) {
    for name in [REFRESH_COOKIE_NAME, FAMILY_COOKIE_NAME] {
        if let Ok(value) = HeaderValue::from_str(&clear_cookie(name, secure)) {
            headers.append(header::SET_COOKIE, value);
        }
    }
}
