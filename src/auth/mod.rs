//! HTTP side of authentication: bearer token extraction with role checks and
//! session cookies.
//!
//! Access tokens travel in the `Authorization` header. The refresh token and
//! its family travel in `HttpOnly` cookies scoped to the auth endpoints.

mod cookie;
mod extractors;
mod ip;
mod state;

pub use cookie::{
    COOKIE_PATH, FAMILY_COOKIE_NAME, REFRESH_COOKIE_NAME, append_cleared_cookies,
    append_session_cookies, clear_cookie, get_cookie, session_cookie,
};
pub use extractors::{AdminOnly, AnyRole, Auth, RoleConstraint};
pub use ip::{HasHeadersAndExtensions, extract_client_ip};
pub use state::HasAuthBackend;
