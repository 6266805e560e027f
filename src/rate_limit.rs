//! Rate limiting for credential endpoints.
//!
//! Uses a token bucket algorithm with per-IP tracking to slow down password
//! guessing and signup spam.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::{num::NonZeroU32, sync::Arc};
use tracing::{debug, warn};

use crate::api::ApiError;
use crate::auth::extract_client_ip;
use crate::cli::IpExtractor;

/// Default number of login/register attempts per IP per minute.
pub const DEFAULT_AUTH_RATE_PER_MINUTE: u32 = 10;

/// Bucket shared by requests whose address cannot be determined.
/// Sharing it keeps those requests limited instead of exempt.
const UNKNOWN_CLIENT: &str = "unknown";

/// Per-IP rate limiter.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Rate limiting configuration for authentication endpoints.
#[derive(Clone)]
pub struct RateLimitConfig {
    /// Per-IP limiter shared by login and registration
    pub auth: Arc<IpLimiter>,
    /// Where the client IP comes from. `None` means the socket address.
    pub ip_extractor: Option<IpExtractor>,
}

impl RateLimitConfig {
    /// A limit of zero is raised to one request per minute.
    pub fn new(per_minute: u32, ip_extractor: Option<IpExtractor>) -> Self {
        let per_minute = NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            auth: Arc::new(RateLimiter::keyed(Quota::per_minute(per_minute))),
            ip_extractor,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new(DEFAULT_AUTH_RATE_PER_MINUTE, None)
    }
}

/// Middleware for rate limiting login and registration.
pub async fn rate_limit_auth(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    let ip = match extract_client_ip(&request, config.ip_extractor.as_ref()) {
        Ok(ip) => ip,
        Err(reason) => {
            debug!(reason, "Client IP unavailable, using shared bucket");
            UNKNOWN_CLIENT.to_string()
        }
    };

    match config.auth.check_key(&ip) {
        Ok(_) => next.run(request).await,
        Err(_) => {
            warn!(ip = %ip, "Authentication rate limit exceeded");
            ApiError::too_many_requests("Too many attempts. Please wait before trying again.")
                .into_response()
        }
    }
}
