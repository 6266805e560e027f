mod auth;
mod books;
mod error;

use axum::Router;
use std::sync::Arc;

use crate::cli::IpExtractor;
use crate::db::Database;
use crate::rate_limit::RateLimitConfig;
use crate::session::SessionManager;

pub use error::{ApiError, ResultExt, validate_uuid};

/// Create the API router.
pub fn create_api_router(
    db: Database,
    sessions: SessionManager,
    secure_cookies: bool,
    no_signup: bool,
    ip_extractor: Option<IpExtractor>,
    rate_limit_config: Arc<RateLimitConfig>,
) -> Router {
    let auth_state = auth::AuthState {
        db: db.clone(),
        sessions: sessions.clone(),
        secure_cookies,
        no_signup,
        ip_extractor,
        rate_limit_config,
    };

    let books_state = books::BooksState {
        db,
        sessions,
        ip_extractor,
    };

    Router::new()
        .nest("/auth", auth::router(auth_state))
        .nest("/books", books::router(books_state))
}
