pub mod api;
pub mod auth;
pub mod cleanup;
pub mod cli;
pub mod db;
pub mod hash;
pub mod jwt;
pub mod rate_limit;
pub mod session;

use api::create_api_router;
use axum::Router;
use db::Database;
use hash::{BcryptHasher, TokenFingerprinter};
use jwt::JwtConfig;
use rate_limit::RateLimitConfig;
use session::SessionManager;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// JWT secret for signing access tokens
    pub jwt_secret: Vec<u8>,
    /// Whether to set Secure flag on cookies (should be true in production with HTTPS)
    pub secure_cookies: bool,
    /// Whether new user signups are disabled
    pub no_signup: bool,
    /// Access token lifetime
    pub access_token_ttl: Duration,
    /// Refresh token lifetime
    pub refresh_token_ttl: Duration,
    /// bcrypt cost for passwords and refresh tokens
    pub bcrypt_cost: u32,
    /// Login/register attempts allowed per client IP per minute
    pub auth_rate_per_minute: u32,
    /// Proxy header to read the client IP from. `None` uses the socket address
    pub ip_extractor: Option<cli::IpExtractor>,
}

/// Build the session manager for a configuration.
pub fn session_manager(config: &ServerConfig) -> SessionManager {
    let jwt = Arc::new(JwtConfig::with_access_ttl(
        &config.jwt_secret,
        config.access_token_ttl,
    ));
    SessionManager::new(
        config.db.clone(),
        jwt,
        Arc::new(BcryptHasher::new(config.bcrypt_cost)),
        Arc::new(TokenFingerprinter::new(&config.jwt_secret)),
        config.refresh_token_ttl,
    )
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    let api_router = create_api_router(
        config.db.clone(),
        session_manager(config),
        config.secure_cookies,
        config.no_signup,
        config.ip_extractor,
        Arc::new(RateLimitConfig::new(
            config.auth_rate_per_minute,
            config.ip_extractor,
        )),
    );

    Router::new().nest("/api", api_router)
}

/// Run cleanup tasks and spawn background scheduler.
/// Call this before starting the server.
pub async fn init_cleanup(db: &Database) {
    cleanup::run_cleanup(db).await;
    cleanup::spawn_cleanup_scheduler(db.clone());
}

/// Run the server on the given listener. This function blocks until the server exits.
/// Call `init_cleanup` before this to run cleanup on startup.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}
