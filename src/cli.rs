//! CLI argument parsing, validation, and startup helpers.

use std::net::IpAddr;
use std::time::Duration;

use crate::ServerConfig;
use crate::db::{Database, UserRole};
use crate::hash::DEFAULT_BCRYPT_COST;
use crate::rate_limit::DEFAULT_AUTH_RATE_PER_MINUTE;
use crate::session::{SessionError, SessionManager, normalize_email};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use url::Url;

const MIN_JWT_SECRET_LENGTH: usize = 32;
const MIN_ADMIN_PASSWORD_LENGTH: usize = 8;

/// Longest accepted access token lifetime: one day.
pub const MAX_ACCESS_TOKEN_TTL_SECS: u64 = 24 * 60 * 60;

/// Header a reverse proxy uses to pass on the client address.
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientIpHeader {
    /// `X-Forwarded-For`, the last entry (the one the proxy appended)
    XForwardedFor,
    /// `X-Real-IP`
    XRealIp,
    /// `CF-Connecting-IP`
    CfConnectingIp,
}

/// Reads the client IP from a header set by a trusted reverse proxy.
///
/// Only configure this when the proxy overwrites or appends the header;
/// otherwise clients choose their own address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IpExtractor {
    pub header_name: &'static str,
    source: ClientIpHeader,
}

impl IpExtractor {
    /// Parse the client address out of the header value.
    pub fn extract(&self, header_value: &str) -> Result<String, &'static str> {
        let candidate = match self.source {
            ClientIpHeader::XForwardedFor => header_value
                .rsplit(',')
                .next()
                .unwrap_or(header_value),
            ClientIpHeader::XRealIp | ClientIpHeader::CfConnectingIp => header_value,
        };
        candidate
            .trim()
            .parse::<IpAddr>()
            .map(|ip| ip.to_string())
            .map_err(|_| "IP header does not contain a valid address")
    }
}

impl From<ClientIpHeader> for IpExtractor {
    fn from(source: ClientIpHeader) -> Self {
        let header_name = match source {
            ClientIpHeader::XForwardedFor => "x-forwarded-for",
            ClientIpHeader::XRealIp => "x-real-ip",
            ClientIpHeader::CfConnectingIp => "cf-connecting-ip",
        };
        Self {
            header_name,
            source,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "bookstore",
    about = "Bookstore catalog API with refresh token sessions"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "BOOKSTORE_PORT", default_value = "7291")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, env = "BOOKSTORE_DATABASE", default_value = "bookstore.db")]
    pub database: String,

    /// Public origin of the API (full URL). HTTPS enables Secure cookies
    #[arg(long, env = "BOOKSTORE_PUBLIC_ORIGIN", default_value = "http://localhost:7291")]
    pub public_origin: String,

    /// Path to file containing JWT secret. Prefer using JWT_SECRET env var instead
    #[arg(long)]
    pub jwt_secret_file: Option<String>,

    /// Access token lifetime in seconds (at most one day)
    #[arg(long, default_value_t = 900, value_parser = clap::value_parser!(u64).range(1..=MAX_ACCESS_TOKEN_TTL_SECS))]
    pub access_token_ttl_secs: u64,

    /// Refresh token lifetime in days
    #[arg(long, default_value_t = 7, value_parser = clap::value_parser!(u64).range(1..=365))]
    pub refresh_token_ttl_days: u64,

    /// bcrypt cost factor for passwords and refresh tokens
    #[arg(long, default_value_t = DEFAULT_BCRYPT_COST, value_parser = clap::value_parser!(u32).range(4..=31))]
    pub bcrypt_cost: u32,

    /// Login and register attempts allowed per client IP per minute
    #[arg(long, default_value_t = DEFAULT_AUTH_RATE_PER_MINUTE, value_parser = clap::value_parser!(u32).range(1..))]
    pub auth_rate_per_minute: u32,

    /// Read the client IP from this proxy header. Without it the socket address is used.
    /// Set only behind a reverse proxy that controls the header
    #[arg(long, env = "BOOKSTORE_IP_HEADER", value_enum)]
    pub ip_header: Option<ClientIpHeader>,

    /// Disable new user signups (admin creation via --create-admin still works)
    #[arg(long)]
    pub no_signup: bool,

    /// Create an admin user with this email on startup. Password is read from ADMIN_PASSWORD
    #[arg(long, value_name = "EMAIL")]
    pub create_admin: Option<String>,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format. `RUST_LOG` overrides the level.
pub fn init_logging(format: &LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
        LogFormat::Compact => builder.compact().init(),
    }
}

/// Load JWT secret from environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_jwt_secret(jwt_secret_file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var("JWT_SECRET") {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var("JWT_SECRET") };
        secret
    } else if let Some(path) = jwt_secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read JWT secret file");
                return None;
            }
        }
    } else {
        error!(
            "JWT secret is required. Set JWT_SECRET environment variable (recommended) or use --jwt-secret-file"
        );
        return None;
    };

    if secret.len() < MIN_JWT_SECRET_LENGTH {
        error!(
            "JWT secret is shorter than {} characters. Use a longer secret",
            MIN_JWT_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

/// Parse and validate the public origin URL.
/// Returns None and logs an error if validation fails.
pub fn validate_public_origin(origin: &str) -> Option<Url> {
    let url = match Url::parse(origin) {
        Ok(url) => url,
        Err(e) => {
            error!(origin = %origin, error = %e, "Invalid public-origin URL");
            return None;
        }
    };

    let is_https = url.scheme() == "https";
    let is_localhost = matches!(url.host_str(), Some("localhost" | "127.0.0.1"));

    if !is_https && !is_localhost {
        error!("public-origin must use HTTPS for non-localhost deployments");
        return None;
    }

    Some(url)
}

/// Handle the --create-admin flag: create the admin account unless the email is taken.
/// Returns false if startup should abort.
pub async fn handle_create_admin(sessions: &SessionManager, email: &str) -> bool {
    let Ok(password) = std::env::var("ADMIN_PASSWORD") else {
        error!("ADMIN_PASSWORD environment variable is required with --create-admin");
        return false;
    };
    // SAFETY: Still single-threaded startup work; nothing else reads this variable.
    unsafe { std::env::remove_var("ADMIN_PASSWORD") };

    if password.chars().count() < MIN_ADMIN_PASSWORD_LENGTH {
        error!(
            "ADMIN_PASSWORD must be at least {} characters",
            MIN_ADMIN_PASSWORD_LENGTH
        );
        return false;
    }

    let email = normalize_email(email);
    match sessions
        .create_user(&email, "Administrator", &password, UserRole::Admin)
        .await
    {
        Ok(admin) => {
            info!(email = %admin.email, user = %admin.id, "Admin user created");
            true
        }
        Err(SessionError::DuplicateEmail) => {
            info!(email = %email, "Admin user already exists");
            true
        }
        Err(e) => {
            error!(error = %e, "Failed to create admin user");
            false
        }
    }
}

/// Build ServerConfig from validated arguments.
pub fn build_config(
    args: &Args,
    db: Database,
    public_origin: &Url,
    jwt_secret: String,
) -> ServerConfig {
    let secure_cookies = public_origin.scheme() == "https";

    ServerConfig {
        db,
        jwt_secret: jwt_secret.into_bytes(),
        secure_cookies,
        no_signup: args.no_signup,
        access_token_ttl: Duration::from_secs(args.access_token_ttl_secs),
        refresh_token_ttl: Duration::from_secs(args.refresh_token_ttl_days * 24 * 60 * 60),
        bcrypt_cost: args.bcrypt_cost,
        auth_rate_per_minute: args.auth_rate_per_minute,
        ip_extractor: args.ip_header.map(IpExtractor::from),
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}
