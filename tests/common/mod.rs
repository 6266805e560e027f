#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, header};
use bookstore::db::{Database, UserRole};
use bookstore::hash::{BcryptHasher, HashError, OneWayHasher, TokenFingerprinter};
use bookstore::jwt::JwtConfig;
use bookstore::session::{ClientMeta, SessionManager};
use bookstore::{ServerConfig, create_app};
use serde_json::Value;
use tower::ServiceExt;

pub const TEST_SECRET: &[u8] = b"test-secret-key-that-is-long-enough!!";
pub const PASSWORD: &str = "Secret1!pass";

/// Lowest cost bcrypt accepts, keeps tests fast.
pub const TEST_BCRYPT_COST: u32 = 4;

pub fn config(db: Database) -> ServerConfig {
    ServerConfig {
        db,
        jwt_secret: TEST_SECRET.to_vec(),
        secure_cookies: false,
        no_signup: false,
        access_token_ttl: Duration::from_secs(900),
        refresh_token_ttl: Duration::from_secs(7 * 24 * 60 * 60),
        bcrypt_cost: TEST_BCRYPT_COST,
        auth_rate_per_minute: 1000,
        ip_extractor: None,
    }
}

pub async fn test_db() -> Database {
    Database::open(":memory:").await.unwrap()
}

pub fn manager(db: &Database) -> SessionManager {
    manager_with_hasher(db, Arc::new(BcryptHasher::new(TEST_BCRYPT_COST)))
}

pub fn manager_with_hasher(db: &Database, hasher: Arc<dyn OneWayHasher>) -> SessionManager {
    SessionManager::new(
        db.clone(),
        Arc::new(JwtConfig::new(TEST_SECRET)),
        hasher,
        Arc::new(TokenFingerprinter::new(TEST_SECRET)),
        Duration::from_secs(7 * 24 * 60 * 60),
    )
}

/// bcrypt hasher that counts verifications.
pub struct CountingHasher {
    inner: BcryptHasher,
    verifies: AtomicUsize,
}

impl CountingHasher {
    pub fn new() -> Self {
        Self {
            inner: BcryptHasher::new(TEST_BCRYPT_COST),
            verifies: AtomicUsize::new(0),
        }
    }

    /// Verifications since the last call.
    pub fn take_verifies(&self) -> usize {
        self.verifies.swap(0, Ordering::SeqCst)
    }
}

impl OneWayHasher for CountingHasher {
    fn hash(&self, plaintext: &str) -> Result<String, HashError> {
        self.inner.hash(plaintext)
    }

    fn verify(&self, plaintext: &str, digest: &str) -> Result<bool, HashError> {
        self.verifies.fetch_add(1, Ordering::SeqCst);
        self.inner.verify(plaintext, digest)
    }
}

pub fn client(ip: &str) -> ClientMeta {
    ClientMeta {
        ip_address: Some(ip.to_string()),
        user_agent: Some("integration-test".to_string()),
    }
}

/// App plus database handle for direct assertions.
pub async fn test_app() -> (Router, Database) {
    let db = test_db().await;
    let app = create_app(&config(db.clone()));
    (app, db)
}

pub async fn create_admin(db: &Database, email: &str) {
    manager(db)
        .create_user(email, "Admin", PASSWORD, UserRole::Admin)
        .await
        .unwrap();
}

pub async fn json_body(response: Response<Body>) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn authed_request(method: &str, uri: &str, token: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token));
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub fn cookie_request(uri: &str, cookies: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::COOKIE, cookies)
        .body(Body::empty())
        .unwrap()
}

/// All `Set-Cookie` header values of a response.
pub fn set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect()
}

/// Value of a named cookie among `Set-Cookie` headers.
pub fn cookie_value(cookies: &[String], name: &str) -> Option<String> {
    cookies.iter().find_map(|cookie| {
        let pair = cookie.split(';').next()?;
        let (key, value) = pair.split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

/// Session state a browser would hold after login or refresh.
pub struct BrowserSession {
    pub access_token: String,
    pub refresh_token: String,
    pub family: String,
}

impl BrowserSession {
    pub fn cookie_header(&self) -> String {
        format!(
            "refreshToken={}; tokenFamily={}",
            self.refresh_token, self.family
        )
    }
}

pub async fn register(app: &Router, email: &str) -> Response<Body> {
    app.clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/register",
            serde_json::json!({ "email": email, "name": "Reader", "password": PASSWORD }),
        ))
        .await
        .unwrap()
}

pub async fn login(app: &Router, email: &str) -> BrowserSession {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/login",
            serde_json::json!({ "email": email, "password": PASSWORD }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), 200, "login failed");

    let cookies = set_cookies(&response);
    let body = json_body(response).await;
    BrowserSession {
        access_token: body["token"].as_str().unwrap().to_string(),
        refresh_token: cookie_value(&cookies, "refreshToken").unwrap(),
        family: cookie_value(&cookies, "tokenFamily").unwrap(),
    }
}
