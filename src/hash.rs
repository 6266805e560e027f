//! One-way hashing for passwords and refresh tokens.
//!
//! Both secrets go through the same slow hash so a leaked database yields
//! neither usable passwords nor usable refresh tokens. Refresh tokens also get
//! a keyed fast digest, used only to find their record.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Domain separation for lookup digests, which share the server secret.
const LOOKUP_CONTEXT: &[u8] = b"bookstore/refresh-token-lookup/v1:";

/// Default bcrypt cost factor.
pub const DEFAULT_BCRYPT_COST: u32 = 10;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("hashing failed: {0}")]
    Hash(String),

    #[error("verification failed: {0}")]
    Verify(String),

    #[error("lookup digest failed: {0}")]
    Lookup(String),
}

/// A one-way hash with a constant-time verification step.
pub trait OneWayHasher: Send + Sync {
    fn hash(&self, plaintext: &str) -> Result<String, HashError>;

    fn verify(&self, plaintext: &str, digest: &str) -> Result<bool, HashError>;
}

/// bcrypt-backed hasher.
#[derive(Debug, Clone, Copy)]
pub struct BcryptHasher {
    cost: u32,
}

impl BcryptHasher {
    /// Costs outside bcrypt's supported range are clamped.
    pub fn new(cost: u32) -> Self {
        Self {
            cost: cost.clamp(4, 31),
        }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }
}

impl Default for BcryptHasher {
    fn default() -> Self {
        Self::new(DEFAULT_BCRYPT_COST)
    }
}

impl OneWayHasher for BcryptHasher {
    fn hash(&self, plaintext: &str) -> Result<String, HashError> {
        bcrypt::hash(plaintext, self.cost).map_err(|e| HashError::Hash(e.to_string()))
    }

    fn verify(&self, plaintext: &str, digest: &str) -> Result<bool, HashError> {
        bcrypt::verify(plaintext, digest).map_err(|e| HashError::Verify(e.to_string()))
    }
}

/// HMAC-SHA256 of a refresh token under a server-side key, hex encoded.
///
/// Deterministic, so it can be indexed: a presented token selects at most one
/// candidate record and the slow hash runs once.
#[derive(Clone)]
pub struct TokenFingerprinter {
    key: Vec<u8>,
}

impl TokenFingerprinter {
    pub fn new(key: &[u8]) -> Self {
        Self { key: key.to_vec() }
    }

    pub fn fingerprint(&self, token: &str) -> Result<String, HashError> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| HashError::Lookup(e.to_string()))?;
        mac.update(LOOKUP_CONTEXT);
        mac.update(token.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}
