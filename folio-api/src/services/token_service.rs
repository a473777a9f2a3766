//! Single-use security tokens.
//!
//! A token is 256 random bits handed to the user once, encoded base64url.
//! Only the SHA-256 of the encoded secret is stored; verification recomputes
//! the hash and compares in constant time.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use folio_core::TokenHash;
use rand::Rng;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::constants::TOKEN_SECRET_BYTES;

/// A freshly issued token. `secret` goes to the user, `hash` to storage.
pub struct IssuedToken {
    pub secret: SecretString,
    pub hash: TokenHash,
}

impl std::fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedToken")
            .field("secret", &"[REDACTED]")
            .field("hash", &self.hash)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokenService;

impl TokenService {
    pub fn new() -> Self {
        Self
    }

    /// Generate a new secret and its storage hash.
    pub fn issue(&self) -> IssuedToken {
        let mut bytes = [0u8; TOKEN_SECRET_BYTES];
        rand::rng().fill(&mut bytes[..]);
        let encoded = URL_SAFE_NO_PAD.encode(bytes);
        let hash = Self::hash_secret(&encoded);
        IssuedToken {
            secret: SecretString::from(encoded),
            hash,
        }
    }

    /// SHA-256 of the secret as presented by the user.
    pub fn hash_secret(raw: &str) -> TokenHash {
        let digest = Sha256::digest(raw.as_bytes());
        TokenHash::from_bytes(digest.into())
    }

    /// True iff `stored` is the hash of `raw`. Constant time in the hash.
    pub fn verify(&self, raw: &str, stored: &TokenHash) -> bool {
        let candidate = Self::hash_secret(raw);
        bool::from(candidate.as_bytes().ct_eq(stored.as_bytes()))
    }

    /// Convenience for callers holding the issued secret.
    pub fn verify_secret(&self, raw: &SecretString, stored: &TokenHash) -> bool {
        self.verify(raw.expose_secret(), stored)
    }
}
