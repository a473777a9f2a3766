//! Password hashing with Argon2id.
//!
//! Hashes are PHC strings, so parameters travel with the hash and old hashes
//! stay verifiable after the policy changes.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use folio_core::{AuthError, FolioResult};

/// Hashing seam so tests and alternative schemes can be injected.
pub trait CredentialHasher: Send + Sync {
    /// Hash a password into a self-describing string.
    fn hash(&self, password: &str) -> FolioResult<String>;

    /// True if `password` matches `hash`. Malformed hashes never match.
    fn verify(&self, password: &str, hash: &str) -> bool;
}

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Argon2Policy {
    /// Memory cost in KiB.
    pub memory_cost: u32,
    /// Iterations.
    pub time_cost: u32,
    pub parallelism: u32,
}

impl Default for Argon2Policy {
    fn default() -> Self {
        // OWASP baseline for Argon2id
        Self {
            memory_cost: 19 * 1024,
            time_cost: 2,
            parallelism: 1,
        }
    }
}

impl Argon2Policy {
    /// Lowest accepted cost. For tests only.
    pub fn minimal() -> Self {
        Self {
            memory_cost: Params::MIN_M_COST,
            time_cost: Params::MIN_T_COST,
            parallelism: Params::MIN_P_COST,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Argon2CredentialHasher {
    policy: Argon2Policy,
}

fn hashing_failed(e: impl std::fmt::Display) -> folio_core::FolioError {
    AuthError::HashingFailed {
        reason: e.to_string(),
    }
    .into()
}

impl Argon2CredentialHasher {
    pub fn new(policy: Argon2Policy) -> Self {
        Self { policy }
    }

    fn argon2(&self) -> FolioResult<Argon2<'static>> {
        let params = Params::new(
            self.policy.memory_cost,
            self.policy.time_cost,
            self.policy.parallelism,
            None,
        )
        .map_err(hashing_failed)?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

impl CredentialHasher for Argon2CredentialHasher {
    fn hash(&self, password: &str) -> FolioResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()?
            .hash_password(password.as_bytes(), &salt)
            .map_err(hashing_failed)?;
        Ok(hash.to_string())
    }

    fn verify(&self, password: &str, hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(hash) else {
            return false;
        };
        // Parameters come from the PHC string.
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }
}
