//! Security token records.
//!
//! Only the SHA-256 digest of a token secret is ever stored; the raw secret
//! exists in memory between issue and delivery and is never persisted.

use crate::{ContentHash, SubjectId, Timestamp};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// What a token authorizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TokenPurpose {
    VerifyEmail,
    ResetPassword,
}

impl TokenPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenPurpose::VerifyEmail => "verify-email",
            TokenPurpose::ResetPassword => "reset-password",
        }
    }

    /// Whether issuing a new token of this purpose replaces older ones
    /// for the same subject.
    pub fn is_exclusive(&self) -> bool {
        matches!(self, TokenPurpose::ResetPassword)
    }
}

impl fmt::Display for TokenPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenPurpose {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "verify-email" => Ok(TokenPurpose::VerifyEmail),
            "reset-password" => Ok(TokenPurpose::ResetPassword),
            other => Err(format!("unknown token purpose: {}", other)),
        }
    }
}

/// SHA-256 digest of a raw token secret. Serialized as lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenHash(ContentHash);

impl TokenHash {
    pub fn from_bytes(bytes: ContentHash) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &ContentHash {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl fmt::Debug for TokenHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // A prefix is enough to correlate log lines.
        write!(f, "TokenHash({}..)", &self.to_hex()[..8])
    }
}

impl Serialize for TokenHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for TokenHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// A stored, single-use, time-bounded token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityToken {
    pub hashed_secret: TokenHash,
    pub subject_id: SubjectId,
    pub purpose: TokenPurpose,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
    pub consumed_at: Option<Timestamp>,
}

impl SecurityToken {
    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }

    /// Valid iff never consumed and not yet expired.
    pub fn is_valid_at(&self, now: Timestamp) -> bool {
        self.consumed_at.is_none() && !self.is_expired_at(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{compute_content_hash, EntityIdType};
    use chrono::{Duration, Utc};

    fn token(expires_in: Duration) -> SecurityToken {
        let now = Utc::now();
        SecurityToken {
            hashed_secret: TokenHash::from_bytes(compute_content_hash(b"secret")),
            subject_id: SubjectId::now_v7(),
            purpose: TokenPurpose::VerifyEmail,
            created_at: now,
            expires_at: now + expires_in,
            consumed_at: None,
        }
    }

    #[test]
    fn test_token_validity_window() {
        let t = token(Duration::hours(1));
        assert!(t.is_valid_at(t.created_at));
        assert!(t.is_valid_at(t.expires_at - Duration::milliseconds(1)));
        assert!(!t.is_valid_at(t.expires_at));
    }

    #[test]
    fn test_consumed_token_is_invalid() {
        let mut t = token(Duration::hours(1));
        t.consumed_at = Some(t.created_at);
        assert!(!t.is_valid_at(t.created_at));
    }

    #[test]
    fn test_token_hash_serializes_as_hex() {
        let t = token(Duration::hours(1));
        let json = serde_json::to_value(&t).unwrap();
        assert_eq!(json["hashed_secret"], t.hashed_secret.to_hex());
        assert_eq!(json["purpose"], "verify-email");
        let back: SecurityToken = serde_json::from_value(json).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn test_token_hash_rejects_bad_hex() {
        assert!(TokenHash::from_hex("zz").is_err());
        assert!(TokenHash::from_hex("abcd").is_err());
    }

    #[test]
    fn test_purpose_parsing() {
        assert_eq!(
            "reset-password".parse::<TokenPurpose>().unwrap(),
            TokenPurpose::ResetPassword
        );
        assert!("admin".parse::<TokenPurpose>().is_err());
        assert!(TokenPurpose::ResetPassword.is_exclusive());
        assert!(!TokenPurpose::VerifyEmail.is_exclusive());
    }
}
