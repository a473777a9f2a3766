//! Content-addressed cache keys.
//!
//! `CacheKey`'s private inner struct means a key can only come out of one of
//! the canonicalizing constructors. Two inputs that differ only in
//! whitespace, case or JSON key order therefore always produce the same key.

use folio_core::{
    canonical_json, canonicalize_identifier, canonicalize_text, FolioResult, StorageError,
};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Namespace prefix of every compute cache entry in the key-value store.
const KEY_NAMESPACE: &str = "cache";

/// A deterministic key derived from an operation name and its canonical input.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Private inner data - cannot be constructed externally
    inner: CacheKeyInner,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKeyInner {
    operation: String,
    digest: String,
}

impl CacheKey {
    /// Key over free text (queries, prompts, documents to score).
    pub fn from_text(operation: &str, input: &str) -> Self {
        Self::digest(operation, [canonicalize_text(input)])
    }

    /// Key over an external identifier such as a DOI.
    pub fn from_identifier(operation: &str, identifier: &str) -> Self {
        Self::digest(operation, [canonicalize_identifier(identifier)])
    }

    /// Key over several text fields. Field order matters; each field is
    /// canonicalized independently.
    pub fn from_parts<I, S>(operation: &str, parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::digest(
            operation,
            parts.into_iter().map(|part| canonicalize_text(part.as_ref())),
        )
    }

    /// Key over a structured input, canonicalized as sorted JSON.
    pub fn from_json<T: Serialize>(operation: &str, input: &T) -> FolioResult<Self> {
        let value = serde_json::to_value(input).map_err(|e| StorageError::Serialization {
            key: operation.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::digest(operation, [canonical_json(&value)]))
    }

    fn digest<I>(operation: &str, canonical_parts: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let operation = canonicalize_operation(operation);
        let mut hasher = Sha256::new();
        hasher.update((operation.len() as u64).to_be_bytes());
        hasher.update(operation.as_bytes());
        for part in canonical_parts {
            // Length-prefix each part so ("ab", "c") and ("a", "bc") differ.
            hasher.update((part.len() as u64).to_be_bytes());
            hasher.update(part.as_bytes());
        }
        Self {
            inner: CacheKeyInner {
                operation,
                digest: hex::encode(hasher.finalize()),
            },
        }
    }

    /// Normalized operation name.
    pub fn operation(&self) -> &str {
        &self.inner.operation
    }

    /// Hex SHA-256 of operation and canonical input.
    pub fn digest_hex(&self) -> &str {
        &self.inner.digest
    }

    /// Key under which the entry lives in the key-value store.
    pub fn storage_key(&self) -> String {
        format!(
            "{}:{}:{}",
            KEY_NAMESPACE, self.inner.operation, self.inner.digest
        )
    }
}

fn canonicalize_operation(operation: &str) -> String {
    operation
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase()
}
