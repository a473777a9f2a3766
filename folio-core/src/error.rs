//! Error types for FOLIO operations

use crate::{DocumentId, TokenPurpose};
use thiserror::Error;

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Value for {field} is too long: {actual} exceeds {max}")]
    TooLong {
        field: String,
        max: usize,
        actual: usize,
    },
}

/// Admission-control rejections. Both carry a retry hint in seconds.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ThrottleError {
    #[error("Too many attempts for {action}, retry after {retry_after_secs}s")]
    RateLimited {
        action: String,
        retry_after_secs: u64,
    },

    #[error("Account temporarily locked, retry after {retry_after_secs}s")]
    AccountLocked { retry_after_secs: u64 },
}

impl ThrottleError {
    pub fn retry_after_secs(&self) -> u64 {
        match self {
            ThrottleError::RateLimited {
                retry_after_secs, ..
            }
            | ThrottleError::AccountLocked { retry_after_secs } => *retry_after_secs,
        }
    }
}

/// Missing records.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NotFoundError {
    #[error("Token not found or already used")]
    Token,

    #[error("Subject not found")]
    Subject,

    #[error("Document not found: {document_id}")]
    Document { document_id: DocumentId },

    #[error("Version {version_number} of document {document_id} not found")]
    Version {
        document_id: DocumentId,
        version_number: u32,
    },
}

/// Time-bounded records past their lifetime.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExpiredError {
    #[error("{purpose} token expired")]
    Token { purpose: TokenPurpose },
}

/// Failures of external compute providers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("No provider configured for {capability}")]
    ProviderNotConfigured { capability: String },

    #[error("Request to {provider} failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Rate limited by {provider}")]
    RateLimited { provider: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("{operation} aborted unexpectedly")]
    Aborted { operation: String },

    #[error("Batch incomplete: {failed} of {total} tasks failed")]
    BatchIncomplete { failed: usize, total: usize },
}

/// Uniqueness violations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConflictError {
    #[error("Version {version_number} of document {document_id} already exists")]
    VersionTaken {
        document_id: DocumentId,
        version_number: u32,
    },

    #[error("Version append for document {document_id} gave up after {attempts} attempts")]
    AppendRetriesExhausted {
        document_id: DocumentId,
        attempts: u32,
    },

    #[error("Token hash already exists")]
    DuplicateToken,

    #[error("Subject already exists")]
    DuplicateSubject,
}

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Storage backend unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Serialization failed for {key}: {reason}")]
    Serialization { key: String, reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Authentication failures. Deliberately carries no detail.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Credential hashing failed: {reason}")]
    HashingFailed { reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all FOLIO errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FolioError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Throttled: {0}")]
    Throttled(#[from] ThrottleError),

    #[error("Not found: {0}")]
    NotFound(#[from] NotFoundError),

    #[error("Expired: {0}")]
    Expired(#[from] ExpiredError),

    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("Conflict: {0}")]
    Conflict(#[from] ConflictError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl FolioError {
    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FolioError::Upstream(err) => matches!(
                err,
                UpstreamError::RequestFailed { .. }
                    | UpstreamError::RateLimited { .. }
                    | UpstreamError::Timeout { .. }
            ),
            FolioError::Storage(StorageError::Unavailable { .. }) => true,
            FolioError::Conflict(ConflictError::VersionTaken { .. }) => true,
            _ => false,
        }
    }

    /// Retry hint for throttled callers.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            FolioError::Throttled(err) => Some(err.retry_after_secs()),
            _ => None,
        }
    }

    /// Stable machine-readable code for per-item batch failures.
    pub fn code(&self) -> &'static str {
        match self {
            FolioError::Validation(_) => "VALIDATION_FAILED",
            FolioError::Throttled(_) => "TOO_MANY_REQUESTS",
            FolioError::NotFound(_) => "NOT_FOUND",
            FolioError::Expired(_) => "EXPIRED",
            FolioError::Upstream(UpstreamError::Timeout { .. }) => "TIMEOUT",
            FolioError::Upstream(_) => "UPSTREAM_FAILED",
            FolioError::Conflict(_) => "CONFLICT",
            FolioError::Storage(_) => "STORAGE_ERROR",
            FolioError::Auth(_) => "UNAUTHORIZED",
            FolioError::Config(_) => "CONFIG_ERROR",
        }
    }
}

/// Result type alias for FOLIO operations.
pub type FolioResult<T> = Result<T, FolioError>;

// =============================================================================
// TESTS
// =============================================================================
