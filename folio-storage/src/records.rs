//! Record store traits.
//!
//! These abstract the durable store the surrounding application owns. Each
//! method that the core relies on for correctness under concurrency is
//! documented as atomic; implementations must honour that.

use std::time::Duration;

use async_trait::async_trait;
use folio_core::{
    DocumentId, DocumentVersion, FolioResult, LockoutState, SecurityToken, Subject, SubjectId,
    Timestamp, TokenHash, TokenPurpose,
};

/// Storage for security tokens, keyed by their unique hashed secret.
#[async_trait]
pub trait TokenRecordStore: Send + Sync {
    /// Insert a token. Fails with `ConflictError::DuplicateToken` if the hash exists.
    async fn insert_token(&self, token: SecurityToken) -> FolioResult<()>;

    async fn find_token(&self, hash: &TokenHash) -> FolioResult<Option<SecurityToken>>;

    /// Atomically remove and return a token.
    ///
    /// Of any number of concurrent callers for the same hash, at most one
    /// receives `Some`.
    async fn take_token(&self, hash: &TokenHash) -> FolioResult<Option<SecurityToken>>;

    /// Delete every token of `purpose` owned by `subject_id`. Returns the count.
    async fn delete_tokens_for_subject(
        &self,
        subject_id: SubjectId,
        purpose: TokenPurpose,
    ) -> FolioResult<u64>;

    /// Delete tokens whose `expires_at` is at or before `now`. Returns the count.
    async fn purge_expired_tokens(&self, now: Timestamp) -> FolioResult<u64>;
}

/// Storage for subjects and their lockout state.
#[async_trait]
pub trait SubjectStore: Send + Sync {
    /// Insert a subject. Fails with `ConflictError::DuplicateSubject` if the
    /// id or normalized email exists.
    async fn insert_subject(&self, subject: Subject) -> FolioResult<()>;

    async fn get_subject(&self, subject_id: SubjectId) -> FolioResult<Option<Subject>>;

    /// Look up by normalized email.
    async fn find_subject_by_email(&self, email: &str) -> FolioResult<Option<Subject>>;

    async fn update_credential(
        &self,
        subject_id: SubjectId,
        credential_hash: String,
    ) -> FolioResult<()>;

    async fn mark_email_verified(&self, subject_id: SubjectId, at: Timestamp) -> FolioResult<()>;

    /// Atomically apply one failed attempt and return the new state.
    ///
    /// The increment and the lock decision happen in one step so concurrent
    /// failures are all counted.
    async fn record_login_failure(
        &self,
        subject_id: SubjectId,
        threshold: u32,
        lock_duration: Duration,
        now: Timestamp,
    ) -> FolioResult<LockoutState>;

    /// Reset the failed-attempt counter and clear any lock.
    async fn clear_login_failures(&self, subject_id: SubjectId) -> FolioResult<()>;
}

/// Storage for document versions, unique on `(document_id, version_number)`.
#[async_trait]
pub trait VersionRecordStore: Send + Sync {
    async fn max_version_number(&self, document_id: DocumentId) -> FolioResult<Option<u32>>;

    /// Insert a version. Fails with `ConflictError::VersionTaken` if the
    /// `(document_id, version_number)` pair exists.
    async fn insert_version(&self, version: &DocumentVersion) -> FolioResult<()>;

    /// All versions of a document, in any order.
    async fn list_versions(&self, document_id: DocumentId) -> FolioResult<Vec<DocumentVersion>>;

    async fn get_version(
        &self,
        document_id: DocumentId,
        version_number: u32,
    ) -> FolioResult<Option<DocumentVersion>>;
}
