//! In-memory record store for tests and single-process deployments.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use folio_core::{
    ConflictError, DocumentId, DocumentVersion, FolioResult, LockoutState, NotFoundError,
    SecurityToken, StorageError, Subject, SubjectId, Timestamp, TokenHash, TokenPurpose,
};

use crate::records::{SubjectStore, TokenRecordStore, VersionRecordStore};

/// In-memory implementation of every record store trait.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    tokens: RwLock<HashMap<TokenHash, SecurityToken>>,
    subjects: RwLock<HashMap<SubjectId, Subject>>,
    versions: RwLock<HashMap<DocumentId, BTreeMap<u32, DocumentVersion>>>,
}

fn read<T>(lock: &RwLock<T>) -> FolioResult<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| StorageError::LockPoisoned.into())
}

fn write<T>(lock: &RwLock<T>) -> FolioResult<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| StorageError::LockPoisoned.into())
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get count of stored tokens.
    pub fn token_count(&self) -> usize {
        read(&self.tokens).map(|tokens| tokens.len()).unwrap_or(0)
    }

    /// Get count of stored subjects.
    pub fn subject_count(&self) -> usize {
        read(&self.subjects).map(|s| s.len()).unwrap_or(0)
    }
}

#[async_trait]
impl TokenRecordStore for InMemoryRecordStore {
    async fn insert_token(&self, token: SecurityToken) -> FolioResult<()> {
        let mut tokens = write(&self.tokens)?;
        if tokens.contains_key(&token.hashed_secret) {
            return Err(ConflictError::DuplicateToken.into());
        }
        tokens.insert(token.hashed_secret, token);
        Ok(())
    }

    async fn find_token(&self, hash: &TokenHash) -> FolioResult<Option<SecurityToken>> {
        Ok(read(&self.tokens)?.get(hash).cloned())
    }

    async fn take_token(&self, hash: &TokenHash) -> FolioResult<Option<SecurityToken>> {
        Ok(write(&self.tokens)?.remove(hash))
    }

    async fn delete_tokens_for_subject(
        &self,
        subject_id: SubjectId,
        purpose: TokenPurpose,
    ) -> FolioResult<u64> {
        let mut tokens = write(&self.tokens)?;
        let before = tokens.len();
        tokens.retain(|_, t| !(t.subject_id == subject_id && t.purpose == purpose));
        Ok((before - tokens.len()) as u64)
    }

    async fn purge_expired_tokens(&self, now: Timestamp) -> FolioResult<u64> {
        let mut tokens = write(&self.tokens)?;
        let before = tokens.len();
        tokens.retain(|_, t| !t.is_expired_at(now));
        Ok((before - tokens.len()) as u64)
    }
}

#[async_trait]
impl SubjectStore for InMemoryRecordStore {
    async fn insert_subject(&self, subject: Subject) -> FolioResult<()> {
        let mut subjects = write(&self.subjects)?;
        if subjects.contains_key(&subject.subject_id)
            || subjects.values().any(|s| s.email == subject.email)
        {
            return Err(ConflictError::DuplicateSubject.into());
        }
        subjects.insert(subject.subject_id, subject);
        Ok(())
    }

    async fn get_subject(&self, subject_id: SubjectId) -> FolioResult<Option<Subject>> {
        Ok(read(&self.subjects)?.get(&subject_id).cloned())
    }

    async fn find_subject_by_email(&self, email: &str) -> FolioResult<Option<Subject>> {
        Ok(read(&self.subjects)?
            .values()
            .find(|s| s.email == email)
            .cloned())
    }

    async fn update_credential(
        &self,
        subject_id: SubjectId,
        credential_hash: String,
    ) -> FolioResult<()> {
        let mut subjects = write(&self.subjects)?;
        let subject = subjects
            .get_mut(&subject_id)
            .ok_or(NotFoundError::Subject)?;
        subject.credential_hash = credential_hash;
        Ok(())
    }

    async fn mark_email_verified(&self, subject_id: SubjectId, at: Timestamp) -> FolioResult<()> {
        let mut subjects = write(&self.subjects)?;
        let subject = subjects
            .get_mut(&subject_id)
            .ok_or(NotFoundError::Subject)?;
        subject.email_verified_at.get_or_insert(at);
        Ok(())
    }

    async fn record_login_failure(
        &self,
        subject_id: SubjectId,
        threshold: u32,
        lock_duration: Duration,
        now: Timestamp,
    ) -> FolioResult<LockoutState> {
        let mut subjects = write(&self.subjects)?;
        let subject = subjects
            .get_mut(&subject_id)
            .ok_or(NotFoundError::Subject)?;
        subject.lockout = subject.lockout.after_failure(now, threshold, lock_duration);
        Ok(subject.lockout.clone())
    }

    async fn clear_login_failures(&self, subject_id: SubjectId) -> FolioResult<()> {
        let mut subjects = write(&self.subjects)?;
        let subject = subjects
            .get_mut(&subject_id)
            .ok_or(NotFoundError::Subject)?;
        subject.lockout = LockoutState::cleared();
        Ok(())
    }
}

#[async_trait]
impl VersionRecordStore for InMemoryRecordStore {
    async fn max_version_number(&self, document_id: DocumentId) -> FolioResult<Option<u32>> {
        Ok(read(&self.versions)?
            .get(&document_id)
            .and_then(|versions| versions.keys().next_back().copied()))
    }

    async fn insert_version(&self, version: &DocumentVersion) -> FolioResult<()> {
        let mut versions = write(&self.versions)?;
        let document = versions.entry(version.document_id).or_default();
        if document.contains_key(&version.version_number) {
            return Err(ConflictError::VersionTaken {
                document_id: version.document_id,
                version_number: version.version_number,
            }
            .into());
        }
        document.insert(version.version_number, version.clone());
        Ok(())
    }

    async fn list_versions(&self, document_id: DocumentId) -> FolioResult<Vec<DocumentVersion>> {
        Ok(read(&self.versions)?
            .get(&document_id)
            .map(|versions| versions.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn get_version(
        &self,
        document_id: DocumentId,
        version_number: u32,
    ) -> FolioResult<Option<DocumentVersion>> {
        Ok(read(&self.versions)?
            .get(&document_id)
            .and_then(|versions| versions.get(&version_number))
            .cloned())
    }
}
