//! Append-only version history for documents.
//!
//! Appends to one document are serialized by an in-process lock, and the
//! record store's uniqueness constraint catches writers in other processes.
//! A lost race is retried with a freshly read `max + 1`.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use folio_core::{
    Clock, ConflictError, DocumentId, DocumentVersion, FolioError, FolioResult, NotFoundError,
    ValidationError, VersionSettings,
};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::records::VersionRecordStore;

pub struct VersionStore {
    records: Arc<dyn VersionRecordStore>,
    clock: Arc<dyn Clock>,
    settings: VersionSettings,
    append_locks: DashMap<DocumentId, Arc<Mutex<()>>>,
}

impl VersionStore {
    pub fn new(
        records: Arc<dyn VersionRecordStore>,
        clock: Arc<dyn Clock>,
        settings: VersionSettings,
    ) -> Self {
        Self {
            records,
            clock,
            settings,
            append_locks: DashMap::new(),
        }
    }

    /// Store a new snapshot as version `max + 1` and return it.
    pub async fn append_version(
        &self,
        document_id: DocumentId,
        content_snapshot: impl Into<String>,
    ) -> FolioResult<DocumentVersion> {
        let content_snapshot = content_snapshot.into();
        if content_snapshot.len() > self.settings.max_snapshot_bytes {
            return Err(ValidationError::TooLong {
                field: "content_snapshot".to_string(),
                max: self.settings.max_snapshot_bytes,
                actual: content_snapshot.len(),
            }
            .into());
        }

        let gate = self
            .append_locks
            .entry(document_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let result = {
            let _guard = gate.lock().await;
            self.append_with_retry(document_id, content_snapshot).await
        };
        drop(gate);
        self.append_locks
            .remove_if(&document_id, |_, gate| Arc::strong_count(gate) == 1);
        result
    }

    async fn append_with_retry(
        &self,
        document_id: DocumentId,
        content_snapshot: String,
    ) -> FolioResult<DocumentVersion> {
        let attempts = self.settings.max_conflict_retries.saturating_add(1);
        let mut version = DocumentVersion::new(document_id, 1, content_snapshot, self.clock.now());

        for attempt in 1..=attempts {
            let current = self.records.max_version_number(document_id).await?;
            version.version_number = match current {
                None => 1,
                Some(n) => n.checked_add(1).ok_or_else(|| ValidationError::InvalidValue {
                    field: "version_number".to_string(),
                    reason: "document has reached the maximum version number".to_string(),
                })?,
            };
            version.created_at = self.clock.now();

            match self.records.insert_version(&version).await {
                Ok(()) => {
                    info!(
                        document_id = %document_id,
                        version_number = version.version_number,
                        bytes = version.content_snapshot.len(),
                        "document version appended"
                    );
                    return Ok(version);
                }
                Err(FolioError::Conflict(ConflictError::VersionTaken { version_number, .. })) => {
                    warn!(
                        document_id = %document_id,
                        version_number,
                        attempt,
                        "version number taken by a concurrent writer, retrying"
                    );
                }
                Err(err) => return Err(err),
            }
        }

        Err(ConflictError::AppendRetriesExhausted {
            document_id,
            attempts,
        }
        .into())
    }

    /// All versions, newest first.
    pub async fn list_versions(&self, document_id: DocumentId) -> FolioResult<Vec<DocumentVersion>> {
        let mut versions = self.records.list_versions(document_id).await?;
        versions.sort_by(|a, b| b.version_number.cmp(&a.version_number));
        Ok(versions)
    }

    /// The newest version, if any exist.
    pub async fn latest(&self, document_id: DocumentId) -> FolioResult<Option<DocumentVersion>> {
        match self.records.max_version_number(document_id).await? {
            Some(n) => self.records.get_version(document_id, n).await,
            None => Ok(None),
        }
    }

    pub async fn get_version(
        &self,
        document_id: DocumentId,
        version_number: u32,
    ) -> FolioResult<DocumentVersion> {
        self.records
            .get_version(document_id, version_number)
            .await?
            .ok_or_else(|| {
                NotFoundError::Version {
                    document_id,
                    version_number,
                }
                .into()
            })
    }
}

impl fmt::Debug for VersionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionStore")
            .field("settings", &self.settings)
            .field("pending_documents", &self.append_locks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryRecordStore;
    use async_trait::async_trait;
    use folio_core::{EntityIdType, ManualClock};
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn store_over(records: Arc<dyn VersionRecordStore>) -> VersionStore {
        VersionStore::new(
            records,
            Arc::new(ManualClock::starting_now()),
            VersionSettings::default(),
        )
    }

    fn store() -> VersionStore {
        store_over(Arc::new(InMemoryRecordStore::new()))
    }

    /// Simulates another process that claims the next version number just
    /// before our first `conflicts` inserts.
    struct ContendedRecords {
        inner: InMemoryRecordStore,
        conflicts: AtomicU32,
    }

    #[async_trait]
    impl VersionRecordStore for ContendedRecords {
        async fn max_version_number(&self, document_id: DocumentId) -> FolioResult<Option<u32>> {
            self.inner.max_version_number(document_id).await
        }

        async fn insert_version(&self, version: &DocumentVersion) -> FolioResult<()> {
            let remaining = self.conflicts.load(Ordering::SeqCst);
            if remaining > 0 {
                self.conflicts.store(remaining - 1, Ordering::SeqCst);
                let foreign = DocumentVersion::new(
                    version.document_id,
                    version.version_number,
                    "written elsewhere".to_string(),
                    version.created_at,
                );
                self.inner.insert_version(&foreign).await?;
            }
            self.inner.insert_version(version).await
        }

        async fn list_versions(&self, document_id: DocumentId) -> FolioResult<Vec<DocumentVersion>> {
            self.inner.list_versions(document_id).await
        }

        async fn get_version(
            &self,
            document_id: DocumentId,
            version_number: u32,
        ) -> FolioResult<Option<DocumentVersion>> {
            self.inner.get_version(document_id, version_number).await
        }
    }

    #[tokio::test]
    async fn test_first_append_is_version_one() {
        let versions = store();
        let doc = DocumentId::now_v7();
        assert_eq!(versions.latest(doc).await.unwrap(), None);
        let v = versions.append_version(doc, "draft").await.unwrap();
        assert_eq!(v.version_number, 1);
        assert_eq!(versions.latest(doc).await.unwrap(), Some(v));
    }

    #[tokio::test]
    async fn test_list_is_newest_first() {
        let versions = store();
        let doc = DocumentId::now_v7();
        for text in ["a", "b", "c"] {
            versions.append_version(doc, text).await.unwrap();
        }
        let listed: Vec<u32> = versions
            .list_versions(doc)
            .await
            .unwrap()
            .iter()
            .map(|v| v.version_number)
            .collect();
        assert_eq!(listed, vec![3, 2, 1]);
        assert_eq!(versions.get_version(doc, 2).await.unwrap().content_snapshot, "b");
    }

    #[tokio::test]
    async fn test_documents_are_numbered_independently() {
        let versions = store();
        let a = DocumentId::now_v7();
        let b = DocumentId::now_v7();
        versions.append_version(a, "a1").await.unwrap();
        versions.append_version(a, "a2").await.unwrap();
        let first_b = versions.append_version(b, "b1").await.unwrap();
        assert_eq!(first_b.version_number, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_appends_are_gap_free() {
        let versions = Arc::new(store());
        let doc = DocumentId::now_v7();
        let handles: Vec<_> = (0..50)
            .map(|i| {
                let versions = versions.clone();
                tokio::spawn(async move {
                    versions
                        .append_version(doc, format!("edit {}", i))
                        .await
                        .unwrap()
                        .version_number
                })
            })
            .collect();
        let mut numbers = BTreeSet::new();
        for handle in handles {
            numbers.insert(handle.await.unwrap());
        }
        assert_eq!(numbers, (1..=50).collect::<BTreeSet<u32>>());
        assert_eq!(versions.list_versions(doc).await.unwrap().len(), 50);
        assert!(versions.append_locks.is_empty());
    }

    #[tokio::test]
    async fn test_conflict_from_other_writer_is_retried() {
        let records = Arc::new(ContendedRecords {
            inner: InMemoryRecordStore::new(),
            conflicts: AtomicU32::new(2),
        });
        let versions = store_over(records);
        let doc = DocumentId::now_v7();
        let v = versions.append_version(doc, "mine").await.unwrap();
        assert_eq!(v.version_number, 3);
        assert_eq!(versions.latest(doc).await.unwrap().unwrap().content_snapshot, "mine");
    }

    #[tokio::test]
    async fn test_conflict_retries_are_bounded() {
        let records = Arc::new(ContendedRecords {
            inner: InMemoryRecordStore::new(),
            conflicts: AtomicU32::new(100),
        });
        let versions = store_over(records);
        let doc = DocumentId::now_v7();
        let err = versions.append_version(doc, "mine").await.unwrap_err();
        assert_eq!(
            err,
            FolioError::Conflict(ConflictError::AppendRetriesExhausted {
                document_id: doc,
                attempts: 6
            })
        );
    }

    #[tokio::test]
    async fn test_oversized_snapshot_rejected() {
        let versions = VersionStore::new(
            Arc::new(InMemoryRecordStore::new()),
            Arc::new(ManualClock::starting_now()),
            VersionSettings {
                max_snapshot_bytes: 4,
                ..VersionSettings::default()
            },
        );
        let err = versions
            .append_version(DocumentId::now_v7(), "too long")
            .await
            .unwrap_err();
        assert!(matches!(err, FolioError::Validation(ValidationError::TooLong { .. })));
    }

    #[tokio::test]
    async fn test_missing_version_is_not_found() {
        let versions = store();
        let doc = DocumentId::now_v7();
        let err = versions.get_version(doc, 1).await.unwrap_err();
        assert_eq!(
            err,
            FolioError::NotFound(NotFoundError::Version {
                document_id: doc,
                version_number: 1
            })
        );
    }
}
