//! Document version snapshots.

use crate::{compute_content_hash, DocumentId, Timestamp};
use serde::{Deserialize, Serialize};

/// Immutable snapshot of a document's content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentVersion {
    pub document_id: DocumentId,
    /// Starts at 1 and increases by one per successful append.
    pub version_number: u32,
    pub content_snapshot: String,
    /// Hex SHA-256 of `content_snapshot`.
    pub content_hash: String,
    pub created_at: Timestamp,
}

impl DocumentVersion {
    pub fn new(
        document_id: DocumentId,
        version_number: u32,
        content_snapshot: String,
        created_at: Timestamp,
    ) -> Self {
        let content_hash = hex::encode(compute_content_hash(content_snapshot.as_bytes()));
        Self {
            document_id,
            version_number,
            content_snapshot,
            content_hash,
            created_at,
        }
    }

    /// Summary without the snapshot body, for listings.
    pub fn summary(&self) -> VersionSummary {
        VersionSummary {
            document_id: self.document_id,
            version_number: self.version_number,
            content_hash: self.content_hash.clone(),
            content_bytes: self.content_snapshot.len(),
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionSummary {
    pub document_id: DocumentId,
    pub version_number: u32,
    pub content_hash: String,
    pub content_bytes: usize,
    pub created_at: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EntityIdType;
    use chrono::Utc;

    #[test]
    fn test_version_hashes_snapshot() {
        let v = DocumentVersion::new(DocumentId::now_v7(), 1, "abc".to_string(), Utc::now());
        assert_eq!(
            v.content_hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        let summary = v.summary();
        assert_eq!(summary.content_bytes, 3);
        assert_eq!(summary.version_number, 1);
    }
}
