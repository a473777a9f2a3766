//! FOLIO Core - Entity Types
//!
//! Pure data structures shared by every FOLIO crate: identifiers, the error
//! taxonomy, configuration, the clock abstraction and canonical key forms.
//! This crate contains ONLY data types - no I/O.

pub mod account;
pub mod canonical;
pub mod clock;
pub mod config;
pub mod document;
pub mod error;
pub mod generation;
pub mod identity;
pub mod token;

pub use account::{normalize_email, LockoutState, Subject};
pub use canonical::{canonical_json, canonicalize_identifier, canonicalize_text};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    AccountSettings, BatchSettings, CacheSettings, FolioConfig, LockoutSettings, RateLimitAction,
    RateLimitPolicy, RateLimitSettings, RetryConfig, TokenSettings, VersionSettings,
};
pub use document::{DocumentVersion, VersionSummary};
pub use error::{
    AuthError, ConfigError, ConflictError, ExpiredError, FolioError, FolioResult, NotFoundError,
    StorageError, ThrottleError, UpstreamError, ValidationError,
};
pub use generation::{BatchResult, GeneratedSection, GenerationTask, TaskOutcome, TaskState};
pub use identity::{
    compute_content_hash, ContentHash, DocumentId, EntityIdType, SectionId, SubjectId, Timestamp,
};
pub use token::{SecurityToken, TokenHash, TokenPurpose};
