//! FOLIO Storage
//!
//! Storage-facing abstractions for the infrastructure core:
//!
//! - [`KeyValueStore`]: TTL key-value store with atomic windowed counters,
//!   shared by the compute cache and the rate limiter.
//! - Record store traits ([`TokenRecordStore`], [`SubjectStore`],
//!   [`VersionRecordStore`]) standing in for the application's database.
//! - [`ComputeCache`]: content-addressed memoization of fallible computations.
//! - [`VersionStore`]: append-only, gap-free document version history.
//!
//! In-memory implementations of every trait are provided for tests and
//! single-process deployments.

pub mod cache;
pub mod kv;
pub mod memory;
pub mod records;
pub mod versions;

pub use cache::{CacheConfig, CacheKey, CacheRead, CacheStats, ComputeCache};
pub use kv::{InMemoryKeyValueStore, KeyValueStore, WindowCount};
pub use memory::InMemoryRecordStore;
pub use records::{SubjectStore, TokenRecordStore, VersionRecordStore};
pub use versions::VersionStore;
