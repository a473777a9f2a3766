//! Content-addressed compute cache.
//!
//! Callers wrap an expensive or rate-limited computation in
//! [`ComputeCache::get_or_compute`] under a [`CacheKey`] built from the
//! operation name and canonicalized input.
//!
//! # Example
//!
//! ```ignore
//! let key = CacheKey::from_text("literature-search", &query);
//! let records = cache
//!     .get_or_compute(&key, Duration::from_secs(86_400), || async {
//!         provider.search(&query, 10).await
//!     })
//!     .await?;
//! ```

pub mod compute;
pub mod key;
pub mod read;
pub mod stats;

pub use compute::{CacheConfig, ComputeCache};
pub use key::CacheKey;
pub use read::CacheRead;
pub use stats::CacheStats;
