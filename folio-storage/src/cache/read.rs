//! Cache read results.

use folio_core::Timestamp;

/// Value returned by the compute cache together with where it came from.
#[derive(Debug, Clone)]
pub struct CacheRead<T> {
    value: T,
    /// When the value was computed.
    computed_at: Timestamp,
    was_cache_hit: bool,
}

impl<T> CacheRead<T> {
    /// A value served from a stored entry.
    pub fn from_cache(value: T, computed_at: Timestamp) -> Self {
        Self {
            value,
            computed_at,
            was_cache_hit: true,
        }
    }

    /// A value produced by running the compute function.
    pub fn from_compute(value: T, computed_at: Timestamp) -> Self {
        Self {
            value,
            computed_at,
            was_cache_hit: false,
        }
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn computed_at(&self) -> Timestamp {
        self.computed_at
    }

    pub fn was_cache_hit(&self) -> bool {
        self.was_cache_hit
    }

    /// Apply a function to the value, keeping the metadata.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> CacheRead<U> {
        CacheRead {
            value: f(self.value),
            computed_at: self.computed_at,
            was_cache_hit: self.was_cache_hit,
        }
    }
}
