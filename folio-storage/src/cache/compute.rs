//! Memoization of expensive or rate-limited computations.
//!
//! [`ComputeCache::get_or_compute`] returns the stored value for a key while
//! it is fresh and otherwise runs the compute function, storing only
//! successful results. The backing store is an optimization: when it fails,
//! the cache logs and computes as if it were empty.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use folio_core::clock::add_duration;
use folio_core::{
    CacheSettings, Clock, FolioResult, Timestamp, UpstreamError, ValidationError,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::key::CacheKey;
use super::read::CacheRead;
use super::stats::{CacheCounters, CacheStats};
use crate::kv::KeyValueStore;

/// Configuration for the compute cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// TTL used by [`ComputeCache::get_or_compute_default`].
    pub default_ttl: Duration,
    /// Upper bound on one compute function invocation.
    pub compute_timeout: Duration,
    /// Whether concurrent misses on one key wait for a single compute.
    pub coalesce_misses: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(3600), // 1 hour
            compute_timeout: Duration::from_secs(30),
            coalesce_misses: false,
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Set the compute timeout.
    pub fn with_compute_timeout(mut self, timeout: Duration) -> Self {
        self.compute_timeout = timeout;
        self
    }

    /// Enable or disable miss coalescing.
    pub fn with_coalescing(mut self, enabled: bool) -> Self {
        self.coalesce_misses = enabled;
        self
    }
}

impl From<&CacheSettings> for CacheConfig {
    fn from(settings: &CacheSettings) -> Self {
        Self {
            default_ttl: settings.default_ttl,
            compute_timeout: settings.compute_timeout,
            coalesce_misses: settings.coalesce_misses,
        }
    }
}

/// Serialized form of an entry. `key` guards against digest collisions
/// across namespaces sharing a store.
#[derive(Serialize, Deserialize)]
struct StoredEntry<V> {
    key: String,
    value: V,
    computed_at: Timestamp,
    expires_at: Timestamp,
}

/// Content-addressed memoization over a [`KeyValueStore`].
#[derive(Clone)]
pub struct ComputeCache {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    config: CacheConfig,
    counters: Arc<CacheCounters>,
    inflight: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

/// One waiter's claim on a key's in-flight gate.
///
/// The last waiter to leave removes the map entry, also when the compute
/// panics and the future unwinds.
struct InflightSlot<'a> {
    inflight: &'a DashMap<String, Arc<Mutex<()>>>,
    key: String,
    gate: Arc<Mutex<()>>,
}

impl<'a> InflightSlot<'a> {
    fn enter(inflight: &'a DashMap<String, Arc<Mutex<()>>>, key: String) -> Self {
        let gate = inflight
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        Self {
            inflight,
            key,
            gate,
        }
    }
}

impl Drop for InflightSlot<'_> {
    fn drop(&mut self) {
        // The map and this slot hold the only references.
        self.inflight
            .remove_if(&self.key, |_, gate| Arc::strong_count(gate) <= 2);
    }
}

impl ComputeCache {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, config: CacheConfig) -> Self {
        Self {
            store,
            clock,
            config,
            counters: Arc::new(CacheCounters::default()),
            inflight: Arc::new(DashMap::new()),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }

    /// Return the fresh value for `key`, computing and storing it on a miss.
    ///
    /// A hit does not extend the entry's lifetime. A failed or timed-out
    /// compute stores nothing and its error is returned unchanged.
    pub async fn get_or_compute<T, F, Fut>(
        &self,
        key: &CacheKey,
        ttl: Duration,
        compute: F,
    ) -> FolioResult<T>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = FolioResult<T>> + Send,
    {
        Ok(self.fetch(key, ttl, compute).await?.into_value())
    }

    /// [`get_or_compute`](Self::get_or_compute) with the configured default TTL.
    pub async fn get_or_compute_default<T, F, Fut>(&self, key: &CacheKey, compute: F) -> FolioResult<T>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = FolioResult<T>> + Send,
    {
        self.get_or_compute(key, self.config.default_ttl, compute).await
    }

    /// Like [`get_or_compute`](Self::get_or_compute) but reports whether the
    /// value was a hit.
    pub async fn fetch<T, F, Fut>(
        &self,
        key: &CacheKey,
        ttl: Duration,
        compute: F,
    ) -> FolioResult<CacheRead<T>>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = FolioResult<T>> + Send,
    {
        if ttl.is_zero() {
            return Err(ValidationError::InvalidValue {
                field: "ttl".to_string(),
                reason: "cache ttl must be positive".to_string(),
            }
            .into());
        }

        if let Some(hit) = self.lookup::<T>(key).await {
            self.counters.hit();
            debug!(operation = key.operation(), "compute cache hit");
            return Ok(hit);
        }
        self.counters.miss();
        debug!(operation = key.operation(), "compute cache miss");

        if !self.config.coalesce_misses {
            return self.compute_and_store(key, ttl, compute).await;
        }

        let slot = InflightSlot::enter(&self.inflight, key.storage_key());
        let _guard = slot.gate.lock().await;
        match self.lookup::<T>(key).await {
            Some(hit) => {
                self.counters.coalesced();
                Ok(hit)
            }
            None => self.compute_and_store(key, ttl, compute).await,
        }
    }

    /// Read a fresh value without computing.
    pub async fn peek<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        self.lookup::<T>(key).await.map(CacheRead::into_value)
    }

    /// Drop a stored value so the next call recomputes.
    pub async fn invalidate(&self, key: &CacheKey) -> FolioResult<bool> {
        self.store.delete(&key.storage_key()).await
    }

    async fn lookup<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<CacheRead<T>> {
        let storage_key = key.storage_key();
        let bytes = match self.store.get(&storage_key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(err) => {
                self.counters.backend_error();
                warn!(
                    operation = key.operation(),
                    error = %err,
                    "cache backend read failed, computing instead"
                );
                return None;
            }
        };
        let entry: StoredEntry<T> = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(
                    operation = key.operation(),
                    error = %err,
                    "discarding undecodable cache entry"
                );
                return None;
            }
        };
        if entry.key != storage_key || self.clock.now() >= entry.expires_at {
            return None;
        }
        Some(CacheRead::from_cache(entry.value, entry.computed_at))
    }

    async fn compute_and_store<T, F, Fut>(
        &self,
        key: &CacheKey,
        ttl: Duration,
        compute: F,
    ) -> FolioResult<CacheRead<T>>
    where
        T: Serialize + Send + Sync,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = FolioResult<T>> + Send,
    {
        let timeout = self.config.compute_timeout;
        let value = match tokio::time::timeout(timeout, compute()).await {
            Ok(Ok(value)) => value,
            Ok(Err(err)) => {
                self.counters.compute_failed();
                debug!(operation = key.operation(), error = %err, "compute failed, nothing cached");
                return Err(err);
            }
            Err(_) => {
                self.counters.compute_failed();
                warn!(
                    operation = key.operation(),
                    timeout_ms = timeout.as_millis() as u64,
                    "compute timed out, nothing cached"
                );
                return Err(UpstreamError::Timeout {
                    operation: key.operation().to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                }
                .into());
            }
        };
        self.counters.computed();

        let now = self.clock.now();
        let storage_key = key.storage_key();
        let entry = StoredEntry {
            key: storage_key.clone(),
            value: &value,
            computed_at: now,
            expires_at: add_duration(now, ttl),
        };
        match serde_json::to_vec(&entry) {
            Ok(bytes) => {
                if let Err(err) = self.store.set(&storage_key, bytes, ttl).await {
                    self.counters.backend_error();
                    warn!(
                        operation = key.operation(),
                        error = %err,
                        "cache backend write failed, result not cached"
                    );
                }
            }
            Err(err) => {
                warn!(
                    operation = key.operation(),
                    error = %err,
                    "cache entry serialization failed, result not cached"
                );
            }
        }

        Ok(CacheRead::from_compute(value, now))
    }
}

impl fmt::Debug for ComputeCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputeCache")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}
