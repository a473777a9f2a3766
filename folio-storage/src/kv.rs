//! Key-value store with TTL and atomic windowed counters.
//!
//! This is the shared backing store for the compute cache and the rate
//! limiter. Implementations must make `increment_window` atomic per key.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use folio_core::clock::add_duration;
use folio_core::{Clock, FolioResult, Timestamp};

/// Counter value after an atomic increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCount {
    /// Attempts recorded in the current window, including this one.
    pub count: u64,
    /// When the current window ends and the counter starts over.
    pub resets_at: Timestamp,
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Get a live value. Expired entries read as absent.
    async fn get(&self, key: &str) -> FolioResult<Option<Vec<u8>>>;

    /// Store a value that expires after `ttl`, replacing any previous value.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> FolioResult<()>;

    /// Remove a key. Returns whether a live value was removed.
    async fn delete(&self, key: &str) -> FolioResult<bool>;

    /// Atomically increment a fixed-window counter.
    ///
    /// If the key has no live window a new window of length `window` starts
    /// with a count of 1. Otherwise the count is incremented and the window
    /// end is left unchanged.
    async fn increment_window(&self, key: &str, window: Duration) -> FolioResult<WindowCount>;

    /// Drop expired entries and return how many were removed.
    ///
    /// Backends that expire keys on their own keep the default.
    async fn purge_expired(&self) -> FolioResult<u64> {
        Ok(0)
    }
}

#[derive(Debug, Clone)]
enum Slot {
    Bytes(Vec<u8>),
    Counter(u64),
}

#[derive(Debug, Clone)]
struct StoredValue {
    slot: Slot,
    expires_at: Timestamp,
}

impl StoredValue {
    fn is_live(&self, now: Timestamp) -> bool {
        now < self.expires_at
    }
}

/// Process-local [`KeyValueStore`] backed by a sharded map.
pub struct InMemoryKeyValueStore {
    entries: DashMap<String, StoredValue>,
    clock: Arc<dyn Clock>,
}

impl InMemoryKeyValueStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Number of stored keys, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for InMemoryKeyValueStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryKeyValueStore")
            .field("entries", &self.entries.len())
            .finish()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn get(&self, key: &str) -> FolioResult<Option<Vec<u8>>> {
        let now = self.clock.now();
        let (value, expired) = match self.entries.get(key) {
            Some(entry) if entry.is_live(now) => match &entry.slot {
                Slot::Bytes(bytes) => (Some(bytes.clone()), false),
                Slot::Counter(_) => (None, false),
            },
            Some(_) => (None, true),
            None => (None, false),
        };
        if expired {
            self.entries.remove_if(key, |_, value| !value.is_live(now));
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> FolioResult<()> {
        let expires_at = add_duration(self.clock.now(), ttl);
        self.entries.insert(
            key.to_string(),
            StoredValue {
                slot: Slot::Bytes(value),
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> FolioResult<bool> {
        let now = self.clock.now();
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, value)| value.is_live(now)))
    }

    async fn increment_window(&self, key: &str, window: Duration) -> FolioResult<WindowCount> {
        let now = self.clock.now();
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| StoredValue {
            slot: Slot::Counter(0),
            expires_at: now,
        });
        let stored = entry.value_mut();
        let live = stored.is_live(now);
        let count = match stored.slot {
            Slot::Counter(count) if live => count.saturating_add(1),
            _ => {
                stored.expires_at = add_duration(now, window);
                1
            }
        };
        stored.slot = Slot::Counter(count);
        Ok(WindowCount {
            count,
            resets_at: stored.expires_at,
        })
    }

    async fn purge_expired(&self) -> FolioResult<u64> {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, value| value.is_live(now));
        Ok(before.saturating_sub(self.entries.len()) as u64)
    }
}
