//! Cache backend implementations.

use super::entry::CacheEntry;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Storage for cache entries.
///
/// Implementations must apply [`CacheBackend::record_hit`] atomically per key; the
/// cross-key methods (`snapshot`, `len`) may return slightly stale views.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>>;

    /// Insert or replace by `entry.cache_key`. An existing entry keeps its hit
    /// statistics and creation time; everything else, expiry included, is replaced.
    /// Returns `true` when the key was not present before.
    async fn upsert(&self, entry: CacheEntry) -> Result<bool>;

    /// Increment the hit count and refresh the last-hit time. `None` if the key is absent.
    async fn record_hit(&self, key: &str, at: DateTime<Utc>) -> Result<Option<CacheEntry>>;

    async fn remove(&self, key: &str) -> Result<bool>;

    /// Remove only if `predicate` still holds for the current value.
    async fn remove_if(
        &self,
        key: &str,
        predicate: &(dyn for<'p> Fn(&'p CacheEntry) -> bool + Send + Sync),
    ) -> Result<bool>;

    async fn snapshot(&self) -> Result<Vec<CacheEntry>>;
    async fn clear(&self) -> Result<()>;
    async fn len(&self) -> Result<usize>;
    fn name(&self) -> &'static str;
}

const NEVER: i64 = i64::MIN;

struct Slot {
    entry: CacheEntry,
    hit_count: AtomicU64,
    last_hit_ms: AtomicI64,
}

impl Slot {
    fn new(entry: CacheEntry) -> Self {
        let last_hit_ms = entry
            .last_hit_at
            .map(|t| t.timestamp_millis())
            .unwrap_or(NEVER);
        Self {
            hit_count: AtomicU64::new(entry.hit_count),
            last_hit_ms: AtomicI64::new(last_hit_ms),
            entry,
        }
    }

    fn snapshot(&self) -> CacheEntry {
        let mut entry = self.entry.clone();
        entry.hit_count = self.hit_count.load(Ordering::Acquire);
        entry.last_hit_at = match self.last_hit_ms.load(Ordering::Acquire) {
            NEVER => None,
            ms => DateTime::from_timestamp_millis(ms),
        };
        entry
    }
}

/// In-process backend. Per-key hit accounting uses atomics under a shard read lock,
/// so hits on different keys never contend and hits on the same key are not lost.
pub struct MemoryCache {
    entries: DashMap<String, Slot>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        Ok(self.entries.get(key).map(|slot| slot.snapshot()))
    }

    async fn upsert(&self, mut entry: CacheEntry) -> Result<bool> {
        match self.entries.entry(entry.cache_key.clone()) {
            Entry::Occupied(mut occupied) => {
                // Shard write lock is held, so no hit can land between read and replace.
                let existing = occupied.get().snapshot();
                entry.hit_count = existing.hit_count;
                entry.last_hit_at = existing.last_hit_at;
                entry.created_at = existing.created_at;
                occupied.insert(Slot::new(entry));
                Ok(false)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Slot::new(entry));
                Ok(true)
            }
        }
    }

    async fn record_hit(&self, key: &str, at: DateTime<Utc>) -> Result<Option<CacheEntry>> {
        let Some(slot) = self.entries.get(key) else {
            return Ok(None);
        };
        slot.hit_count.fetch_add(1, Ordering::AcqRel);
        slot.last_hit_ms
            .fetch_max(at.timestamp_millis(), Ordering::AcqRel);
        Ok(Some(slot.snapshot()))
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn remove_if(
        &self,
        key: &str,
        predicate: &(dyn for<'p> Fn(&'p CacheEntry) -> bool + Send + Sync),
    ) -> Result<bool> {
        Ok(self
            .entries
            .remove_if(key, |_, slot| predicate(&slot.snapshot()))
            .is_some())
    }

    async fn snapshot(&self) -> Result<Vec<CacheEntry>> {
        Ok(self.entries.iter().map(|slot| slot.snapshot()).collect())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.clear();
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.entries.len())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Backend that stores nothing; every lookup misses.
pub struct NullCache;

impl NullCache {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NullCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheBackend for NullCache {
    async fn get(&self, _: &str) -> Result<Option<CacheEntry>> {
        Ok(None)
    }
    async fn upsert(&self, _: CacheEntry) -> Result<bool> {
        Ok(false)
    }
    async fn record_hit(&self, _: &str, _: DateTime<Utc>) -> Result<Option<CacheEntry>> {
        Ok(None)
    }
    async fn remove(&self, _: &str) -> Result<bool> {
        Ok(false)
    }
    async fn remove_if(
        &self,
        _: &str,
        _: &(dyn for<'p> Fn(&'p CacheEntry) -> bool + Send + Sync),
    ) -> Result<bool> {
        Ok(false)
    }
    async fn snapshot(&self) -> Result<Vec<CacheEntry>> {
        Ok(Vec::new())
    }
    async fn clear(&self) -> Result<()> {
        Ok(())
    }
    async fn len(&self) -> Result<usize> {
        Ok(0)
    }
    fn name(&self) -> &'static str {
        "null"
    }
}
