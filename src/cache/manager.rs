//! Result cache manager.

use super::backend::{CacheBackend, MemoryCache};
use super::entry::CacheEntry;
use super::key::CacheKey;
use super::similarity::{SimilarMatch, SimilarityMatcher};
use crate::types::GenerationKind;
use crate::Result;
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Lookups below this count are not graded by [`ResultCache::health`].
const MIN_LOOKUPS_FOR_HEALTH: u64 = 20;

#[derive(Debug, Clone, PartialEq)]
pub struct CacheSettings {
    pub enabled: bool,
    pub ttl: Duration,
    /// Entries with at least this many hits survive TTL expiry.
    pub hot_threshold: u64,
    pub similarity_threshold: f64,
    pub max_similar_candidates: usize,
    /// Inputs longer than this are never fuzzy-matched.
    pub max_similarity_input_chars: usize,
    pub max_entries: usize,
    pub cleanup_threshold: f64,
    pub cleanup_target: f64,
    pub max_entry_size: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(30 * 24 * 3600),
            hot_threshold: 5,
            similarity_threshold: 0.85,
            max_similar_candidates: 50,
            max_similarity_input_chars: 1024,
            max_entries: 1000,
            cleanup_threshold: 0.8,
            cleanup_target: 0.7,
            max_entry_size: 1024 * 1024,
        }
    }
}

impl CacheSettings {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
    pub fn with_hot_threshold(mut self, hits: u64) -> Self {
        self.hot_threshold = hits;
        self
    }
    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold;
        self
    }
    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    fn ttl_delta(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::days(36500))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub live_entries: usize,
    pub inserted: u64,
    /// Exact and similar hits combined.
    pub hits: u64,
    pub similar_hits: u64,
    pub misses: u64,
    pub bytes_stored: u64,
    pub expired: u64,
    pub evicted: u64,
    pub errors: u64,
}

impl CacheStats {
    pub fn lookups(&self) -> u64 {
        self.hits + self.misses
    }

    pub fn hit_ratio(&self) -> f64 {
        let total = self.lookups();
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheHealth {
    pub status: HealthStatus,
    pub hit_ratio: f64,
    pub capacity_usage: f64,
    pub issues: Vec<String>,
}

#[derive(Default)]
struct AtomicStats {
    inserted: AtomicU64,
    hits: AtomicU64,
    similar_hits: AtomicU64,
    misses: AtomicU64,
    bytes_stored: AtomicU64,
    expired: AtomicU64,
    evicted: AtomicU64,
    errors: AtomicU64,
}

impl AtomicStats {
    fn to_stats(&self, live_entries: usize) -> CacheStats {
        CacheStats {
            live_entries,
            inserted: self.inserted.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            similar_hits: self.similar_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            bytes_stored: self.bytes_stored.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        for counter in [
            &self.inserted,
            &self.hits,
            &self.similar_hits,
            &self.misses,
            &self.bytes_stored,
            &self.expired,
            &self.evicted,
            &self.errors,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Outcome of [`ResultCache::lookup`]. Hits have already been recorded.
#[derive(Debug, Clone)]
pub enum Lookup {
    Exact(CacheEntry),
    Similar(SimilarMatch),
    Miss,
}

impl Lookup {
    pub fn entry(&self) -> Option<&CacheEntry> {
        match self {
            Lookup::Exact(entry) => Some(entry),
            Lookup::Similar(m) => Some(&m.entry),
            Lookup::Miss => None,
        }
    }

    pub fn is_hit(&self) -> bool {
        !matches!(self, Lookup::Miss)
    }
}

/// Content-addressed result cache with fuzzy lookup.
///
/// Backend failures never leave this type: reads degrade to a miss, writes are
/// retried once and then dropped. Both are logged and counted in `errors`.
pub struct ResultCache {
    backend: Arc<dyn CacheBackend>,
    settings: ArcSwap<CacheSettings>,
    stats: AtomicStats,
}

impl ResultCache {
    pub fn new(settings: CacheSettings, backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            backend,
            settings: ArcSwap::from_pointee(settings),
            stats: AtomicStats::default(),
        }
    }

    pub fn in_memory(settings: CacheSettings) -> Self {
        Self::new(settings, Arc::new(MemoryCache::new()))
    }

    pub fn settings(&self) -> Arc<CacheSettings> {
        self.settings.load_full()
    }

    /// Swap settings at runtime; in-flight operations finish with the old values.
    pub fn update_settings(&self, settings: CacheSettings) {
        tracing::info!(
            similarity_threshold = settings.similarity_threshold,
            hot_threshold = settings.hot_threshold,
            max_entries = settings.max_entries,
            "cache settings updated"
        );
        self.settings.store(Arc::new(settings));
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    fn absorb<T>(&self, op: &str, key: &str, err: crate::Error) -> Option<T> {
        self.stats.errors.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(backend = self.backend.name(), op, cache_key = key, error = %err, "cache operation failed");
        None
    }

    async fn snapshot(&self) -> Vec<CacheEntry> {
        match self.backend.snapshot().await {
            Ok(entries) => entries,
            Err(e) => self.absorb("snapshot", "*", e).unwrap_or_default(),
        }
    }

    /// Live entry for `key`; expired entries count only while they are hot.
    pub async fn find_exact(&self, key: &str) -> Option<CacheEntry> {
        let settings = self.settings();
        if !settings.enabled {
            return None;
        }
        match self.backend.get(key).await {
            Ok(entry) => entry.filter(|e| !e.is_sweepable(Utc::now(), settings.hot_threshold)),
            Err(e) => self.absorb("get", key, e),
        }
    }

    /// Non-expired entries of the same kind and quality tier whose input scores at or
    /// above `threshold` (the configured threshold when `None`), best first.
    pub async fn find_similar(
        &self,
        input: &str,
        kind: GenerationKind,
        tier: Option<&str>,
        threshold: Option<f64>,
    ) -> Vec<SimilarMatch> {
        let settings = self.settings();
        let input = input.trim();
        if !settings.enabled
            || input.is_empty()
            || input.chars().count() > settings.max_similarity_input_chars
        {
            return Vec::new();
        }
        let now = Utc::now();
        let candidates = self
            .snapshot()
            .await
            .into_iter()
            .filter(|e| e.kind == kind && e.tier.as_deref() == tier && !e.is_expired(now));
        SimilarityMatcher::new(threshold.unwrap_or(settings.similarity_threshold))
            .with_max_candidates(settings.max_similar_candidates)
            .rank(input, candidates)
    }

    /// Exact lookup, then fuzzy lookup within the key's tier, with hit/miss accounting.
    pub async fn lookup(&self, key: &CacheKey, input: &str, kind: GenerationKind) -> Lookup {
        if key.degraded {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            return Lookup::Miss;
        }
        if self.find_exact(key.as_str()).await.is_some() {
            if let Some(entry) = self.record_hit(key.as_str()).await {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(cache_key = %key, hits = entry.hit_count, "exact cache hit");
                return Lookup::Exact(entry);
            }
        }
        for candidate in self.find_similar(input, kind, key.tier.as_deref(), None).await {
            // A candidate may be evicted between the scan and the hit.
            if let Some(entry) = self.record_hit(&candidate.entry.cache_key).await {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                self.stats.similar_hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    cache_key = %key,
                    matched_key = %entry.cache_key,
                    score = candidate.score,
                    "similar cache hit"
                );
                return Lookup::Similar(SimilarMatch {
                    entry,
                    score: candidate.score,
                });
            }
        }
        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(cache_key = %key, "cache miss");
        Lookup::Miss
    }

    pub async fn record_hit(&self, key: &str) -> Option<CacheEntry> {
        match self.backend.record_hit(key, Utc::now()).await {
            Ok(entry) => entry,
            Err(e) => self.absorb("record_hit", key, e),
        }
    }

    /// Best-effort upsert. Sets creation and expiry times, then enforces `max_entries`
    /// without evicting the entry just written. Returns whether the entry is now stored.
    pub async fn put(&self, mut entry: CacheEntry) -> bool {
        let settings = self.settings();
        if !settings.enabled {
            return false;
        }
        let now = Utc::now();
        entry.created_at = now;
        entry.expire_at = now + settings.ttl_delta();
        entry.payload_size = 0;
        let size = match serde_json::to_vec(&entry) {
            Ok(bytes) => bytes.len(),
            Err(e) => {
                self.absorb::<()>("serialize", &entry.cache_key, e.into());
                return false;
            }
        };
        if size > settings.max_entry_size {
            tracing::debug!(cache_key = %entry.cache_key, size, "entry exceeds max size, not cached");
            return false;
        }
        entry.payload_size = size as u64;

        let key = entry.cache_key.clone();
        let inserted = match self.backend.upsert(entry.clone()).await {
            Ok(inserted) => inserted,
            Err(first) => {
                tracing::debug!(cache_key = %key, error = %first, "cache write failed, retrying once");
                match self.backend.upsert(entry).await {
                    Ok(inserted) => inserted,
                    Err(e) => {
                        self.absorb::<()>("put", &key, e);
                        return false;
                    }
                }
            }
        };
        if inserted {
            self.stats.inserted.fetch_add(1, Ordering::Relaxed);
            self.stats.bytes_stored.fetch_add(size as u64, Ordering::Relaxed);
        }
        tracing::debug!(cache_key = %key, inserted, size, "cache entry stored");

        let live = self.len().await;
        if live > settings.max_entries {
            self.evict(live - settings.max_entries, Some(key.as_str())).await;
        }
        match self.backend.get(&key).await {
            Ok(stored) => stored.is_some(),
            Err(e) => self.absorb("get", &key, e).unwrap_or(false),
        }
    }

    /// Attach a quality score to a stored entry, keeping its hits and expiry.
    /// Returns `false` when the entry is gone.
    pub async fn set_quality_score(&self, key: &str, score: f64) -> bool {
        let entry = match self.backend.get(key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return false,
            Err(e) => return self.absorb("get", key, e).unwrap_or(false),
        };
        match self.backend.upsert(entry.with_quality_score(score)).await {
            Ok(_) => true,
            Err(e) => self.absorb("set_quality_score", key, e).unwrap_or(false),
        }
    }

    /// Remove expired entries below the hot threshold. Tolerates concurrent writers:
    /// an entry refreshed or hit in the meantime is re-checked before removal.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let hot = self.settings().hot_threshold;
        let mut removed = 0;
        for entry in self.snapshot().await {
            if !entry.is_sweepable(now, hot) {
                continue;
            }
            let still_sweepable = move |e: &CacheEntry| e.is_sweepable(now, hot);
            match self.backend.remove_if(&entry.cache_key, &still_sweepable).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => {
                    self.absorb::<()>("sweep", &entry.cache_key, e);
                }
            }
        }
        self.stats.expired.fetch_add(removed as u64, Ordering::Relaxed);
        if removed > 0 {
            tracing::info!(removed, "expired cache entries swept");
        }
        removed
    }

    /// Entries ordered cold-first: not hot, then least recently hit, then fewest hits.
    pub async fn eviction_candidates(&self, n: usize) -> Vec<CacheEntry> {
        self.coldest(n, None).await
    }

    async fn coldest(&self, n: usize, keep: Option<&str>) -> Vec<CacheEntry> {
        let hot = self.settings().hot_threshold;
        let mut entries = self.snapshot().await;
        if let Some(keep) = keep {
            entries.retain(|e| e.cache_key != keep);
        }
        entries.sort_by(|a, b| {
            (a.is_hot(hot), a.last_hit_at, a.hit_count, a.created_at).cmp(&(
                b.is_hot(hot),
                b.last_hit_at,
                b.hit_count,
                b.created_at,
            ))
        });
        entries.truncate(n);
        entries
    }

    async fn evict(&self, n: usize, keep: Option<&str>) -> usize {
        let mut evicted = 0;
        for entry in self.coldest(n, keep).await {
            match self.backend.remove(&entry.cache_key).await {
                Ok(true) => evicted += 1,
                Ok(false) => {}
                Err(e) => {
                    self.absorb::<()>("evict", &entry.cache_key, e);
                }
            }
        }
        self.stats.evicted.fetch_add(evicted as u64, Ordering::Relaxed);
        if evicted > 0 {
            tracing::info!(evicted, "cache entries evicted for capacity");
        }
        evicted
    }

    /// Above `cleanup_threshold` of capacity, evict down to `cleanup_target`.
    pub async fn enforce_capacity(&self) -> usize {
        let settings = self.settings();
        let live = self.len().await;
        let high_water = (settings.max_entries as f64 * settings.cleanup_threshold).floor() as usize;
        if live <= high_water {
            return 0;
        }
        let target = (settings.max_entries as f64 * settings.cleanup_target).floor() as usize;
        self.evict(live.saturating_sub(target), None).await
    }

    pub async fn remove(&self, key: &str) -> bool {
        match self.backend.remove(key).await {
            Ok(removed) => removed,
            Err(e) => self.absorb("remove", key, e).unwrap_or(false),
        }
    }

    pub async fn clear(&self) -> Result<()> {
        self.backend.clear().await
    }

    pub async fn len(&self) -> usize {
        match self.backend.len().await {
            Ok(n) => n,
            Err(e) => self.absorb("len", "*", e).unwrap_or(0),
        }
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn stats(&self) -> CacheStats {
        self.stats.to_stats(self.len().await)
    }

    /// Zero all cumulative counters.
    pub fn reset_stats(&self) {
        self.stats.reset();
        tracing::info!("cache statistics reset");
    }

    pub async fn health(&self) -> CacheHealth {
        let stats = self.stats().await;
        let max_entries = self.settings().max_entries.max(1);
        let capacity_usage = stats.live_entries as f64 / max_entries as f64;
        let hit_ratio = stats.hit_ratio();
        let mut status = HealthStatus::Healthy;
        let mut issues = Vec::new();

        if stats.lookups() >= MIN_LOOKUPS_FOR_HEALTH {
            let graded = if hit_ratio < 0.3 {
                HealthStatus::Critical
            } else if hit_ratio < 0.5 {
                HealthStatus::Warning
            } else {
                HealthStatus::Healthy
            };
            if graded != HealthStatus::Healthy {
                issues.push(format!("hit ratio {:.2} is low", hit_ratio));
            }
            status = status.max(graded);
        }

        let graded = if capacity_usage > 0.95 {
            HealthStatus::Critical
        } else if capacity_usage > 0.8 {
            HealthStatus::Warning
        } else {
            HealthStatus::Healthy
        };
        if graded != HealthStatus::Healthy {
            issues.push(format!("capacity usage {:.2} is high", capacity_usage));
        }
        status = status.max(graded);

        CacheHealth {
            status,
            hit_ratio,
            capacity_usage,
            issues,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheKeyer;
    use crate::types::{QualityParams, ResultRef};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    fn entry_for(input: &str) -> CacheEntry {
        let key = CacheKeyer::new().key(input, GenerationKind::Text, &QualityParams::default());
        CacheEntry::new(
            key.key,
            key.fingerprint,
            input,
            GenerationKind::Text,
            ResultRef::new(format!("https://cdn/{}.obj", input.len())),
        )
    }

    fn key_for(input: &str) -> CacheKey {
        CacheKeyer::new().key(input, GenerationKind::Text, &QualityParams::default())
    }

    #[tokio::test]
    async fn test_exact_hit_increments_hit_count() {
        let cache = ResultCache::in_memory(CacheSettings::default());
        assert!(cache.put(entry_for("A cube")).await);

        match cache.lookup(&key_for("A cube"), "A cube", GenerationKind::Text).await {
            Lookup::Exact(entry) => assert_eq!(entry.hit_count, 1),
            other => panic!("expected exact hit, got {:?}", other),
        }
        let stats = cache.stats().await;
        assert_eq!((stats.hits, stats.misses, stats.inserted), (1, 0, 1));
        assert!(stats.bytes_stored > 0);
    }

    #[tokio::test]
    async fn test_similar_hit_respects_threshold_and_kind() {
        let cache = ResultCache::in_memory(CacheSettings::default().with_similarity_threshold(0.9));
        cache.put(entry_for("a small red cube")).await;

        let near = "a small red cubes";
        match cache.lookup(&key_for(near), near, GenerationKind::Text).await {
            Lookup::Similar(m) => {
                assert!(m.score >= 0.9);
                assert_eq!(m.entry.input_content, "a small red cube");
            }
            other => panic!("expected similar hit, got {:?}", other),
        }
        // Same text under the other kind never matches.
        assert!(!cache
            .lookup(&key_for(near), near, GenerationKind::Image)
            .await
            .is_hit());
        assert!(!cache
            .lookup(&key_for("a blue sphere"), "a blue sphere", GenerationKind::Text)
            .await
            .is_hit());
        assert_eq!(cache.stats().await.similar_hits, 1);
    }

    #[tokio::test]
    async fn test_similar_hit_stays_within_quality_tier() {
        let cache = ResultCache::in_memory(CacheSettings::default().with_similarity_threshold(0.9));
        cache.put(entry_for("a small red cube")).await;

        let glb = QualityParams::new().with_result_format("GLB");
        let near = "a small red cubes";
        let glb_key = CacheKeyer::new().key(near, GenerationKind::Text, &glb);
        assert!(!cache.lookup(&glb_key, near, GenerationKind::Text).await.is_hit());

        let key = CacheKeyer::new().key("a small red cube", GenerationKind::Text, &glb);
        cache
            .put(
                CacheEntry::new(
                    key.key.clone(),
                    key.fingerprint.clone(),
                    "a small red cube",
                    GenerationKind::Text,
                    ResultRef::new("https://cdn/cube.glb"),
                )
                .with_tier(key.tier.clone()),
            )
            .await;
        match cache.lookup(&glb_key, near, GenerationKind::Text).await {
            Lookup::Similar(m) => {
                assert_eq!(m.entry.cache_key, key.key);
                assert_eq!(m.entry.result.asset_url.as_deref(), Some("https://cdn/cube.glb"));
            }
            other => panic!("expected similar hit in the GLB tier, got {:?}", other),
        }
        assert_eq!(
            cache
                .find_similar(near, GenerationKind::Text, None, None)
                .await
                .into_iter()
                .map(|m| m.entry.tier)
                .collect::<Vec<_>>(),
            vec![None]
        );
    }

    #[tokio::test]
    async fn test_threshold_is_tunable_at_runtime() {
        let cache = ResultCache::in_memory(CacheSettings::default().with_similarity_threshold(0.99));
        cache.put(entry_for("a small red cube")).await;
        assert!(cache.find_similar("a small red cubes", GenerationKind::Text, None, None).await.is_empty());

        cache.update_settings(CacheSettings::default().with_similarity_threshold(0.9));
        assert_eq!(
            cache.find_similar("a small red cubes", GenerationKind::Text, None, None).await.len(),
            1
        );
    }

    #[tokio::test]
    async fn test_degraded_key_always_misses() {
        let cache = ResultCache::in_memory(CacheSettings::default());
        let key = CacheKeyer::new().key("", GenerationKind::Text, &QualityParams::default());
        assert!(!cache.lookup(&key, "", GenerationKind::Text).await.is_hit());
        assert_eq!(cache.stats().await.misses, 1);
    }

    #[tokio::test]
    async fn test_sweep_keeps_hot_entries() {
        let cache = ResultCache::in_memory(CacheSettings::default().with_hot_threshold(2));
        cache.put(entry_for("cold")).await;
        cache.put(entry_for("hot")).await;
        let hot_key = key_for("hot");
        cache.record_hit(hot_key.as_str()).await;
        cache.record_hit(hot_key.as_str()).await;

        let later = Utc::now() + chrono::Duration::days(31);
        assert_eq!(cache.sweep_expired(later).await, 1);
        assert!(cache.find_exact(hot_key.as_str()).await.is_some());
        assert!(cache.find_exact(key_for("cold").as_str()).await.is_none());
        assert_eq!(cache.stats().await.expired, 1);
    }

    #[tokio::test]
    async fn test_put_evicts_coldest_beyond_capacity() {
        let cache = ResultCache::in_memory(CacheSettings::default().with_max_entries(2));
        cache.put(entry_for("first")).await;
        cache.put(entry_for("second")).await;
        cache.record_hit(key_for("first").as_str()).await;
        cache.put(entry_for("third")).await;

        assert_eq!(cache.len().await, 2);
        assert!(cache.find_exact(key_for("second").as_str()).await.is_none());
        assert!(cache.find_exact(key_for("first").as_str()).await.is_some());
        assert_eq!(cache.stats().await.evicted, 1);
    }

    #[tokio::test]
    async fn test_put_never_evicts_the_entry_it_stores() {
        let cache = ResultCache::in_memory(CacheSettings::default().with_max_entries(2));
        cache.put(entry_for("alpha one")).await;
        cache.put(entry_for("bravo two")).await;
        cache.record_hit(key_for("alpha one").as_str()).await;
        cache.record_hit(key_for("bravo two").as_str()).await;

        assert!(cache.put(entry_for("zulu nine")).await);
        assert!(cache.find_exact(key_for("zulu nine").as_str()).await.is_some());
        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.stats().await.evicted, 1);
    }

    #[tokio::test]
    async fn test_reput_resets_ttl() {
        let cache = ResultCache::in_memory(CacheSettings::default().with_ttl(Duration::from_secs(60)));
        cache.put(entry_for("A cube")).await;
        let first = cache.find_exact(key_for("A cube").as_str()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        cache.put(entry_for("A cube")).await;
        let second = cache.find_exact(key_for("A cube").as_str()).await.unwrap();
        assert!(second.expire_at > first.expire_at);
        assert_eq!(second.created_at, first.created_at);
    }

    #[tokio::test]
    async fn test_quality_score_keeps_hits_and_expiry() {
        let cache = ResultCache::in_memory(CacheSettings::default());
        cache.put(entry_for("A cube")).await;
        let key = key_for("A cube");
        cache.record_hit(key.as_str()).await;
        let before = cache.find_exact(key.as_str()).await.unwrap();

        assert!(cache.set_quality_score(key.as_str(), 80.7).await);
        let after = cache.find_exact(key.as_str()).await.unwrap();
        assert_eq!(after.quality_score, Some(80.7));
        assert_eq!(after.hit_count, 1);
        assert_eq!(after.expire_at, before.expire_at);
        assert!(!cache.set_quality_score(key_for("missing").as_str(), 50.0).await);
    }

    #[tokio::test]
    async fn test_enforce_capacity_trims_to_target() {
        let cache = ResultCache::in_memory(CacheSettings::default().with_max_entries(10));
        for i in 0..9 {
            cache.put(entry_for(&format!("prompt {}", i))).await;
        }
        assert_eq!(cache.enforce_capacity().await, 2);
        assert_eq!(cache.len().await, 7);
        assert_eq!(cache.enforce_capacity().await, 0);
    }

    #[tokio::test]
    async fn test_oversized_entry_is_skipped() {
        let mut settings = CacheSettings::default();
        settings.max_entry_size = 16;
        let cache = ResultCache::in_memory(settings);
        assert!(!cache.put(entry_for("A cube")).await);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_health_grades_after_enough_lookups() {
        let cache = ResultCache::in_memory(CacheSettings::default());
        for i in 0..(MIN_LOOKUPS_FOR_HEALTH - 1) {
            let input = format!("unseen {}", i);
            cache.lookup(&key_for(&input), &input, GenerationKind::Text).await;
        }
        assert_eq!(cache.health().await.status, HealthStatus::Healthy);
        cache.lookup(&key_for("one more"), "one more", GenerationKind::Text).await;
        let health = cache.health().await;
        assert_eq!(health.status, HealthStatus::Critical);
        assert_eq!(health.issues.len(), 1);

        cache.reset_stats();
        assert_eq!(cache.stats().await.misses, 0);
        assert_eq!(cache.health().await.status, HealthStatus::Healthy);
    }

    struct FailingBackend {
        writes: AtomicUsize,
    }

    #[async_trait]
    impl CacheBackend for FailingBackend {
        async fn get(&self, _: &str) -> Result<Option<CacheEntry>> {
            Err(crate::Error::Cache("backend down".into()))
        }
        async fn upsert(&self, _: CacheEntry) -> Result<bool> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Err(crate::Error::Cache("backend down".into()))
        }
        async fn record_hit(&self, _: &str, _: DateTime<Utc>) -> Result<Option<CacheEntry>> {
            Err(crate::Error::Cache("backend down".into()))
        }
        async fn remove(&self, _: &str) -> Result<bool> {
            Err(crate::Error::Cache("backend down".into()))
        }
        async fn remove_if(
            &self,
            _: &str,
            _: &(dyn for<'p> Fn(&'p CacheEntry) -> bool + Send + Sync),
        ) -> Result<bool> {
            Err(crate::Error::Cache("backend down".into()))
        }
        async fn snapshot(&self) -> Result<Vec<CacheEntry>> {
            Err(crate::Error::Cache("backend down".into()))
        }
        async fn clear(&self) -> Result<()> {
            Ok(())
        }
        async fn len(&self) -> Result<usize> {
            Err(crate::Error::Cache("backend down".into()))
        }
        fn name(&self) -> &'static str {
            "failing"
        }
    }

    #[tokio::test]
    async fn test_backend_failures_degrade_to_miss() {
        let backend = Arc::new(FailingBackend {
            writes: AtomicUsize::new(0),
        });
        let cache = ResultCache::new(CacheSettings::default(), backend.clone());

        assert!(!cache
            .lookup(&key_for("A cube"), "A cube", GenerationKind::Text)
            .await
            .is_hit());
        assert!(!cache.put(entry_for("A cube")).await);
        // One retry, then dropped.
        assert_eq!(backend.writes.load(Ordering::SeqCst), 2);
        let stats = cache.stats().await;
        assert_eq!(stats.misses, 1);
        assert!(stats.errors >= 3);
    }
}
