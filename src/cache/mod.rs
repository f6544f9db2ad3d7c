//! 结果缓存模块：基于内容指纹与相似度匹配复用已生成的 3D 模型，避免重复调用供应商。
//!
//! # Result Cache Module
//!
//! Content-addressed, similarity-aware cache for generation results. A hit here
//! saves a billed provider job.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`CacheKeyer`] | Deterministic keys from normalized input, kind and quality tier |
//! | [`SimilarityMatcher`] | LCS-ratio scoring and candidate ranking |
//! | [`ResultCache`] | Exact/fuzzy lookup, upsert, expiry sweep, eviction, statistics |
//! | [`CacheBackend`] | Trait for entry storage |
//! | [`MemoryCache`] | In-process backend with per-key atomic hit counters |
//! | [`NullCache`] | No-op backend for disabling caching |
//!
//! ## Example
//!
//! ```rust
//! use model3d_forge::cache::{CacheEntry, CacheKeyer, CacheSettings, ResultCache};
//! use model3d_forge::types::{GenerationKind, QualityParams, ResultRef};
//!
//! # tokio_test::block_on(async {
//! let cache = ResultCache::in_memory(CacheSettings::default());
//! let key = CacheKeyer::new().key("A cube", GenerationKind::Text, &QualityParams::default());
//! cache
//!     .put(CacheEntry::new(
//!         key.key.clone(),
//!         key.fingerprint.clone(),
//!         "A cube",
//!         GenerationKind::Text,
//!         ResultRef::new("https://cdn.example.com/cube.obj"),
//!     ))
//!     .await;
//! assert!(cache.lookup(&key, "A cube", GenerationKind::Text).await.is_hit());
//! # });
//! ```
//!
//! ## Expiry
//!
//! Entries expire after the configured TTL unless their hit count reached the hot
//! threshold; hot entries leave only through capacity eviction.

mod backend;
mod entry;
mod key;
mod manager;
mod similarity;

pub use backend::{CacheBackend, MemoryCache, NullCache};
pub use entry::CacheEntry;
pub use key::{CacheKey, CacheKeyer, CACHE_KEY_PREFIX};
pub use manager::{CacheHealth, CacheSettings, CacheStats, HealthStatus, Lookup, ResultCache};
pub use similarity::{similarity, SimilarMatch, SimilarityMatcher};
