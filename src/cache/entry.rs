//! Cache entry snapshot type.

use crate::types::{GenerationKind, ResultRef};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Point-in-time view of one cached generation result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub cache_key: String,
    pub fingerprint: String,
    /// Raw input snapshot used for similarity matching.
    pub input_content: String,
    pub kind: GenerationKind,
    /// Quality tier the result was generated for; `None` for default parameters.
    #[serde(default)]
    pub tier: Option<String>,
    pub result: ResultRef,
    pub quality_score: Option<f64>,
    /// Serialized size in bytes, filled in by the cache on insert.
    pub payload_size: u64,
    pub hit_count: u64,
    pub last_hit_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub expire_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(
        cache_key: impl Into<String>,
        fingerprint: impl Into<String>,
        input_content: impl Into<String>,
        kind: GenerationKind,
        result: ResultRef,
    ) -> Self {
        let now = Utc::now();
        Self {
            cache_key: cache_key.into(),
            fingerprint: fingerprint.into(),
            input_content: input_content.into(),
            kind,
            tier: None,
            result,
            quality_score: None,
            payload_size: 0,
            hit_count: 0,
            last_hit_at: None,
            created_at: now,
            expire_at: now,
        }
    }

    pub fn with_tier(mut self, tier: Option<String>) -> Self {
        self.tier = tier;
        self
    }

    pub fn with_quality_score(mut self, score: f64) -> Self {
        self.quality_score = Some(score);
        self
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expire_at < now
    }

    /// Hot entries survive TTL expiry.
    pub fn is_hot(&self, hot_threshold: u64) -> bool {
        self.hit_count >= hot_threshold
    }

    /// Eligible for the expiry sweep.
    pub fn is_sweepable(&self, now: DateTime<Utc>, hot_threshold: u64) -> bool {
        self.is_expired(now) && !self.is_hot(hot_threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_hot_entries_are_not_sweepable() {
        let mut e = CacheEntry::new("k", "f", "A cube", GenerationKind::Text, ResultRef::new("u"));
        e.expire_at = Utc::now() - Duration::seconds(1);
        assert!(e.is_sweepable(Utc::now(), 5));
        e.hit_count = 5;
        assert!(e.is_expired(Utc::now()));
        assert!(!e.is_sweepable(Utc::now(), 5));
    }
}
