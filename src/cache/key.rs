//! Cache key generation.

use crate::types::{GenerationKind, QualityParams, DEFAULT_RESULT_FORMAT};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Namespace tag prefixed to every cache key.
pub const CACHE_KEY_PREFIX: &str = "3d_model_cache:";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// Full namespaced key, e.g. `3d_model_cache:<md5 hex>`.
    pub key: String,
    /// md5 hex of `normalized_input:KIND`, independent of quality parameters.
    pub fingerprint: String,
    /// Quality tier folded into `key`; `None` for default parameters.
    #[serde(default)]
    pub tier: Option<String>,
    /// True when the input could not be fingerprinted; such a key never matches.
    pub degraded: bool,
}

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.key
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key)
    }
}

/// Derives deterministic cache keys from normalized input, kind and quality tier.
#[derive(Debug, Clone)]
pub struct CacheKeyer {
    prefix: String,
    default_format: String,
}

impl CacheKeyer {
    pub fn new() -> Self {
        Self {
            prefix: CACHE_KEY_PREFIX.to_string(),
            default_format: DEFAULT_RESULT_FORMAT.to_string(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Output format the provider fills in when none is requested. Requests naming
    /// it explicitly share the default tier.
    pub fn with_default_format(mut self, format: impl Into<String>) -> Self {
        self.default_format = format.into();
        self
    }

    pub fn tier(&self, params: &QualityParams) -> Option<String> {
        params.tier_for(&self.default_format)
    }

    pub fn normalize(input: &str) -> &str {
        input.trim()
    }

    pub fn fingerprint(input: &str, kind: GenerationKind) -> Option<String> {
        let normalized = Self::normalize(input);
        if normalized.is_empty() {
            return None;
        }
        Some(md5_hex(&format!("{}:{}", normalized, kind.as_str())))
    }

    /// Key for `(input, kind, params)`. Empty input yields a timestamp-qualified key
    /// that cannot collide with any stored entry.
    pub fn key(&self, input: &str, kind: GenerationKind, params: &QualityParams) -> CacheKey {
        let Some(fingerprint) = Self::fingerprint(input, kind) else {
            return self.degraded_key();
        };
        let tier = self.tier(params);
        let hash = match &tier {
            None => fingerprint.clone(),
            Some(tier) => md5_hex(&format!(
                "{}:{}:{}",
                Self::normalize(input),
                kind.as_str(),
                tier
            )),
        };
        CacheKey {
            key: format!("{}{}", self.prefix, hash),
            fingerprint,
            tier,
            degraded: false,
        }
    }

    fn degraded_key(&self) -> CacheKey {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let nonce = uuid::Uuid::new_v4().simple().to_string();
        tracing::warn!("cannot fingerprint empty input, using a never-matching cache key");
        CacheKey {
            key: format!("{}error:{}:{}", self.prefix, millis, nonce),
            fingerprint: format!("error:{}", nonce),
            tier: None,
            degraded: true,
        }
    }
}

impl Default for CacheKeyer {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn md5_hex(input: &str) -> String {
    format!("{:x}", md5::compute(input.as_bytes()))
}
