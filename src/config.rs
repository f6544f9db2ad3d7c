//! 配置模块：从 YAML 与环境变量加载缓存、相似度与供应商配置。
//!
//! # Configuration
//!
//! [`GeneratorConfig`] is deserialized from YAML with every field defaulted, then
//! overridden from `MODEL3D_*` environment variables. Credentials resolve from the
//! config file, then the OS keyring (service `model3d-forge`), then
//! `MODEL3D_SECRET_ID` / `MODEL3D_SECRET_KEY`.
//!
//! ```yaml
//! cache:
//!   ttl_secs: 2592000
//!   hot_threshold: 5
//! similarity:
//!   threshold: 0.85
//! provider:
//!   region: ap-guangzhou
//! ```

use crate::cache::CacheSettings;
use crate::provider::{Credentials, GatewaySettings, HunyuanSettings, SUPPORTED_FORMATS};
use crate::transport::TransportSettings;
use crate::{Error, ErrorContext, Result};
use keyring::Entry;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub const KEYRING_SERVICE: &str = "model3d-forge";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_secs: u64,
    pub hot_threshold: u64,
    pub max_entries: usize,
    pub cleanup_threshold: f64,
    pub cleanup_target: f64,
    pub max_entry_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let settings = CacheSettings::default();
        Self {
            enabled: settings.enabled,
            ttl_secs: settings.ttl.as_secs(),
            hot_threshold: settings.hot_threshold,
            max_entries: settings.max_entries,
            cleanup_threshold: settings.cleanup_threshold,
            cleanup_target: settings.cleanup_target,
            max_entry_size: settings.max_entry_size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityConfig {
    pub threshold: f64,
    pub max_candidates: usize,
    pub max_input_chars: usize,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            threshold: 0.85,
            max_candidates: 50,
            max_input_chars: 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub endpoint: String,
    /// Full URL override, e.g. a local mock server.
    pub url: Option<String>,
    pub region: String,
    pub secret_id: Option<String>,
    pub secret_key: Option<String>,
    pub timeout_secs: u64,
    pub job_deadline_secs: u64,
    pub poll_interval_secs: u64,
    pub max_poll_attempts: u32,
    pub max_prompt_chars: usize,
    pub default_result_format: String,
    pub proxy_url: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        let provider = HunyuanSettings::default();
        let gateway = GatewaySettings::default();
        Self {
            endpoint: provider.endpoint,
            url: None,
            region: provider.region,
            secret_id: None,
            secret_key: None,
            timeout_secs: gateway.request_timeout.as_secs(),
            job_deadline_secs: gateway.job_deadline.as_secs(),
            poll_interval_secs: gateway.poll_interval.as_secs(),
            max_poll_attempts: gateway.max_poll_attempts,
            max_prompt_chars: gateway.max_prompt_chars,
            default_result_format: gateway.default_result_format,
            proxy_url: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub cache: CacheConfig,
    pub similarity: SimilarityConfig,
    pub provider: ProviderConfig,
}

fn config_error(field: &str, message: impl Into<String>) -> Error {
    Error::configuration_with_context(
        message,
        ErrorContext::new()
            .with_field_path(field)
            .with_source("config_loader"),
    )
}

fn parsed<T: FromStr>(lookup: &dyn Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    lookup(name).and_then(|s| s.trim().parse::<T>().ok())
}

impl GeneratorConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| config_error("<root>", format!("invalid YAML: {}", e)))
    }

    /// Read a YAML file and apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Ok(Self::from_yaml_str(&text)?.with_env_overrides())
    }

    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(&|name: &str| std::env::var(name).ok())
    }

    /// Apply `MODEL3D_*` overrides from `lookup`; unparsable values are ignored.
    pub fn with_overrides(mut self, lookup: &dyn Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = parsed(lookup, "MODEL3D_CACHE_TTL_SECS").filter(|v: &u64| *v > 0) {
            self.cache.ttl_secs = v;
        }
        if let Some(v) = parsed(lookup, "MODEL3D_CACHE_HOT_THRESHOLD") {
            self.cache.hot_threshold = v;
        }
        if let Some(v) = parsed(lookup, "MODEL3D_CACHE_MAX_ENTRIES").filter(|v: &usize| *v > 0) {
            self.cache.max_entries = v;
        }
        if let Some(v) = parsed(lookup, "MODEL3D_SIMILARITY_THRESHOLD")
            .filter(|v: &f64| (0.0..=1.0).contains(v))
        {
            self.similarity.threshold = v;
        }
        if let Some(v) = lookup("MODEL3D_PROVIDER_ENDPOINT").filter(|v| !v.trim().is_empty()) {
            self.provider.endpoint = v.trim().to_string();
        }
        if let Some(v) = lookup("MODEL3D_PROVIDER_REGION").filter(|v| !v.trim().is_empty()) {
            self.provider.region = v.trim().to_string();
        }
        if let Some(v) = parsed(lookup, "MODEL3D_HTTP_TIMEOUT_SECS").filter(|v: &u64| *v > 0) {
            self.provider.timeout_secs = v;
        }
        if let Some(v) = lookup("MODEL3D_PROXY_URL").filter(|v| !v.trim().is_empty()) {
            self.provider.proxy_url = Some(v);
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        let unit = 0.0..=1.0;
        if !unit.contains(&self.similarity.threshold) {
            return Err(config_error("similarity.threshold", "must be within [0, 1]"));
        }
        if !unit.contains(&self.cache.cleanup_threshold) || !unit.contains(&self.cache.cleanup_target) {
            return Err(config_error("cache.cleanup_threshold", "cleanup ratios must be within [0, 1]"));
        }
        if self.cache.cleanup_target > self.cache.cleanup_threshold {
            return Err(config_error(
                "cache.cleanup_target",
                "cleanup target must not exceed the cleanup threshold",
            ));
        }
        if self.cache.ttl_secs == 0 {
            return Err(config_error("cache.ttl_secs", "TTL must be positive"));
        }
        if self.cache.max_entries == 0 {
            return Err(config_error("cache.max_entries", "capacity must be positive"));
        }
        if self.provider.endpoint.trim().is_empty() {
            return Err(config_error("provider.endpoint", "endpoint must not be empty"));
        }
        if self.provider.timeout_secs == 0 || self.provider.job_deadline_secs == 0 {
            return Err(config_error("provider.timeout_secs", "timeouts must be positive"));
        }
        if self.provider.max_prompt_chars == 0 {
            return Err(config_error("provider.max_prompt_chars", "must be positive"));
        }
        let format = self.provider.default_result_format.to_uppercase();
        if !SUPPORTED_FORMATS.contains(&format.as_str()) {
            return Err(config_error(
                "provider.default_result_format",
                format!("unsupported format {}", self.provider.default_result_format),
            ));
        }
        Ok(())
    }

    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            enabled: self.cache.enabled,
            ttl: Duration::from_secs(self.cache.ttl_secs),
            hot_threshold: self.cache.hot_threshold,
            similarity_threshold: self.similarity.threshold,
            max_similar_candidates: self.similarity.max_candidates,
            max_similarity_input_chars: self.similarity.max_input_chars,
            max_entries: self.cache.max_entries,
            cleanup_threshold: self.cache.cleanup_threshold,
            cleanup_target: self.cache.cleanup_target,
            max_entry_size: self.cache.max_entry_size,
        }
    }

    pub fn gateway_settings(&self) -> GatewaySettings {
        GatewaySettings {
            request_timeout: Duration::from_secs(self.provider.timeout_secs),
            job_deadline: Duration::from_secs(self.provider.job_deadline_secs),
            poll_interval: Duration::from_secs(self.provider.poll_interval_secs),
            max_poll_attempts: self.provider.max_poll_attempts,
            max_prompt_chars: self.provider.max_prompt_chars,
            default_result_format: self.provider.default_result_format.to_uppercase(),
        }
    }

    pub fn hunyuan_settings(&self) -> HunyuanSettings {
        HunyuanSettings {
            endpoint: self.provider.endpoint.clone(),
            url: self.provider.url.clone(),
            region: self.provider.region.clone(),
            transport: TransportSettings {
                timeout: Duration::from_secs(self.provider.timeout_secs),
                proxy_url: self.provider.proxy_url.clone(),
                ..TransportSettings::default()
            },
        }
    }

    /// Resolve provider credentials: config, then keyring, then environment.
    pub fn credentials(&self) -> Result<Credentials> {
        let id = self
            .provider
            .secret_id
            .clone()
            .or_else(|| keyring_secret("secret_id"))
            .or_else(|| std::env::var("MODEL3D_SECRET_ID").ok())
            .filter(|v| !v.is_empty());
        let key = self
            .provider
            .secret_key
            .clone()
            .or_else(|| keyring_secret("secret_key"))
            .or_else(|| std::env::var("MODEL3D_SECRET_KEY").ok())
            .filter(|v| !v.is_empty());
        match (id, key) {
            (Some(id), Some(key)) => Ok(Credentials::new(id, key)),
            _ => Err(config_error(
                "provider.secret_id",
                "provider credentials not found in config, keyring or MODEL3D_SECRET_ID/MODEL3D_SECRET_KEY",
            )),
        }
    }

    /// Copy safe to print: secrets replaced.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        let mask = |v: &Option<String>| v.as_ref().map(|_| "***".to_string());
        copy.provider.secret_id = mask(&copy.provider.secret_id);
        copy.provider.secret_key = mask(&copy.provider.secret_key);
        copy
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| config_error("<root>", e.to_string()))
    }
}

fn keyring_secret(user: &str) -> Option<String> {
    Entry::new(KEYRING_SERVICE, user)
        .ok()
        .and_then(|entry| entry.get_password().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = GeneratorConfig::default();
        config.validate().unwrap();
        assert_eq!(config.similarity.threshold, 0.85);
        assert_eq!(config.cache.hot_threshold, 5);
        assert_eq!(config.cache.ttl_secs, 30 * 24 * 3600);
        assert_eq!(config.provider.endpoint, "ai3d.tencentcloudapi.com");
        assert_eq!(config.gateway_settings().max_poll_attempts, 60);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = GeneratorConfig::from_yaml_str(
            "similarity:\n  threshold: 0.9\nprovider:\n  region: ap-guangzhou\n",
        )
        .unwrap();
        assert_eq!(config.similarity.threshold, 0.9);
        assert_eq!(config.similarity.max_candidates, 50);
        assert_eq!(config.provider.region, "ap-guangzhou");
        assert_eq!(config.cache, CacheConfig::default());
        assert_eq!(config.cache_settings().similarity_threshold, 0.9);
    }

    #[test]
    fn test_overrides_ignore_bad_values() {
        let vars: HashMap<&str, &str> = [
            ("MODEL3D_CACHE_TTL_SECS", "60"),
            ("MODEL3D_SIMILARITY_THRESHOLD", "1.5"),
            ("MODEL3D_CACHE_HOT_THRESHOLD", "many"),
            ("MODEL3D_PROVIDER_REGION", "ap-shanghai"),
        ]
        .into_iter()
        .collect();
        let config = GeneratorConfig::default()
            .with_overrides(&|name: &str| vars.get(name).map(|v| v.to_string()));
        assert_eq!(config.cache.ttl_secs, 60);
        assert_eq!(config.similarity.threshold, 0.85);
        assert_eq!(config.cache.hot_threshold, 5);
        assert_eq!(config.provider.region, "ap-shanghai");
    }

    #[test]
    fn test_validate_rejects_inconsistent_values() {
        let mut config = GeneratorConfig::default();
        config.cache.cleanup_target = 0.9;
        let err = config.validate().unwrap_err();
        assert_eq!(
            err.context().and_then(|c| c.field_path.as_deref()),
            Some("cache.cleanup_target")
        );

        let mut config = GeneratorConfig::default();
        config.provider.default_result_format = "ply".into();
        assert!(config.validate().is_err());

        let mut config = GeneratorConfig::default();
        config.similarity.threshold = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_explicit_credentials_win_and_are_redacted() {
        let mut config = GeneratorConfig::default();
        config.provider.secret_id = Some("AKID".into());
        config.provider.secret_key = Some("secret".into());
        assert_eq!(config.credentials().unwrap().access_id, "AKID");
        let redacted = config.redacted();
        assert_eq!(redacted.provider.secret_key.as_deref(), Some("***"));
        assert!(!redacted.to_yaml().unwrap().contains("secret\n"));
    }
}
