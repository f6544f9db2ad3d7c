//! Generation request value types.

use super::GenerationKind;
use serde::{Deserialize, Serialize};

/// Output format the provider produces when none is requested.
pub const DEFAULT_RESULT_FORMAT: &str = "OBJ";

/// Parameters that change the produced asset and therefore partition the cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityParams {
    /// Output format (`OBJ`, `GLB`, ...). `None` means the provider default.
    pub result_format: Option<String>,
    /// Physically-based rendering materials.
    pub enable_pbr: Option<bool>,
}

impl QualityParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_result_format(mut self, format: impl Into<String>) -> Self {
        self.result_format = Some(format.into());
        self
    }

    pub fn with_pbr(mut self, enable: bool) -> Self {
        self.enable_pbr = Some(enable);
        self
    }

    /// Quality tier tag folded into the cache key, `None` for default parameters.
    pub fn tier(&self) -> Option<String> {
        self.tier_for(DEFAULT_RESULT_FORMAT)
    }

    /// Like [`QualityParams::tier`], treating `default_format` as "no format requested".
    pub fn tier_for(&self, default_format: &str) -> Option<String> {
        let default_format = default_format.trim().to_uppercase();
        let format = self
            .result_format
            .as_deref()
            .map(|f| f.trim().to_uppercase())
            .filter(|f| !f.is_empty() && *f != default_format);
        match (format, self.enable_pbr) {
            (None, None) => None,
            (format, pbr) => Some(format!(
                "{}:{}",
                format.unwrap_or_else(|| "DEFAULT".to_string()),
                match pbr {
                    Some(true) => "pbr",
                    Some(false) => "nopbr",
                    None => "default",
                }
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub user_id: String,
    pub kind: GenerationKind,
    /// Prompt text for `TEXT`, image URL or base64 payload for `IMAGE`.
    pub input: String,
    #[serde(default)]
    pub params: QualityParams,
}

impl GenerationRequest {
    pub fn text(user_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            kind: GenerationKind::Text,
            input: prompt.into(),
            params: QualityParams::default(),
        }
    }

    pub fn image(user_id: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            kind: GenerationKind::Image,
            input: image.into(),
            params: QualityParams::default(),
        }
    }

    pub fn with_params(mut self, params: QualityParams) -> Self {
        self.params = params;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params_have_no_tier() {
        assert_eq!(QualityParams::default().tier(), None);
        assert_eq!(QualityParams::new().with_result_format("  ").tier(), None);
    }

    #[test]
    fn test_tier_normalizes_format_case() {
        let a = QualityParams::new().with_result_format("glb").with_pbr(true);
        let b = QualityParams::new().with_result_format("GLB").with_pbr(true);
        assert_eq!(a.tier(), b.tier());
        assert_eq!(a.tier().as_deref(), Some("GLB:pbr"));
        assert_eq!(
            QualityParams::new().with_pbr(false).tier().as_deref(),
            Some("DEFAULT:nopbr")
        );
    }

    #[test]
    fn test_default_format_is_the_default_tier() {
        assert_eq!(QualityParams::new().with_result_format("OBJ").tier(), None);
        assert_eq!(QualityParams::new().with_result_format(" obj ").tier(), None);
        assert_eq!(
            QualityParams::new().with_result_format("OBJ").with_pbr(true).tier(),
            QualityParams::new().with_pbr(true).tier()
        );
        // A deployment defaulting to GLB keys plain GLB requests as default.
        let glb = QualityParams::new().with_result_format("GLB");
        assert_eq!(glb.tier_for("GLB"), None);
        assert_eq!(
            QualityParams::new().with_result_format("OBJ").tier_for("GLB").as_deref(),
            Some("OBJ:default")
        );
    }
}
