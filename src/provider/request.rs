//! Provider-facing job request and its preconditions.

use crate::types::{GenerationKind, GenerationRequest};
use crate::{Error, ErrorContext, Result};
use base64::Engine;
use serde::Serialize;

/// Output formats the provider can produce.
pub const SUPPORTED_FORMATS: [&str; 6] = ["OBJ", "GLB", "STL", "USDZ", "FBX", "MP4"];

/// Largest decoded image the provider accepts.
pub const MAX_IMAGE_BYTES: usize = 8 * 1024 * 1024;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProviderRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_base64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_format: Option<String>,
    #[serde(rename = "EnablePBR", skip_serializing_if = "Option::is_none")]
    pub enable_pbr: Option<bool>,
}

impl ProviderRequest {
    /// Map a generation request. Image input is routed by shape: `http(s)://` is a URL,
    /// anything else is base64 (a `data:` URI header is stripped).
    pub fn from_generation(request: &GenerationRequest) -> Self {
        let input = request.input.trim();
        let mut out = Self {
            result_format: request
                .params
                .result_format
                .as_deref()
                .map(|f| f.trim().to_uppercase())
                .filter(|f| !f.is_empty()),
            enable_pbr: request.params.enable_pbr,
            ..Default::default()
        };
        match request.kind {
            GenerationKind::Text => out.prompt = Some(input.to_string()),
            GenerationKind::Image if is_http_url(input) => out.image_url = Some(input.to_string()),
            GenerationKind::Image => out.image_base64 = Some(strip_data_uri(input).to_string()),
        }
        out
    }

    pub fn with_default_format(mut self, format: &str) -> Self {
        if self.result_format.is_none() && !format.is_empty() {
            self.result_format = Some(format.to_uppercase());
        }
        self
    }

    /// Fail fast on anything the provider would reject; runs before any network call.
    pub fn validate(&self, max_prompt_chars: usize) -> Result<()> {
        let prompt = non_blank(&self.prompt);
        let image_url = non_blank(&self.image_url);
        let image_base64 = non_blank(&self.image_base64);

        let supplied = [prompt.is_some(), image_url.is_some(), image_base64.is_some()]
            .iter()
            .filter(|s| **s)
            .count();
        if supplied != 1 {
            return Err(invalid(
                "request.input",
                format!("exactly one of prompt, image URL or image data is required, got {}", supplied),
            ));
        }

        if let Some(prompt) = prompt {
            let chars = prompt.chars().count();
            if chars > max_prompt_chars {
                return Err(invalid(
                    "request.prompt",
                    format!("prompt has {} characters, at most {} allowed", chars, max_prompt_chars),
                ));
            }
        }

        if let Some(image_url) = image_url {
            let parsed = url::Url::parse(image_url)
                .map_err(|e| invalid("request.image_url", format!("invalid image URL: {}", e)))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(invalid("request.image_url", "image URL must be http or https"));
            }
        }

        if let Some(data) = image_base64 {
            let decoded = base64::engine::general_purpose::STANDARD
                .decode(data)
                .map_err(|e| invalid("request.image_base64", format!("image data is not base64: {}", e)))?;
            if decoded.len() > MAX_IMAGE_BYTES {
                return Err(invalid(
                    "request.image_base64",
                    format!("image is {} bytes, at most {} allowed", decoded.len(), MAX_IMAGE_BYTES),
                ));
            }
        }

        if let Some(format) = &self.result_format {
            if !SUPPORTED_FORMATS.contains(&format.to_uppercase().as_str()) {
                return Err(invalid(
                    "request.result_format",
                    format!("unsupported result format {}, expected one of {}", format, SUPPORTED_FORMATS.join(", ")),
                ));
            }
        }
        Ok(())
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn is_http_url(input: &str) -> bool {
    let lower = input.get(..8).unwrap_or(input).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn strip_data_uri(input: &str) -> &str {
    match (input.starts_with("data:"), input.find(";base64,")) {
        (true, Some(pos)) => &input[pos + ";base64,".len()..],
        _ => input,
    }
}

fn invalid(field: &str, message: impl Into<String>) -> Error {
    Error::validation_with_context(
        message,
        ErrorContext::new()
            .with_field_path(field)
            .with_source("provider_request"),
    )
}
