use crate::Result;
use std::env;
use std::time::Duration;
use reqwest::Proxy;

/// Connection settings for [`HttpTransport`]; environment variables take precedence.
#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub timeout: Duration,
    pub proxy_url: Option<String>,
    pub pool_max_idle_per_host: usize,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            proxy_url: None,
            pool_max_idle_per_host: 8,
        }
    }
}

/// JSON-over-HTTPS client for provider APIs.
///
/// Bodies are sent byte-for-byte as given so that request signatures computed over
/// them stay valid.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, settings: &TransportSettings) -> Result<Self> {
        let timeout_secs = env::var("MODEL3D_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
            .unwrap_or(settings.timeout);

        let mut builder = reqwest::Client::builder()
            .timeout(timeout_secs)
            .pool_max_idle_per_host(settings.pool_max_idle_per_host)
            .pool_idle_timeout(Some(Duration::from_secs(90)));

        let proxy_url = env::var("MODEL3D_PROXY_URL")
            .ok()
            .or_else(|| settings.proxy_url.clone());
        if let Some(proxy_url) = proxy_url {
            match Proxy::all(&proxy_url) {
                Ok(proxy) => builder = builder.proxy(proxy),
                Err(e) => tracing::warn!(proxy = %proxy_url, error = %e, "ignoring invalid proxy url"),
            }
        }

        let client = builder
            .build()
            .map_err(|e| crate::Error::Transport(TransportError::Other(e.to_string())))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST `body` to the base URL with the given headers and decode the JSON reply.
    ///
    /// Non-2xx replies that still carry JSON are returned as-is so that callers can
    /// read provider error envelopes.
    pub async fn post_json(
        &self,
        headers: &[(String, String)],
        body: String,
    ) -> Result<serde_json::Value> {
        let mut request = self.client.post(&self.base_url).body(body);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| crate::Error::Transport(TransportError::Http(e)))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| crate::Error::Transport(TransportError::Http(e)))?;

        match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(json) => Ok(json),
            Err(_) if !status.is_success() => Err(crate::Error::Transport(TransportError::Status {
                status: status.as_u16(),
                body: truncate(&text, 512),
            })),
            Err(e) => Err(e.into()),
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Transport error: {0}")]
    Other(String),
}
