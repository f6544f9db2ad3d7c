//! Tencent Hunyuan 3D provider.

use super::signer::{Credentials, ProviderSigner, SigningInput, SigningProfile};
use super::{GenerationProvider, JobStatus, ProviderRequest, SubmittedJob};
use crate::transport::{HttpTransport, TransportSettings};
use crate::types::ResultRef;
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;

pub const DEFAULT_ENDPOINT: &str = "ai3d.tencentcloudapi.com";
pub const SUBMIT_ACTION: &str = "SubmitHunyuanTo3DJob";
pub const QUERY_ACTION: &str = "QueryHunyuanTo3DJob";

const PROVIDER_NAME: &str = "hunyuan";
/// Job id used by health checks; the service answers with a not-found style error.
const HEALTH_CHECK_JOB_ID: &str = "health-check";

#[derive(Debug, Clone)]
pub struct HunyuanSettings {
    /// Host used in the `Host` header and the signature.
    pub endpoint: String,
    /// Full URL to post to; defaults to `https://{endpoint}`.
    pub url: Option<String>,
    pub region: String,
    pub transport: TransportSettings,
}

impl Default for HunyuanSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            url: None,
            region: "ap-beijing".to_string(),
            transport: TransportSettings::default(),
        }
    }
}

impl HunyuanSettings {
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(rename = "Code")]
    code: String,
    #[serde(rename = "Message", default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SubmitBody {
    job_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct QueryBody {
    #[serde(default)]
    status: String,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default, rename = "ResultFile3Ds")]
    result_files: Vec<ResultFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ResultFile {
    #[serde(rename = "Type", default)]
    file_type: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    preview_image_url: Option<String>,
}

pub struct HunyuanProvider {
    signer: ProviderSigner,
    transport: HttpTransport,
    settings: HunyuanSettings,
}

impl HunyuanProvider {
    pub fn new(credentials: Credentials, settings: HunyuanSettings) -> Result<Self> {
        let url = settings
            .url
            .clone()
            .unwrap_or_else(|| format!("https://{}", settings.endpoint));
        let transport = HttpTransport::new(url, &settings.transport)?;
        Ok(Self {
            signer: ProviderSigner::new(SigningProfile::hunyuan(), credentials),
            transport,
            settings,
        })
    }

    /// Sign and post one API action, returning the `Response` object.
    async fn call(&self, action: &str, body: String) -> Result<serde_json::Value> {
        let signed = self.signer.sign(&SigningInput {
            host: &self.settings.endpoint,
            action,
            region: Some(&self.settings.region),
            body: &body,
            timestamp: Utc::now().timestamp(),
        })?;
        let mut json = self.transport.post_json(&signed.headers, body).await?;
        let response = json
            .get_mut("Response")
            .map(serde_json::Value::take)
            .ok_or_else(|| Error::provider(PROVIDER_NAME, "reply has no Response object"))?;
        if let Some(error) = response.get("Error") {
            let error: ApiError = serde_json::from_value(error.clone())?;
            return Err(Error::provider_with_code(PROVIDER_NAME, error.code, error.message));
        }
        Ok(response)
    }
}

fn parse_status(body: QueryBody) -> JobStatus {
    match body.status.to_uppercase().as_str() {
        "WAIT" => JobStatus::Waiting,
        "RUN" => JobStatus::Running,
        "DONE" => {
            let asset = body
                .result_files
                .iter()
                .find(|f| f.url.as_deref().is_some_and(|u| !u.is_empty()));
            match asset {
                Some(file) => {
                    let mut result = ResultRef::default();
                    result.asset_url = file.url.clone();
                    result.preview_url = file.preview_image_url.clone().or_else(|| {
                        body.result_files
                            .iter()
                            .find_map(|f| f.preview_image_url.clone())
                    });
                    tracing::debug!(file_type = ?file.file_type, "job produced a result file");
                    JobStatus::Done(result)
                }
                None => JobStatus::Failed {
                    code: None,
                    message: "job finished without result files".to_string(),
                },
            }
        }
        "FAIL" => JobStatus::Failed {
            code: body.error_code.filter(|c| !c.is_empty()),
            message: body
                .error_message
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| "job failed".to_string()),
        },
        other => JobStatus::Failed {
            code: None,
            message: format!("unknown job status {:?}", other),
        },
    }
}

#[async_trait]
impl GenerationProvider for HunyuanProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn submit(&self, request: &ProviderRequest) -> Result<SubmittedJob> {
        let body = serde_json::to_string(request)?;
        let response = self.call(SUBMIT_ACTION, body).await?;
        let job_id = serde_json::from_value::<SubmitBody>(response)?
            .job_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::provider(PROVIDER_NAME, "submit reply has no JobId"))?;
        tracing::info!(provider = PROVIDER_NAME, job_id = %job_id, "job submitted");
        Ok(SubmittedJob {
            external_job_id: job_id,
            status: JobStatus::Waiting,
        })
    }

    async fn poll(&self, external_job_id: &str) -> Result<JobStatus> {
        let body = serde_json::json!({ "JobId": external_job_id }).to_string();
        let response = self.call(QUERY_ACTION, body).await?;
        let status = parse_status(serde_json::from_value(response)?);
        tracing::debug!(provider = PROVIDER_NAME, job_id = external_job_id, status = status.as_str(), "job polled");
        Ok(status)
    }

    async fn health_check(&self) -> bool {
        match self.poll(HEALTH_CHECK_JOB_ID).await {
            Ok(_) => true,
            Err(Error::Provider { code: Some(code), .. }) => {
                let healthy = !code.starts_with("AuthFailure");
                if !healthy {
                    tracing::warn!(provider = PROVIDER_NAME, code = %code, "health check rejected");
                }
                healthy
            }
            Err(e) => {
                tracing::warn!(provider = PROVIDER_NAME, error = %e, "health check failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(json: serde_json::Value) -> JobStatus {
        parse_status(serde_json::from_value(json).unwrap())
    }

    #[test]
    fn test_parse_done_picks_first_file_with_url() {
        let status = query(serde_json::json!({
            "Status": "DONE",
            "ResultFile3Ds": [
                {"Type": "GIF", "Url": ""},
                {"Type": "OBJ", "Url": "https://cdn/cube.obj"},
                {"Type": "IMAGE", "PreviewImageUrl": "https://cdn/cube.png"}
            ],
            "RequestId": "r-1"
        }));
        assert_eq!(
            status,
            JobStatus::Done(ResultRef::new("https://cdn/cube.obj").with_preview("https://cdn/cube.png"))
        );
    }

    #[test]
    fn test_parse_states() {
        assert_eq!(query(serde_json::json!({"Status": "WAIT"})), JobStatus::Waiting);
        assert_eq!(query(serde_json::json!({"Status": "run"})), JobStatus::Running);
        assert_eq!(
            query(serde_json::json!({"Status": "FAIL", "ErrorCode": "InvalidPrompt", "ErrorMessage": "bad"})),
            JobStatus::Failed {
                code: Some("InvalidPrompt".into()),
                message: "bad".into()
            }
        );
        assert!(matches!(
            query(serde_json::json!({"Status": "DONE", "ResultFile3Ds": []})),
            JobStatus::Failed { code: None, .. }
        ));
    }
}
