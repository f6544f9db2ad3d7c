//! 供应商模块：请求签名、参数校验以及 3D 生成任务的提交与轮询。
//!
//! # Provider Module
//!
//! Everything that talks to the external generation service lives here. The
//! [`ProviderGateway`] is the only component in the crate that performs network I/O.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`ProviderSigner`] | Chained-key HMAC-SHA256 request signatures |
//! | [`ProviderRequest`] | Job body plus fail-fast validation |
//! | [`GenerationProvider`] | Trait implemented per provider |
//! | [`HunyuanProvider`] | Tencent Hunyuan 3D implementation |
//! | [`ProviderGateway`] | Deadlines, error mapping and submit-then-poll execution |
//!
//! Adding a provider means implementing [`GenerationProvider`] and, if it signs
//! requests the same way, supplying a [`SigningProfile`].

mod gateway;
mod hunyuan;
mod request;
mod signer;

pub use gateway::{GatewaySettings, JobOutcome, ProviderGateway};
pub use hunyuan::{HunyuanProvider, HunyuanSettings, DEFAULT_ENDPOINT, QUERY_ACTION, SUBMIT_ACTION};
pub use request::{ProviderRequest, MAX_IMAGE_BYTES, SUPPORTED_FORMATS};
pub use signer::{
    sha256_hex, utc_date, Credentials, ProviderSigner, SignedHeaders, SigningInput, SigningProfile,
    JSON_CONTENT_TYPE,
};

use crate::types::ResultRef;
use crate::Result;
use async_trait::async_trait;

/// Provider-side job state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Waiting,
    Running,
    Done(ResultRef),
    Failed {
        code: Option<String>,
        message: String,
    },
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done(_) | JobStatus::Failed { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Waiting => "WAIT",
            JobStatus::Running => "RUN",
            JobStatus::Done(_) => "DONE",
            JobStatus::Failed { .. } => "FAIL",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedJob {
    pub external_job_id: String,
    pub status: JobStatus,
}

#[async_trait]
pub trait GenerationProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn submit(&self, request: &ProviderRequest) -> Result<SubmittedJob>;

    async fn poll(&self, external_job_id: &str) -> Result<JobStatus>;

    /// Whether the provider is reachable and accepts our credentials.
    async fn health_check(&self) -> bool;
}
