//! Generation task entity.

use super::{GenerationKind, GenerationRequest, QualityParams, TaskStatus};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Location of a generated asset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRef {
    pub asset_url: Option<String>,
    pub local_path: Option<String>,
    pub preview_url: Option<String>,
}

impl ResultRef {
    pub fn new(asset_url: impl Into<String>) -> Self {
        Self {
            asset_url: Some(asset_url.into()),
            local_path: None,
            preview_url: None,
        }
    }

    pub fn with_preview(mut self, url: impl Into<String>) -> Self {
        self.preview_url = Some(url.into());
        self
    }

    pub fn with_local_path(mut self, path: impl Into<String>) -> Self {
        self.local_path = Some(path.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.asset_url.is_none() && self.local_path.is_none()
    }
}

/// One generation request as recorded for audit.
///
/// Invariants kept by the transition methods:
/// - `completed_at` is set iff the status is terminal.
/// - `processing_time_ms == Some(0)` iff `from_cache` is true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationTask {
    pub task_id: String,
    pub user_id: String,
    pub kind: GenerationKind,
    pub input_content: String,
    /// Fingerprint of the normalized input.
    pub input_hash: String,
    /// Cache key this task reads from or writes to.
    pub cache_key: String,
    pub status: TaskStatus,
    pub result: ResultRef,
    pub external_job_id: Option<String>,
    pub provider: Option<String>,
    /// JSON-serialized [`crate::types::QualityParams`].
    pub generation_params: Option<String>,
    pub quality_score: Option<f64>,
    pub processing_time_ms: Option<u64>,
    pub error_message: Option<String>,
    pub from_cache: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl GenerationTask {
    /// Create a `PENDING` task for a request.
    pub fn new(
        request: &GenerationRequest,
        input_hash: impl Into<String>,
        cache_key: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        let generation_params = if request.params == QualityParams::default() {
            None
        } else {
            serde_json::to_string(&request.params).ok()
        };
        Self {
            task_id: uuid::Uuid::new_v4().to_string(),
            user_id: request.user_id.clone(),
            kind: request.kind,
            input_content: request.input.clone(),
            input_hash: input_hash.into(),
            cache_key: cache_key.into(),
            status: TaskStatus::Pending,
            result: ResultRef::default(),
            external_job_id: None,
            provider: None,
            generation_params,
            quality_score: None,
            processing_time_ms: None,
            error_message: None,
            from_cache: false,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    fn transition(&mut self, next: TaskStatus) -> Result<DateTime<Utc>> {
        if !self.status.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        let now = Utc::now();
        self.status = next;
        self.updated_at = now;
        if next.is_terminal() {
            self.completed_at = Some(now);
        }
        Ok(now)
    }

    // Never 0 for non-cached work so that 0 unambiguously means "served from cache".
    fn elapsed_ms(&self, now: DateTime<Utc>) -> u64 {
        (now - self.created_at).num_milliseconds().max(1) as u64
    }

    pub fn start_processing(&mut self, provider: &str) -> Result<()> {
        self.transition(TaskStatus::Processing)?;
        self.provider = Some(provider.to_string());
        Ok(())
    }

    pub fn complete(&mut self, result: ResultRef, external_job_id: Option<String>) -> Result<()> {
        let now = self.transition(TaskStatus::Completed)?;
        self.result = result;
        self.external_job_id = external_job_id;
        self.processing_time_ms = Some(self.elapsed_ms(now));
        Ok(())
    }

    pub fn fail(&mut self, detail: impl Into<String>) -> Result<()> {
        let now = self.transition(TaskStatus::Failed)?;
        self.error_message = Some(detail.into());
        self.processing_time_ms = Some(self.elapsed_ms(now));
        Ok(())
    }

    /// Serve the task from a cache entry; skips `PROCESSING`.
    pub fn mark_cached(&mut self, result: ResultRef, cache_key: impl Into<String>) -> Result<()> {
        self.transition(TaskStatus::Cached)?;
        self.result = result;
        self.cache_key = cache_key.into();
        self.from_cache = true;
        self.processing_time_ms = Some(0);
        Ok(())
    }

    /// Rebuild the request this task was created from.
    pub fn to_request(&self) -> GenerationRequest {
        let params = self
            .generation_params
            .as_deref()
            .and_then(|json| serde_json::from_str::<QualityParams>(json).ok())
            .unwrap_or_default();
        GenerationRequest {
            user_id: self.user_id.clone(),
            kind: self.kind,
            input: self.input_content.clone(),
            params,
        }
    }

    pub fn set_quality_score(&mut self, score: f64) {
        self.quality_score = Some(score);
        self.updated_at = Utc::now();
    }
}
