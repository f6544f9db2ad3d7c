//! Provider gateway: validation, deadlines and error mapping around a provider.

use super::{GenerationProvider, JobStatus, ProviderRequest, SubmittedJob};
use crate::types::{GenerationRequest, ResultRef, DEFAULT_RESULT_FORMAT};
use crate::{Error, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct GatewaySettings {
    /// Deadline for a single submit or poll call.
    pub request_timeout: Duration,
    /// Deadline for a whole submit-and-poll execution.
    pub job_deadline: Duration,
    pub poll_interval: Duration,
    pub max_poll_attempts: u32,
    pub max_prompt_chars: usize,
    pub default_result_format: String,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            job_deadline: Duration::from_secs(300),
            poll_interval: Duration::from_secs(5),
            max_poll_attempts: 60,
            max_prompt_chars: 1024,
            default_result_format: DEFAULT_RESULT_FORMAT.to_string(),
        }
    }
}

impl GatewaySettings {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_max_poll_attempts(mut self, attempts: u32) -> Self {
        self.max_poll_attempts = attempts;
        self
    }

    pub fn with_job_deadline(mut self, deadline: Duration) -> Self {
        self.job_deadline = deadline;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// A finished provider job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    pub provider: String,
    pub external_job_id: String,
    pub result: ResultRef,
}

pub struct ProviderGateway {
    provider: Arc<dyn GenerationProvider>,
    settings: GatewaySettings,
}

impl ProviderGateway {
    pub fn new(provider: Arc<dyn GenerationProvider>, settings: GatewaySettings) -> Self {
        Self { provider, settings }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    /// Map and validate a request without touching the network.
    pub fn prepare(&self, request: &GenerationRequest) -> Result<ProviderRequest> {
        let prepared = ProviderRequest::from_generation(request)
            .with_default_format(&self.settings.default_result_format);
        prepared.validate(self.settings.max_prompt_chars)?;
        Ok(prepared)
    }

    pub async fn submit(
        &self,
        request: &GenerationRequest,
        deadline: Option<Duration>,
    ) -> Result<SubmittedJob> {
        let prepared = self.prepare(request)?;
        let deadline = deadline.unwrap_or(self.settings.request_timeout);
        self.guarded("submit", deadline, self.provider.submit(&prepared))
            .await
    }

    pub async fn poll(&self, external_job_id: &str, deadline: Option<Duration>) -> Result<JobStatus> {
        let deadline = deadline.unwrap_or(self.settings.request_timeout);
        self.guarded("poll", deadline, self.provider.poll(external_job_id))
            .await
    }

    /// Submit, then poll until the job finishes, fails, runs out of attempts or
    /// passes the deadline. Every failure is a provider failure.
    pub async fn execute(
        &self,
        request: &GenerationRequest,
        deadline: Option<Duration>,
    ) -> Result<JobOutcome> {
        let prepared = self.prepare(request)?;
        let deadline = deadline.unwrap_or(self.settings.job_deadline);
        let started = Instant::now();
        let outcome = self
            .guarded("execute", deadline, self.run_job(&prepared))
            .await;
        match &outcome {
            Ok(done) => tracing::info!(
                provider = self.provider.name(),
                job_id = %done.external_job_id,
                duration_ms = started.elapsed().as_millis() as u64,
                "provider job completed"
            ),
            Err(e) => tracing::warn!(
                provider = self.provider.name(),
                duration_ms = started.elapsed().as_millis() as u64,
                error = %e,
                "provider job failed"
            ),
        }
        outcome
    }

    async fn run_job(&self, prepared: &ProviderRequest) -> Result<JobOutcome> {
        let submitted = self.provider.submit(prepared).await?;
        let job_id = submitted.external_job_id;
        let mut status = submitted.status;
        let mut attempts = 0u32;
        loop {
            match status {
                JobStatus::Done(result) => {
                    return Ok(JobOutcome {
                        provider: self.provider.name().to_string(),
                        external_job_id: job_id,
                        result,
                    })
                }
                JobStatus::Failed { code, message } => {
                    let code = code.unwrap_or_else(|| "JobFailed".to_string());
                    return Err(Error::provider_with_code(self.provider.name(), code, message));
                }
                JobStatus::Waiting | JobStatus::Running => {}
            }
            if attempts >= self.settings.max_poll_attempts {
                return Err(Error::provider_with_code(
                    self.provider.name(),
                    "PollAttemptsExhausted",
                    format!("job {} unfinished after {} polls", job_id, attempts),
                ));
            }
            tokio::time::sleep(self.settings.poll_interval).await;
            attempts += 1;
            status = self
                .guarded("poll", self.settings.request_timeout, self.provider.poll(&job_id))
                .await?;
        }
    }

    /// Apply a deadline and fold every non-validation error into `Error::Provider`.
    async fn guarded<T, F>(&self, op: &str, deadline: Duration, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let name = self.provider.name();
        match tokio::time::timeout(deadline, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) if e.is_validation() => Err(e),
            Ok(Err(e @ Error::Provider { .. })) => Err(e),
            Ok(Err(e)) => Err(Error::provider(name, e.to_string())),
            Err(_) => Err(Error::provider_with_code(
                name,
                "DeadlineExceeded",
                format!("{} exceeded deadline of {} ms", op, deadline.as_millis()),
            )),
        }
    }

    pub async fn health_check(&self) -> bool {
        tokio::time::timeout(self.settings.request_timeout, self.provider.health_check())
            .await
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replays scripted poll statuses.
    struct Scripted {
        submits: AtomicUsize,
        polls: Mutex<Vec<JobStatus>>,
        submit_delay: Duration,
    }

    impl Scripted {
        fn new(polls: Vec<JobStatus>) -> Self {
            Self {
                submits: AtomicUsize::new(0),
                polls: Mutex::new(polls),
                submit_delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl GenerationProvider for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }
        async fn submit(&self, _: &ProviderRequest) -> Result<SubmittedJob> {
            self.submits.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.submit_delay).await;
            Ok(SubmittedJob {
                external_job_id: "job-1".into(),
                status: JobStatus::Waiting,
            })
        }
        async fn poll(&self, _: &str) -> Result<JobStatus> {
            let mut polls = self.polls.lock().unwrap();
            if polls.is_empty() {
                Ok(JobStatus::Running)
            } else {
                Ok(polls.remove(0))
            }
        }
        async fn health_check(&self) -> bool {
            true
        }
    }

    fn settings() -> GatewaySettings {
        GatewaySettings::default()
            .with_poll_interval(Duration::from_millis(1))
            .with_max_poll_attempts(5)
    }

    #[tokio::test]
    async fn test_validation_happens_before_network() {
        let provider = Arc::new(Scripted::new(vec![]));
        let gateway = ProviderGateway::new(provider.clone(), settings());
        let err = gateway
            .execute(&GenerationRequest::text("u", "x".repeat(1025)), None)
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(provider.submits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_execute_polls_until_done() {
        let provider = Arc::new(Scripted::new(vec![
            JobStatus::Waiting,
            JobStatus::Running,
            JobStatus::Done(ResultRef::new("https://cdn/cube.obj")),
        ]));
        let gateway = ProviderGateway::new(provider, settings());
        let outcome = gateway
            .execute(&GenerationRequest::text("u", "A cube"), None)
            .await
            .unwrap();
        assert_eq!(outcome.external_job_id, "job-1");
        assert_eq!(outcome.result.asset_url.as_deref(), Some("https://cdn/cube.obj"));
    }

    #[tokio::test]
    async fn test_job_failure_keeps_provider_code() {
        let provider = Arc::new(Scripted::new(vec![JobStatus::Failed {
            code: Some("InvalidPrompt".into()),
            message: "rejected".into(),
        }]));
        let gateway = ProviderGateway::new(provider, settings());
        match gateway.execute(&GenerationRequest::text("u", "A cube"), None).await {
            Err(Error::Provider { code, message, .. }) => {
                assert_eq!(code.as_deref(), Some("InvalidPrompt"));
                assert_eq!(message, "rejected");
            }
            other => panic!("expected provider failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_poll_attempts_are_bounded() {
        let gateway = ProviderGateway::new(Arc::new(Scripted::new(vec![])), settings());
        let err = gateway
            .execute(&GenerationRequest::text("u", "A cube"), None)
            .await
            .unwrap_err();
        assert!(err.is_provider_failure());
        assert!(err.to_string().contains("after 5 polls"));
    }

    #[tokio::test]
    async fn test_deadline_surfaces_as_provider_failure() {
        let mut slow = Scripted::new(vec![]);
        slow.submit_delay = Duration::from_secs(5);
        let gateway = ProviderGateway::new(Arc::new(slow), settings());
        let err = gateway
            .submit(
                &GenerationRequest::text("u", "A cube"),
                Some(Duration::from_millis(20)),
            )
            .await
            .unwrap_err();
        match err {
            Error::Provider { code, .. } => assert_eq!(code.as_deref(), Some("DeadlineExceeded")),
            other => panic!("expected provider failure, got {:?}", other),
        }
    }
}
