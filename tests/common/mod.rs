//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use mockito::{Mock, Server, ServerGuard};
use model3d_forge::cache::{CacheSettings, ResultCache};
use model3d_forge::lifecycle::TaskLifecycle;
use model3d_forge::provider::{
    GatewaySettings, GenerationProvider, JobStatus, ProviderGateway, ProviderRequest,
    SubmittedJob,
};
use model3d_forge::store::{InMemoryTaskStore, TaskStore};
use model3d_forge::types::ResultRef;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// How a [`CountingProvider`] job ends.
#[derive(Debug, Clone)]
pub enum Finish {
    Done(String),
    Fail(String, String),
}

/// In-process provider that counts calls and finishes every job the same way.
pub struct CountingProvider {
    pub submits: AtomicUsize,
    pub polls: AtomicUsize,
    pub submit_delay: Duration,
    pub finish: Finish,
}

impl CountingProvider {
    pub fn done(asset_url: &str) -> Self {
        Self {
            submits: AtomicUsize::new(0),
            polls: AtomicUsize::new(0),
            submit_delay: Duration::ZERO,
            finish: Finish::Done(asset_url.to_string()),
        }
    }

    pub fn failing(code: &str, message: &str) -> Self {
        Self {
            finish: Finish::Fail(code.to_string(), message.to_string()),
            ..Self::done("")
        }
    }

    pub fn with_submit_delay(mut self, delay: Duration) -> Self {
        self.submit_delay = delay;
        self
    }

    pub fn submit_count(&self) -> usize {
        self.submits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationProvider for CountingProvider {
    fn name(&self) -> &str {
        "counting"
    }

    async fn submit(&self, _request: &ProviderRequest) -> model3d_forge::Result<SubmittedJob> {
        let n = self.submits.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.submit_delay.is_zero() {
            tokio::time::sleep(self.submit_delay).await;
        }
        Ok(SubmittedJob {
            external_job_id: format!("job-{}", n),
            status: JobStatus::Waiting,
        })
    }

    async fn poll(&self, _external_job_id: &str) -> model3d_forge::Result<JobStatus> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        Ok(match &self.finish {
            Finish::Done(url) => {
                JobStatus::Done(ResultRef::new(url.clone()).with_preview(format!("{}.png", url)))
            }
            Finish::Fail(code, message) => JobStatus::Failed {
                code: Some(code.clone()),
                message: message.clone(),
            },
        })
    }

    async fn health_check(&self) -> bool {
        true
    }
}

pub fn fast_gateway_settings() -> GatewaySettings {
    GatewaySettings::default()
        .with_poll_interval(Duration::from_millis(5))
        .with_max_poll_attempts(5)
        .with_job_deadline(Duration::from_secs(5))
}

/// Lifecycle wired to in-memory cache and store.
pub struct Harness {
    pub provider: Arc<CountingProvider>,
    pub store: Arc<InMemoryTaskStore>,
    pub cache: Arc<ResultCache>,
    pub lifecycle: Arc<TaskLifecycle>,
}

impl Harness {
    pub async fn new(provider: CountingProvider) -> Self {
        let store = Arc::new(InMemoryTaskStore::new());
        store.open().await.unwrap();
        Self::with_store(provider, store)
    }

    pub fn with_store(provider: CountingProvider, store: Arc<InMemoryTaskStore>) -> Self {
        Self::build(provider, store, CacheSettings::default())
    }

    pub async fn with_cache_settings(provider: CountingProvider, settings: CacheSettings) -> Self {
        let store = Arc::new(InMemoryTaskStore::new());
        store.open().await.unwrap();
        Self::build(provider, store, settings)
    }

    fn build(
        provider: CountingProvider,
        store: Arc<InMemoryTaskStore>,
        settings: CacheSettings,
    ) -> Self {
        let provider = Arc::new(provider);
        let cache = Arc::new(ResultCache::in_memory(settings));
        let gateway = ProviderGateway::new(provider.clone(), fast_gateway_settings());
        let lifecycle = Arc::new(TaskLifecycle::new(
            cache.clone(),
            Arc::new(gateway),
            store.clone(),
        ));
        Self {
            provider,
            store,
            cache,
            lifecycle,
        }
    }
}

/// Test fixture that manages a mock provider endpoint
pub struct MockServerFixture {
    pub server: Arc<Mutex<ServerGuard>>,
    pub base_url: String,
}

impl MockServerFixture {
    pub async fn new() -> Self {
        let server = Server::new_async().await;
        let base_url = server.url();
        Self {
            server: Arc::new(Mutex::new(server)),
            base_url,
        }
    }

    /// Mock a JSON reply to any POST carrying the given action header
    pub async fn mock_action(&self, action: &str, status: usize, body: &str) -> Mock {
        let mut server = self.server.lock().await;
        server
            .mock("POST", "/")
            .match_header("x-tc-action", action)
            .with_status(status)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create_async()
            .await
    }
}
