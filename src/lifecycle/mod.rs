//! 任务生命周期模块：编排缓存查找、供应商调用与任务状态迁移。
//!
//! # Task Lifecycle Module
//!
//! [`TaskLifecycle`] drives one generation request through
//! cache lookup → provider execution → completion:
//!
//! 1. Validate the request (fails the task, no network round-trip).
//! 2. Exact cache lookup, then similarity lookup within the same quality tier. A hit
//!    moves `PENDING → CACHED`.
//! 3. On a miss, look for a completed task in the store whose result can be put back
//!    into the cache (same key first, then a similar input).
//! 4. Otherwise coalesce onto the in-flight job for the same cache key, or lead a
//!    new one: `PENDING → PROCESSING → COMPLETED | FAILED`. A follower waits at most
//!    its own deadline.
//! 5. Quality scoring runs after `COMPLETED` in the background and is copied onto
//!    the cache entry.
//!
//! Every transition is written with a status precondition, so a concurrent
//! cancellation is never overwritten. Cancelling does not abort the provider job;
//! its result still lands in the cache.

mod dedup;

pub use dedup::{Claim, InflightRequests, LeaderSlot, SharedOutcome};

use crate::cache::{
    CacheEntry, CacheKey, CacheKeyer, CacheSettings, Lookup, ResultCache, SimilarityMatcher,
};
use crate::provider::{JobOutcome, ProviderGateway};
use crate::quality::QualityScorer;
use crate::store::TaskStore;
use crate::types::{GenerationRequest, GenerationTask, ResultRef, TaskStatus};
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;

const CANCEL_ATTEMPTS: usize = 3;

/// What an in-flight job resolves to for everyone waiting on its key.
#[derive(Debug, Clone)]
pub enum Resolution {
    Generated(JobOutcome),
    /// The leader found the entry already cached before calling the provider.
    Reused(CacheEntry),
}

pub struct TaskLifecycle {
    keyer: CacheKeyer,
    cache: Arc<ResultCache>,
    gateway: Arc<ProviderGateway>,
    store: Arc<dyn TaskStore>,
    scorer: Option<Arc<dyn QualityScorer>>,
    inflight: Arc<InflightRequests<Resolution>>,
}

impl TaskLifecycle {
    pub fn new(
        cache: Arc<ResultCache>,
        gateway: Arc<ProviderGateway>,
        store: Arc<dyn TaskStore>,
    ) -> Self {
        let keyer = CacheKeyer::new()
            .with_default_format(gateway.settings().default_result_format.clone());
        Self {
            keyer,
            cache,
            gateway,
            store,
            scorer: None,
            inflight: Arc::new(InflightRequests::new()),
        }
    }

    pub fn with_scorer(mut self, scorer: Arc<dyn QualityScorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    pub fn with_keyer(mut self, keyer: CacheKeyer) -> Self {
        self.keyer = keyer;
        self
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    pub fn inflight_jobs(&self) -> usize {
        self.inflight.len()
    }

    /// Record a `PENDING` task for `request`.
    pub async fn create_task(&self, request: &GenerationRequest) -> Result<GenerationTask> {
        let key = self.keyer.key(&request.input, request.kind, &request.params);
        let task = GenerationTask::new(request, key.fingerprint, key.key);
        self.store.save(&task).await?;
        tracing::info!(
            task_id = %task.task_id,
            user_id = %task.user_id,
            kind = %task.kind,
            cache_key = %task.cache_key,
            "generation task created"
        );
        Ok(task)
    }

    /// Create and run a task. Validation and provider failures come back as a
    /// `FAILED` task, not as `Err`; `Err` means the store itself failed.
    pub async fn submit(&self, request: GenerationRequest) -> Result<GenerationTask> {
        self.submit_with_deadline(request, None).await
    }

    pub async fn submit_with_deadline(
        &self,
        request: GenerationRequest,
        deadline: Option<Duration>,
    ) -> Result<GenerationTask> {
        let task = self.create_task(&request).await?;
        self.drive(task, request, deadline).await
    }

    /// Run a stored `PENDING` task.
    pub async fn run_task(&self, task_id: &str, deadline: Option<Duration>) -> Result<GenerationTask> {
        let task = self
            .store
            .find_by_task_id(task_id)
            .await?
            .ok_or_else(|| Error::validation(format!("task {} not found", task_id)))?;
        if task.status != TaskStatus::Pending {
            return Err(Error::InvalidTransition {
                from: task.status,
                to: TaskStatus::Processing,
            });
        }
        let request = task.to_request();
        self.drive(task, request, deadline).await
    }

    async fn drive(
        &self,
        task: GenerationTask,
        request: GenerationRequest,
        deadline: Option<Duration>,
    ) -> Result<GenerationTask> {
        if let Err(e) = self.gateway.prepare(&request) {
            tracing::info!(task_id = %task.task_id, error = %e, "request rejected");
            return self.finish_failed(task, e.to_string()).await;
        }

        let key = self.keyer.key(&request.input, request.kind, &request.params);
        let lookup = self.cache.lookup(&key, &request.input, request.kind).await;
        if let Some(entry) = lookup.entry() {
            if let Lookup::Similar(m) = &lookup {
                tracing::info!(task_id = %task.task_id, matched_key = %entry.cache_key, score = m.score, "served from similar cache entry");
            }
            return self.finish_cached(task, entry.result.clone(), &entry.cache_key).await;
        }
        if let Some(entry) = self.restore_from_store(&key, &request).await {
            return self.finish_cached(task, entry.result, &entry.cache_key).await;
        }

        match self.inflight.claim(key.as_str()) {
            Claim::Follower(shared) => {
                let wait = deadline.unwrap_or(self.gateway.settings().job_deadline);
                tracing::info!(task_id = %task.task_id, cache_key = %key, wait_ms = wait.as_millis() as u64, "joined in-flight job");
                match tokio::time::timeout(wait, shared).await {
                    Ok(Ok(Resolution::Generated(outcome))) => {
                        if self.cache.record_hit(key.as_str()).await.is_some() {
                            self.finish_cached(task, outcome.result, key.as_str()).await
                        } else {
                            self.finish_joined(task, outcome.result, Some(outcome.external_job_id))
                                .await
                        }
                    }
                    Ok(Ok(Resolution::Reused(entry))) => {
                        if self.cache.record_hit(&entry.cache_key).await.is_some() {
                            self.finish_cached(task, entry.result, &entry.cache_key).await
                        } else {
                            self.finish_joined(task, entry.result, None).await
                        }
                    }
                    Ok(Err(e)) => self.finish_failed(task, e.to_string()).await,
                    Err(_) => {
                        let e = Error::provider_with_code(
                            self.gateway.provider_name(),
                            "DeadlineExceeded",
                            format!(
                                "waiting for in-flight job exceeded deadline of {} ms",
                                wait.as_millis()
                            ),
                        );
                        tracing::warn!(task_id = %task.task_id, cache_key = %key, error = %e, "gave up on in-flight job");
                        self.finish_failed(task, e.to_string()).await
                    }
                }
            }
            Claim::Leader(slot, shared) => {
                // The previous leader may have stored the entry after our lookup.
                if self.cache.find_exact(key.as_str()).await.is_some() {
                    if let Some(entry) = self.cache.record_hit(key.as_str()).await {
                        slot.complete(Ok(Resolution::Reused(entry.clone())));
                        return self.finish_cached(task, entry.result, &entry.cache_key).await;
                    }
                }
                self.spawn_job(slot, request, key, deadline);
                self.lead(task, shared).await
            }
        }
    }

    /// Run the provider job detached from the caller, so that it completes and
    /// populates the cache even if every waiter goes away.
    fn spawn_job(
        &self,
        slot: LeaderSlot<Resolution>,
        request: GenerationRequest,
        key: CacheKey,
        deadline: Option<Duration>,
    ) {
        let gateway = self.gateway.clone();
        let cache = self.cache.clone();
        tokio::spawn(async move {
            let outcome = gateway.execute(&request, deadline).await;
            if let Ok(done) = &outcome {
                let entry = CacheEntry::new(
                    key.key.clone(),
                    key.fingerprint.clone(),
                    request.input.trim(),
                    request.kind,
                    done.result.clone(),
                )
                .with_tier(key.tier.clone());
                cache.put(entry).await;
            }
            slot.complete(outcome.map(Resolution::Generated).map_err(Arc::new));
        });
    }

    async fn lead(
        &self,
        mut task: GenerationTask,
        shared: SharedOutcome<Resolution>,
    ) -> Result<GenerationTask> {
        task.start_processing(self.gateway.provider_name())?;
        if !self.persist(&task, TaskStatus::Pending).await? {
            // Cancelled before dispatch; the job keeps running for the cache.
            return self.stored(&task.task_id).await;
        }
        tracing::info!(task_id = %task.task_id, provider = self.gateway.provider_name(), "task processing");

        let (result, job_id) = match shared.await {
            Ok(Resolution::Generated(outcome)) => (outcome.result, Some(outcome.external_job_id)),
            Ok(Resolution::Reused(entry)) => (entry.result, None),
            Err(e) => {
                task.fail(e.to_string())?;
                if !self.persist(&task, TaskStatus::Processing).await? {
                    return self.stored(&task.task_id).await;
                }
                tracing::warn!(task_id = %task.task_id, error = %e, "task failed");
                return Ok(task);
            }
        };

        task.complete(result, job_id)?;
        if !self.persist(&task, TaskStatus::Processing).await? {
            tracing::info!(task_id = %task.task_id, "task cancelled while processing, result kept in cache");
            return self.stored(&task.task_id).await;
        }
        tracing::info!(
            task_id = %task.task_id,
            job_id = task.external_job_id.as_deref().unwrap_or(""),
            processing_time_ms = task.processing_time_ms.unwrap_or(0),
            "task completed"
        );
        self.spawn_quality(&task);
        Ok(task)
    }

    async fn finish_cached(
        &self,
        mut task: GenerationTask,
        result: ResultRef,
        cache_key: &str,
    ) -> Result<GenerationTask> {
        let expected = task.status;
        task.mark_cached(result, cache_key)?;
        if !self.persist(&task, expected).await? {
            return self.stored(&task.task_id).await;
        }
        tracing::info!(task_id = %task.task_id, cache_key, "task served from cache");
        Ok(task)
    }

    /// Completion for a follower whose shared result could not be served from the
    /// cache (nothing was stored, or the entry is already gone).
    async fn finish_joined(
        &self,
        mut task: GenerationTask,
        result: ResultRef,
        job_id: Option<String>,
    ) -> Result<GenerationTask> {
        task.start_processing(self.gateway.provider_name())?;
        if !self.persist(&task, TaskStatus::Pending).await? {
            return self.stored(&task.task_id).await;
        }
        task.complete(result, job_id)?;
        if !self.persist(&task, TaskStatus::Processing).await? {
            return self.stored(&task.task_id).await;
        }
        tracing::info!(
            task_id = %task.task_id,
            job_id = task.external_job_id.as_deref().unwrap_or(""),
            "task completed from shared job without a cache entry"
        );
        self.spawn_quality(&task);
        Ok(task)
    }

    async fn finish_failed(&self, mut task: GenerationTask, detail: String) -> Result<GenerationTask> {
        let expected = task.status;
        task.fail(detail)?;
        if !self.persist(&task, expected).await? {
            return self.stored(&task.task_id).await;
        }
        Ok(task)
    }

    /// Conditional write; `false` means another writer moved the task first.
    async fn persist(&self, task: &GenerationTask, expected: TaskStatus) -> Result<bool> {
        let written = self.store.update_if_status(task, expected).await?;
        if !written {
            tracing::info!(task_id = %task.task_id, expected = %expected, "task changed concurrently, keeping stored state");
        }
        Ok(written)
    }

    async fn stored(&self, task_id: &str) -> Result<GenerationTask> {
        self.store
            .find_by_task_id(task_id)
            .await?
            .ok_or_else(|| Error::Storage(format!("task {} disappeared", task_id)))
    }

    /// On a cache miss, rebuild an entry from a completed task in the store: one with
    /// the same key first, then the most similar input of the same kind and tier.
    /// The entry is written back to the cache before it is served.
    async fn restore_from_store(
        &self,
        key: &CacheKey,
        request: &GenerationRequest,
    ) -> Option<CacheEntry> {
        let settings = self.cache.settings();
        if !settings.enabled || key.degraded {
            return None;
        }
        let same_key = match self.store.find_by_input_hash(&key.fingerprint).await {
            Ok(tasks) => tasks
                .iter()
                .filter(|t| is_reusable(t) && t.cache_key == key.key)
                .find_map(|t| self.entry_for_task(t)),
            Err(e) => {
                tracing::warn!(cache_key = %key, error = %e, "store lookup by input hash failed");
                None
            }
        };
        let candidate = match same_key {
            Some(entry) => entry,
            None => self.similar_completed(key, request, &settings).await?,
        };
        if !self.cache.put(candidate.clone()).await {
            return None;
        }
        let entry = self.cache.record_hit(&candidate.cache_key).await?;
        tracing::info!(cache_key = %key, restored_key = %entry.cache_key, "cache entry restored from completed task");
        Some(entry)
    }

    async fn similar_completed(
        &self,
        key: &CacheKey,
        request: &GenerationRequest,
        settings: &CacheSettings,
    ) -> Option<CacheEntry> {
        let input = request.input.trim();
        if input.chars().count() > settings.max_similarity_input_chars {
            return None;
        }
        let tasks = match self
            .store
            .find_similar_completed_tasks(request.kind, settings.max_similar_candidates)
            .await
        {
            Ok(tasks) => tasks,
            Err(e) => {
                tracing::warn!(cache_key = %key, error = %e, "store lookup of completed tasks failed");
                return None;
            }
        };
        let candidates = tasks
            .iter()
            .filter(|t| is_reusable(t))
            .filter_map(|t| self.entry_for_task(t))
            .filter(|e| e.tier == key.tier);
        SimilarityMatcher::new(settings.similarity_threshold)
            .rank(input, candidates)
            .into_iter()
            .next()
            .map(|m| m.entry)
    }

    fn entry_for_task(&self, task: &GenerationTask) -> Option<CacheEntry> {
        let request = task.to_request();
        let key = self.keyer.key(&request.input, request.kind, &request.params);
        if key.degraded {
            return None;
        }
        let mut entry = CacheEntry::new(
            key.key,
            key.fingerprint,
            request.input.trim(),
            request.kind,
            task.result.clone(),
        )
        .with_tier(key.tier);
        entry.quality_score = task.quality_score;
        Some(entry)
    }

    fn spawn_quality(&self, task: &GenerationTask) {
        let Some(scorer) = self.scorer.clone() else {
            return;
        };
        let store = self.store.clone();
        let cache = self.cache.clone();
        let task_id = task.task_id.clone();
        tokio::spawn(async move {
            if let Err(e) = score_task(store.as_ref(), &cache, scorer.as_ref(), &task_id).await {
                tracing::warn!(task_id = %task_id, error = %e, "quality assessment failed");
            }
        });
    }

    /// Score a completed task now and store the overall score on it.
    pub async fn assess_quality(&self, task_id: &str) -> Result<Option<f64>> {
        match &self.scorer {
            Some(scorer) => {
                score_task(self.store.as_ref(), &self.cache, scorer.as_ref(), task_id).await
            }
            None => Ok(None),
        }
    }

    /// Mark a `PENDING` or `PROCESSING` task `FAILED` with `reason`. Returns `false`
    /// for unknown or already terminal tasks. An in-flight provider job is left running.
    pub async fn cancel(&self, task_id: &str, reason: &str) -> Result<bool> {
        for _ in 0..CANCEL_ATTEMPTS {
            let Some(mut task) = self.store.find_by_task_id(task_id).await? else {
                tracing::warn!(task_id, "cannot cancel unknown task");
                return Ok(false);
            };
            if task.status.is_terminal() {
                tracing::warn!(task_id, status = %task.status, "cannot cancel finished task");
                return Ok(false);
            }
            let previous = task.status;
            task.fail(reason)?;
            if self.store.update_if_status(&task, previous).await? {
                tracing::info!(task_id, from = %previous, reason, "task cancelled");
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub async fn task(&self, task_id: &str) -> Result<Option<GenerationTask>> {
        self.store.find_by_task_id(task_id).await
    }

    /// Newest first.
    pub async fn user_tasks(&self, user_id: &str, limit: usize) -> Result<Vec<GenerationTask>> {
        self.store.find_by_user_id(user_id, limit).await
    }

    /// Re-populate the cache from up to `limit` recent completed tasks. Entries
    /// already cached are left untouched. Returns the number of entries added.
    pub async fn warm_cache(&self, limit: usize) -> Result<usize> {
        let mut added = 0;
        for task in self.store.find_recent_completed(limit).await? {
            if !is_reusable(&task) {
                continue;
            }
            let Some(entry) = self.entry_for_task(&task) else {
                continue;
            };
            if self.cache.find_exact(&entry.cache_key).await.is_some() {
                continue;
            }
            if self.cache.put(entry).await {
                added += 1;
            }
        }
        tracing::info!(added, "cache warmed from completed tasks");
        Ok(added)
    }
}

/// Provider-produced task with a result worth caching.
fn is_reusable(task: &GenerationTask) -> bool {
    task.status == TaskStatus::Completed && !task.result.is_empty()
}

async fn score_task(
    store: &dyn TaskStore,
    cache: &ResultCache,
    scorer: &dyn QualityScorer,
    task_id: &str,
) -> Result<Option<f64>> {
    let Some(mut task) = store.find_by_task_id(task_id).await? else {
        return Ok(None);
    };
    if task.status != TaskStatus::Completed {
        return Ok(None);
    }
    let score = scorer.assess(&task.result).await?.overall();
    task.set_quality_score(score);
    store.update(&task).await?;
    let on_entry = cache.set_quality_score(&task.cache_key, score).await;
    tracing::debug!(task_id, score, on_entry, "quality score stored");
    Ok(Some(score))
}
