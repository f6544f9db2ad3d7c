//! 任务存储模块：生成任务的持久化边界，提供显式打开/关闭的生命周期。
//!
//! # Task Store Module
//!
//! [`TaskStore`] is the persistence boundary for [`GenerationTask`] audit records.
//! Tasks are never deleted; each lifecycle transition updates the record in place.
//! Stores are opened at process start and closed at shutdown, and callers receive
//! them explicitly.

mod memory;

pub use memory::InMemoryTaskStore;

use crate::types::{GenerationKind, GenerationTask, TaskStatus};
use crate::Result;
use async_trait::async_trait;

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn open(&self) -> Result<()>;

    async fn close(&self) -> Result<()>;

    /// Insert a new task. Saving an existing task id is an error.
    async fn save(&self, task: &GenerationTask) -> Result<()>;

    /// Replace an existing task unconditionally.
    async fn update(&self, task: &GenerationTask) -> Result<()>;

    /// Replace an existing task only while its stored status is still `expected`.
    async fn update_if_status(&self, task: &GenerationTask, expected: TaskStatus) -> Result<bool>;

    async fn find_by_task_id(&self, task_id: &str) -> Result<Option<GenerationTask>>;

    /// Newest first.
    async fn find_by_user_id(&self, user_id: &str, limit: usize) -> Result<Vec<GenerationTask>>;

    async fn find_by_input_hash(&self, input_hash: &str) -> Result<Vec<GenerationTask>>;

    /// Successful tasks of `kind`, newest first.
    async fn find_similar_completed_tasks(
        &self,
        kind: GenerationKind,
        limit: usize,
    ) -> Result<Vec<GenerationTask>>;

    /// Tasks that produced a result through the provider (`COMPLETED`), newest first.
    async fn find_recent_completed(&self, limit: usize) -> Result<Vec<GenerationTask>>;
}
