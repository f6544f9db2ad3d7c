//! In-process task store.

use super::TaskStore;
use crate::types::{GenerationKind, GenerationTask, TaskStatus};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

#[derive(Default)]
pub struct InMemoryTaskStore {
    open: AtomicBool,
    tasks: RwLock<HashMap<String, GenerationTask>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.open.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(Error::Storage("task store is not open".to_string()))
        }
    }

    async fn newest_where<F>(&self, limit: usize, predicate: F) -> Result<Vec<GenerationTask>>
    where
        F: Fn(&GenerationTask) -> bool,
    {
        self.ensure_open()?;
        let tasks = self.tasks.read().await;
        let mut found: Vec<GenerationTask> = tasks.values().filter(|t| predicate(t)).cloned().collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        found.truncate(limit);
        Ok(found)
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn open(&self) -> Result<()> {
        self.open.store(true, Ordering::Release);
        tracing::debug!("in-memory task store opened");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.open.store(false, Ordering::Release);
        tracing::debug!("in-memory task store closed");
        Ok(())
    }

    async fn save(&self, task: &GenerationTask) -> Result<()> {
        self.ensure_open()?;
        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(&task.task_id) {
            return Err(Error::Storage(format!("task {} already exists", task.task_id)));
        }
        tasks.insert(task.task_id.clone(), task.clone());
        Ok(())
    }

    async fn update(&self, task: &GenerationTask) -> Result<()> {
        self.ensure_open()?;
        let mut tasks = self.tasks.write().await;
        match tasks.get_mut(&task.task_id) {
            Some(stored) => {
                *stored = task.clone();
                Ok(())
            }
            None => Err(Error::Storage(format!("task {} not found", task.task_id))),
        }
    }

    async fn update_if_status(&self, task: &GenerationTask, expected: TaskStatus) -> Result<bool> {
        self.ensure_open()?;
        let mut tasks = self.tasks.write().await;
        match tasks.get_mut(&task.task_id) {
            Some(stored) if stored.status == expected => {
                *stored = task.clone();
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(Error::Storage(format!("task {} not found", task.task_id))),
        }
    }

    async fn find_by_task_id(&self, task_id: &str) -> Result<Option<GenerationTask>> {
        self.ensure_open()?;
        Ok(self.tasks.read().await.get(task_id).cloned())
    }

    async fn find_by_user_id(&self, user_id: &str, limit: usize) -> Result<Vec<GenerationTask>> {
        self.newest_where(limit, |t| t.user_id == user_id).await
    }

    async fn find_by_input_hash(&self, input_hash: &str) -> Result<Vec<GenerationTask>> {
        self.newest_where(usize::MAX, |t| t.input_hash == input_hash)
            .await
    }

    async fn find_similar_completed_tasks(
        &self,
        kind: GenerationKind,
        limit: usize,
    ) -> Result<Vec<GenerationTask>> {
        self.newest_where(limit, |t| t.kind == kind && t.status.is_success())
            .await
    }

    async fn find_recent_completed(&self, limit: usize) -> Result<Vec<GenerationTask>> {
        self.newest_where(limit, |t| t.status == TaskStatus::Completed)
            .await
    }
}
