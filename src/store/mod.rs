//! 任务存储：按任务 ID 索引的记录存储
//!
//! 只提供进程内实现 MemoryTaskStore；持久化存储实现同一 trait 即可替换。

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::domain::{StatusTransitionError, Task, TaskStatus};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("task not found: {0}")]
    NotFound(String),

    #[error("task already exists: {0}")]
    AlreadyExists(String),

    #[error(transparent)]
    Transition(#[from] StatusTransitionError),
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn create(&self, task: &Task) -> Result<(), StoreError>;
    async fn get(&self, id: &str) -> Result<Task, StoreError>;
    /// 整体覆盖已有记录
    async fn update(&self, task: &Task) -> Result<(), StoreError>;
    /// 只迁移状态；非法迁移返回 Transition
    async fn update_status(&self, id: &str, status: TaskStatus) -> Result<Task, StoreError>;
    async fn delete(&self, id: &str) -> Result<(), StoreError>;
    /// 按创建时间倒序分页；limit 为 0 表示不限
    async fn list(&self, limit: usize, offset: usize) -> Result<Vec<Task>, StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    tasks: RwLock<HashMap<String, Task>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn create(&self, task: &Task) -> Result<(), StoreError> {
        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(&task.id) {
            return Err(StoreError::AlreadyExists(task.id.clone()));
        }
        tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Task, StoreError> {
        self.tasks
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn update(&self, task: &Task) -> Result<(), StoreError> {
        let mut tasks = self.tasks.write().await;
        let slot = tasks
            .get_mut(&task.id)
            .ok_or_else(|| StoreError::NotFound(task.id.clone()))?;
        *slot = task.clone();
        slot.updated_at = Utc::now();
        Ok(())
    }

    async fn update_status(&self, id: &str, status: TaskStatus) -> Result<Task, StoreError> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        task.advance(status)?;
        Ok(task.clone())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.tasks
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn list(&self, limit: usize, offset: usize) -> Result<Vec<Task>, StoreError> {
        let tasks = self.tasks.read().await;
        let mut all: Vec<Task> = tasks.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let page = all.into_iter().skip(offset);
        Ok(if limit == 0 {
            page.collect()
        } else {
            page.take(limit).collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LlmConfig, LlmProvider};

    fn task(desc: &str) -> Task {
        Task::new(desc, "https://a.test", LlmConfig::new(LlmProvider::OpenAi, "gpt-4o"))
    }

    #[tokio::test]
    async fn test_create_get_update_delete() {
        let store = MemoryTaskStore::new();
        let mut t = task("a");
        store.create(&t).await.unwrap();
        assert!(matches!(store.create(&t).await, Err(StoreError::AlreadyExists(_))));

        t.error_message = Some("x".into());
        store.update(&t).await.unwrap();
        assert_eq!(store.get(&t.id).await.unwrap().error_message.as_deref(), Some("x"));

        store.delete(&t.id).await.unwrap();
        assert!(matches!(store.get(&t.id).await, Err(StoreError::NotFound(_))));
        assert!(matches!(store.update(&t).await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_update_status_is_monotonic() {
        let store = MemoryTaskStore::new();
        let t = task("a");
        store.create(&t).await.unwrap();
        store.update_status(&t.id, TaskStatus::Running).await.unwrap();
        let done = store.update_status(&t.id, TaskStatus::Completed).await.unwrap();
        assert!(done.completed_at.is_some());
        assert!(matches!(
            store.update_status(&t.id, TaskStatus::Pending).await,
            Err(StoreError::Transition(_))
        ));
    }

    #[tokio::test]
    async fn test_list_newest_first_with_paging() {
        let store = MemoryTaskStore::new();
        let mut ids = Vec::new();
        for (i, name) in ["a", "b", "c"].iter().enumerate() {
            let mut t = task(name);
            t.created_at = t.created_at + chrono::Duration::seconds(i as i64);
            ids.push(t.id.clone());
            store.create(&t).await.unwrap();
        }
        let all = store.list(0, 0).await.unwrap();
        assert_eq!(all.iter().map(|t| t.description.as_str()).collect::<Vec<_>>(), ["c", "b", "a"]);

        let page = store.list(1, 1).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, ids[1]);
    }
}
