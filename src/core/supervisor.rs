//! 任务监管：每个运行中的任务持有一个子 CancellationToken
//!
//! 根 token 取消（进程退出）时所有任务一并取消；单任务取消只影响自身。

use std::collections::HashMap;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
pub struct TaskSupervisor {
    root: CancellationToken,
    tasks: RwLock<HashMap<String, CancellationToken>>,
}

impl TaskSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为任务登记取消令牌；已登记则返回同一个
    pub async fn register(&self, task_id: &str) -> CancellationToken {
        let mut tasks = self.tasks.write().await;
        tasks
            .entry(task_id.to_string())
            .or_insert_with(|| self.root.child_token())
            .clone()
    }

    /// 取消单个任务；任务未登记时返回 false
    pub async fn cancel(&self, task_id: &str) -> bool {
        match self.tasks.read().await.get(task_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// 任务结束后移除令牌
    pub async fn finish(&self, task_id: &str) {
        self.tasks.write().await.remove(task_id);
    }

    pub async fn active_count(&self) -> usize {
        self.tasks.read().await.len()
    }

    /// 取消全部任务（进程退出）
    pub fn shutdown(&self) {
        self.root.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancel_single_task() {
        let sup = TaskSupervisor::new();
        let a = sup.register("a").await;
        let b = sup.register("b").await;
        assert!(sup.cancel("a").await);
        assert!(a.is_cancelled());
        assert!(!b.is_cancelled());
        assert!(!sup.cancel("missing").await);

        sup.finish("a").await;
        assert_eq!(sup.active_count().await, 1);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_all() {
        let sup = TaskSupervisor::new();
        let a = sup.register("a").await;
        let again = sup.register("a").await;
        sup.shutdown();
        assert!(a.is_cancelled());
        assert!(again.is_cancelled());
    }
}
