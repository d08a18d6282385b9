//! 任务实体与状态机
//!
//! pending → running → {completed | failed}；cancelled 可在任意非终态进入。
//! 终态不可再迁移，任务离开 pending 后不会回到 pending。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{ActionStep, ActionType, AuthConfig, DocFormat, LlmConfig, OutputConfig};

/// 任务状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// 是否允许迁移到 `next`
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        match (self, next) {
            (Pending, Running) | (Pending, Cancelled) => true,
            (Running, Completed) | (Running, Failed) | (Running, Cancelled) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid status transition: {from} -> {to}")]
pub struct StatusTransitionError {
    pub from: TaskStatus,
    pub to: TaskStatus,
}

/// 任务：一次用户提交的浏览器自动化 + 文档生成请求
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    /// 自然语言任务描述
    pub description: String,
    pub target_url: String,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthConfig>,
    pub llm: LlmConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<TaskResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(
        description: impl Into<String>,
        target_url: impl Into<String>,
        llm: LlmConfig,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            description: description.into(),
            target_url: target_url.into(),
            status: TaskStatus::Pending,
            auth: None,
            llm,
            output: OutputConfig::default(),
            result: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn with_output(mut self, output: OutputConfig) -> Self {
        self.output = output;
        self
    }

    /// 迁移状态并刷新时间戳；进入终态时记录 completed_at
    pub fn advance(&mut self, next: TaskStatus) -> Result<(), StatusTransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(StatusTransitionError {
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
        Ok(())
    }
}

/// 任务执行结果
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TaskResult {
    pub steps: Vec<StepResult>,
    pub screenshots: Vec<Screenshot>,
    pub documents: Vec<DocumentInfo>,
    /// 执行耗时（毫秒）
    pub duration_ms: u64,
}

/// 单步执行结果（每个计划步骤恰好一条，按计划顺序）
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StepResult {
    pub order: u32,
    pub action: ActionType,
    pub description: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<Screenshot>,
    pub executed_at: DateTime<Utc>,
}

impl StepResult {
    pub fn succeeded(step: &ActionStep) -> Self {
        Self {
            order: step.order,
            action: step.action.clone(),
            description: step.description.clone(),
            success: true,
            error: None,
            screenshot: None,
            executed_at: Utc::now(),
        }
    }

    pub fn failed(step: &ActionStep, error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::succeeded(step)
        }
    }
}

/// 截图记录
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Screenshot {
    pub id: String,
    pub step_order: u32,
    /// 落盘路径；未配置输出目录时为空
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub size: usize,
    pub created_at: DateTime<Utc>,
}

impl Screenshot {
    pub fn new(step_order: u32, size: usize, url: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            step_order,
            url,
            size,
            created_at: Utc::now(),
        }
    }
}

/// 生成的文档信息
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub id: String,
    pub format: DocFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub content: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LlmProvider;

    fn task() -> Task {
        Task::new(
            "注册账号",
            "https://example.com",
            LlmConfig::new(LlmProvider::OpenAi, "gpt-4o"),
        )
    }

    #[test]
    fn test_new_task_is_pending() {
        let t = task();
        assert_eq!(t.status, TaskStatus::Pending);
        assert!(t.completed_at.is_none());
        assert!(!t.id.is_empty());
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut t = task();
        t.advance(TaskStatus::Running).unwrap();
        t.advance(TaskStatus::Completed).unwrap();
        assert_eq!(t.status, TaskStatus::Completed);
        assert!(t.completed_at.is_some());
    }

    #[test]
    fn test_never_returns_to_pending() {
        let mut t = task();
        t.advance(TaskStatus::Running).unwrap();
        let err = t.advance(TaskStatus::Pending).unwrap_err();
        assert_eq!(err.from, TaskStatus::Running);
        assert_eq!(err.to, TaskStatus::Pending);
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [TaskStatus::Completed, TaskStatus::Failed, TaskStatus::Cancelled] {
            for next in [
                TaskStatus::Pending,
                TaskStatus::Running,
                TaskStatus::Completed,
                TaskStatus::Failed,
                TaskStatus::Cancelled,
            ] {
                assert!(!terminal.can_transition_to(next), "{terminal} -> {next}");
            }
        }
    }

    #[test]
    fn test_cancel_from_pending_or_running() {
        let mut t = task();
        t.advance(TaskStatus::Cancelled).unwrap();
        assert!(t.status.is_terminal());

        let mut t = task();
        t.advance(TaskStatus::Running).unwrap();
        t.advance(TaskStatus::Cancelled).unwrap();
        assert_eq!(t.status, TaskStatus::Cancelled);
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&TaskStatus::Cancelled).unwrap();
        assert_eq!(json, "\"cancelled\"");
    }
}
