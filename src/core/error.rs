//! 任务级致命错误
//!
//! 只有这些错误会让任务进入 failed（Cancelled 进入 cancelled）；单步失败记录在 StepResult 中，不会出现在这里。

use thiserror::Error;

use crate::auth::AuthError;
use crate::browser::BrowserError;
use crate::llm::LlmError;
use crate::planner::PlannerError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("failed to create llm client: {0}")]
    LlmClient(#[source] LlmError),

    #[error("browser error: {0}")]
    Browser(#[from] BrowserError),

    #[error("authentication failed: {0}")]
    Auth(#[source] AuthError),

    #[error("failed to capture page snapshot: {0}")]
    Snapshot(#[source] BrowserError),

    #[error("planning failed: {0}")]
    Plan(#[from] PlannerError),

    #[error("task store error: {0}")]
    Store(#[from] StoreError),

    #[error("task cancelled")]
    Cancelled,
}

impl TaskError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<AuthError> for TaskError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Cancelled => Self::Cancelled,
            other => Self::Auth(other),
        }
    }
}
