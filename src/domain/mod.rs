//! 领域模型：任务、认证、LLM 配置、输出配置、执行计划
//!
//! 纯数据类型，全部可 serde 序列化；状态迁移规则集中在 [`TaskStatus`]。

pub mod auth;
pub mod llm;
pub mod output;
pub mod plan;
pub mod request;
pub mod task;

pub use auth::{AuthConfig, Cookie, Credentials, Session, SsoConfig, SsoProvider};
pub use llm::{presets, LlmConfig, LlmOptions, LlmPreset, LlmProvider, WireShape};
pub use output::{
    supported_formats, ContentConfig, DocFormat, FormatInfo, OutputConfig, ScreenshotConf,
    StepNumbering, StyleConfig,
};
pub use plan::{ActionStep, ActionType, TaskPlan};
pub use request::TaskRequest;
pub use task::{
    DocumentInfo, Screenshot, StatusTransitionError, StepResult, Task, TaskResult, TaskStatus,
};
