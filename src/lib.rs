//! StepDoc - 自然语言任务 → 浏览器操作 → 步骤文档
//!
//! 模块划分：
//! - **domain**: 任务、计划、认证、LLM 与输出配置等数据模型
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Anthropic / Mock）
//! - **browser**: 浏览器驱动抽象（headless_chrome / Mock）
//! - **auth**: 登录策略（Cookie / Token / 表单 / SSO / 人工）
//! - **planner**: 任务 → 操作计划，失败步骤修复，步骤叙述
//! - **orchestrator**: 任务执行主流程与单步执行器
//! - **docgen**: Markdown / HTML 文档生成
//! - **store**: 任务存储
//! - **core**: 错误类型与任务取消监管
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **api**: HTTP API（feature "web"）

#[cfg(feature = "web")]
pub mod api;
pub mod auth;
pub mod browser;
pub mod config;
pub mod core;
pub mod docgen;
pub mod domain;
pub mod llm;
pub mod observability;
pub mod orchestrator;
pub mod planner;
pub mod store;

pub use core::{TaskError, TaskSupervisor};
pub use orchestrator::{Orchestrator, OrchestratorSettings};
