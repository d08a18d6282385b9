//! AI 规划器：任务描述 + 页面状态 → 执行计划
//!
//! - `parse_task`: 生成整份 TaskPlan
//! - `refine_step`: 用最新页面快照修复单个失败步骤
//! - `generate_step_description`: 步骤叙述，模型失败时退回原描述

pub mod parse;
pub mod prompt;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::browser::PageSnapshot;
use crate::domain::{ActionStep, StepResult, TaskPlan};
use crate::llm::{LlmClient, LlmError, Message};

pub use parse::{extract_json_object, parse_lenient};

/// 快照中送入提示词的默认元素上限
pub const DEFAULT_MAX_ELEMENTS: usize = 20;

#[derive(Error, Debug)]
pub enum PlannerError {
    #[error("llm chat failed: {0}")]
    Llm(#[from] LlmError),

    #[error("could not parse plan from model reply: {0}")]
    PlanParse(String),
}

#[async_trait]
pub trait Planner: Send + Sync {
    async fn parse_task(
        &self,
        description: &str,
        target_url: &str,
        snapshot: Option<&PageSnapshot>,
    ) -> Result<TaskPlan, PlannerError>;

    async fn refine_step(
        &self,
        step: &ActionStep,
        snapshot: &PageSnapshot,
    ) -> Result<ActionStep, PlannerError>;

    /// 永不失败
    async fn generate_step_description(&self, step: &ActionStep, result: &StepResult) -> String;
}

/// 基于 LlmClient 的规划器
pub struct AiPlanner {
    llm: Arc<dyn LlmClient>,
    max_elements: usize,
}

impl AiPlanner {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            max_elements: DEFAULT_MAX_ELEMENTS,
        }
    }

    pub fn with_max_elements(mut self, max_elements: usize) -> Self {
        self.max_elements = max_elements;
        self
    }

    async fn ask(&self, user: String) -> Result<String, PlannerError> {
        let messages = [Message::system(prompt::SYSTEM_PROMPT), Message::user(user)];
        let resp = self.llm.chat(&messages).await?;
        tracing::debug!(model = self.llm.model(), len = resp.content.len(), "planner reply");
        Ok(resp.content)
    }
}

#[async_trait]
impl Planner for AiPlanner {
    async fn parse_task(
        &self,
        description: &str,
        target_url: &str,
        snapshot: Option<&PageSnapshot>,
    ) -> Result<TaskPlan, PlannerError> {
        let reply = self
            .ask(prompt::task_prompt(description, target_url, snapshot, self.max_elements))
            .await?;
        let plan: TaskPlan = parse_lenient(&reply).map_err(PlannerError::PlanParse)?;
        tracing::info!(steps = plan.steps.len(), "plan generated");
        Ok(plan)
    }

    async fn refine_step(
        &self,
        step: &ActionStep,
        snapshot: &PageSnapshot,
    ) -> Result<ActionStep, PlannerError> {
        let reply = self
            .ask(prompt::refine_prompt(step, snapshot, self.max_elements))
            .await?;
        let mut refined: ActionStep = parse_lenient(&reply).map_err(PlannerError::PlanParse)?;
        // 修复后的步骤沿用原序号
        refined.order = step.order;
        tracing::info!(
            order = step.order,
            old_target = %step.target,
            new_target = %refined.target,
            "step refined"
        );
        Ok(refined)
    }

    async fn generate_step_description(&self, step: &ActionStep, result: &StepResult) -> String {
        let messages = [Message::user(prompt::narrate_prompt(step, result))];
        match self.llm.chat(&messages).await {
            Ok(resp) if !resp.content.trim().is_empty() => resp.content.trim().to_string(),
            Ok(_) => step.description.clone(),
            Err(e) => {
                tracing::debug!(error = %e, order = step.order, "narration failed, keeping original description");
                step.description.clone()
            }
        }
    }
}
