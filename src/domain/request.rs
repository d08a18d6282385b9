//! 任务提交请求：CLI 的 task.json 与 HTTP API 共用

use serde::Deserialize;

use super::{AuthConfig, LlmConfig, OutputConfig, Task};

#[derive(Clone, Debug, Deserialize)]
pub struct TaskRequest {
    pub description: String,
    pub target_url: String,
    #[serde(default)]
    pub auth: Option<AuthConfig>,
    /// 缺省时使用配置文件中的默认模型
    #[serde(default)]
    pub llm: Option<LlmConfig>,
    #[serde(default)]
    pub output: Option<OutputConfig>,
}

impl TaskRequest {
    /// 基本校验；错误信息直接面向调用方
    pub fn validate(&self) -> Result<(), String> {
        if self.description.trim().is_empty() {
            return Err("description is required".to_string());
        }
        let url = self.target_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(format!("target_url must be an http(s) URL: {:?}", url));
        }
        if let Some(llm) = &self.llm {
            if llm.model.trim().is_empty() {
                return Err("llm.model is required".to_string());
            }
        }
        Ok(())
    }

    pub fn into_task(self, default_llm: &LlmConfig) -> Task {
        let llm = self.llm.unwrap_or_else(|| default_llm.clone());
        let mut task = Task::new(self.description.trim(), self.target_url.trim(), llm);
        task.auth = self.auth;
        if let Some(output) = self.output {
            task.output = output;
        }
        task
    }
}
