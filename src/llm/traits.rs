//! LLM 客户端抽象
//!
//! 每种线上格式一个适配器（OpenAI 兼容 / Anthropic），都实现 LlmClient：
//! chat（统一消息列表 → 统一响应）与 validate（一次最小往返，用于检查连通性与凭据）。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Token 使用量
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// 统一响应
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
    pub finish_reason: Option<String>,
    pub usage: Usage,
}

/// LLM 调用错误
#[derive(Error, Debug)]
pub enum LlmError {
    /// 非 2xx 响应
    #[error("API error: {status} - {body}")]
    Api { status: u16, body: String },

    /// 响应中没有 choice / content block
    #[error("empty response: {0}")]
    EmptyResponse(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("decode response: {0}")]
    Decode(String),

    /// 配置无法构造客户端（缺少端点、模型等）
    #[error("invalid LLM config: {0}")]
    Config(String),
}

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 发送对话，返回首条回复
    async fn chat(&self, messages: &[Message]) -> Result<ChatResponse, LlmError>;

    /// 最小往返：仅用于确认端点可达、凭据有效
    async fn validate(&self) -> Result<(), LlmError> {
        self.chat(&[Message::user("hi")]).await.map(|_| ())
    }

    /// 实际请求的端点（已应用默认值）
    fn endpoint(&self) -> &str;

    fn model(&self) -> &str;
}
