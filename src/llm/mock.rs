//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 按顺序返回预置的回复或错误，并记录每次请求的消息列表；队列耗尽后返回 EmptyResponse。

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::llm::{ChatResponse, LlmClient, LlmError, Message};

#[derive(Debug)]
enum Scripted {
    Reply(String),
    Error(String),
}

/// 脚本化 Mock 客户端；Clone 后共享同一队列与请求记录
#[derive(Debug, Clone, Default)]
pub struct MockLlmClient {
    script: Arc<Mutex<VecDeque<Scripted>>>,
    requests: Arc<Mutex<Vec<Vec<Message>>>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一条成功回复
    pub fn with_reply(self, content: impl Into<String>) -> Self {
        self.push(Scripted::Reply(content.into()));
        self
    }

    /// 追加一次失败（以 API 500 形式返回）
    pub fn with_error(self, message: impl Into<String>) -> Self {
        self.push(Scripted::Error(message.into()));
        self
    }

    fn push(&self, item: Scripted) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(item);
        }
    }

    /// 已收到的请求（每次 chat 一项）
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn chat(&self, messages: &[Message]) -> Result<ChatResponse, LlmError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(messages.to_vec());
        }
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        match next {
            Some(Scripted::Reply(content)) => Ok(ChatResponse {
                content,
                finish_reason: Some("stop".to_string()),
                ..Default::default()
            }),
            Some(Scripted::Error(body)) => Err(LlmError::Api { status: 500, body }),
            None => Err(LlmError::EmptyResponse("mock script exhausted".to_string())),
        }
    }

    fn endpoint(&self) -> &str {
        "mock://llm"
    }

    fn model(&self) -> &str {
        "mock"
    }
}
