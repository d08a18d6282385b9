//! Anthropic Messages API 客户端
//!
//! POST `<endpoint>/messages`，使用 `x-api-key` + `anthropic-version` 请求头而非 Bearer；
//! system 消息提升为顶层 `system` 字段，其余消息原样发送。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::domain::LlmConfig;
use crate::llm::{ChatResponse, LlmClient, LlmError, Message, Role, Usage};

pub const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    messages: Vec<&'a Message>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<MessagesUsage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct MessagesUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

/// Anthropic 客户端
pub struct AnthropicClient {
    http: Client,
    config: LlmConfig,
    endpoint: String,
}

impl AnthropicClient {
    pub fn new(config: LlmConfig, http: Client) -> Result<Self, LlmError> {
        let endpoint = config.effective_endpoint().ok_or_else(|| {
            LlmError::Config(format!("endpoint required for provider {}", config.provider))
        })?;
        Ok(Self {
            http,
            config,
            endpoint,
        })
    }

    /// 构造请求（不发送）
    pub fn build_request(&self, messages: &[Message]) -> reqwest::RequestBuilder {
        let options = self.config.options.as_ref();

        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();
        let body = MessagesRequest {
            model: &self.config.model,
            messages: messages.iter().filter(|m| m.role != Role::System).collect(),
            max_tokens: options
                .map(|o| o.max_tokens)
                .filter(|m| *m > 0)
                .unwrap_or(DEFAULT_MAX_TOKENS),
            system: (!system.is_empty()).then(|| system.join("\n\n")),
            temperature: options.map(|o| o.temperature).filter(|t| *t > 0.0),
        };

        let mut req = self
            .http
            .post(format!("{}/messages", self.endpoint))
            .header("x-api-key", self.config.api_key.as_deref().unwrap_or(""))
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body);
        if let Some(timeout) = options.map(|o| o.timeout).filter(|t| *t > 0) {
            req = req.timeout(Duration::from_secs(timeout));
        }
        req
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn chat(&self, messages: &[Message]) -> Result<ChatResponse, LlmError> {
        tracing::debug!(
            model = %self.config.model,
            endpoint = %self.endpoint,
            messages = messages.len(),
            "Anthropic messages request"
        );

        let resp = self.build_request(messages).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "Anthropic error response: {}", body);
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: MessagesResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::Decode(e.to_string()))?;

        let usage = parsed
            .usage
            .map(|u| Usage {
                prompt_tokens: u.input_tokens,
                completion_tokens: u.output_tokens,
                total_tokens: u.input_tokens + u.output_tokens,
            })
            .unwrap_or_default();

        let block = parsed
            .content
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::EmptyResponse("no content in response".to_string()))?;

        tracing::info!(
            model = %self.config.model,
            content_len = block.text.len(),
            "Anthropic response received"
        );

        Ok(ChatResponse {
            content: block.text,
            finish_reason: parsed.stop_reason,
            usage,
        })
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LlmProvider;
    use crate::llm::test_server::{serve_capture, serve_once};

    fn config() -> LlmConfig {
        LlmConfig::new(LlmProvider::Anthropic, "claude-sonnet-4-20250514").with_api_key("ak-1")
    }

    #[test]
    fn test_request_targets_messages_with_api_key_header() {
        let c = AnthropicClient::new(config(), Client::new()).unwrap();
        let req = c
            .build_request(&[Message::system("be brief"), Message::user("hi")])
            .build()
            .unwrap();
        assert_eq!(req.url().as_str(), "https://api.anthropic.com/v1/messages");
        assert_eq!(req.headers()["x-api-key"], "ak-1");
        assert_eq!(req.headers()["anthropic-version"], ANTHROPIC_VERSION);
        assert!(req.headers().get("authorization").is_none());

        let body: serde_json::Value =
            serde_json::from_slice(req.body().unwrap().as_bytes().unwrap()).unwrap();
        assert_eq!(body["max_tokens"], 4096);
        assert_eq!(body["system"], "be brief");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_chat_hits_messages_path() {
        let (endpoint, request) = serve_capture(
            200,
            r#"{"content":[{"type":"text","text":"pong"}],"stop_reason":"end_turn",
                "usage":{"input_tokens":2,"output_tokens":1}}"#,
        )
        .await;
        let c = AnthropicClient::new(config().with_endpoint(endpoint), Client::new()).unwrap();
        let resp = c.chat(&[Message::user("ping")]).await.unwrap();
        assert_eq!(resp.content, "pong");
        assert_eq!(resp.usage.total_tokens, 3);

        let raw = request.await.unwrap().to_lowercase();
        assert!(raw.starts_with("post /v1/messages "));
        assert!(raw.contains("x-api-key: ak-1"));
        assert!(!raw.contains("authorization: bearer"));
    }

    #[tokio::test]
    async fn test_empty_content_is_error() {
        let endpoint = serve_once(200, r#"{"content":[]}"#).await;
        let c = AnthropicClient::new(config().with_endpoint(endpoint), Client::new()).unwrap();
        assert!(matches!(
            c.chat(&[Message::user("hi")]).await,
            Err(LlmError::EmptyResponse(_))
        ));
    }
}
