//! OpenAI 兼容客户端
//!
//! POST `<endpoint>/chat/completions`，Bearer 鉴权；覆盖 OpenAI、DeepSeek、通义千问、Moonshot、
//! Ollama 及自建代理等所有非 Anthropic 提供商。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::domain::LlmConfig;
use crate::llm::{ChatResponse, LlmClient, LlmError, Message, Usage};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<CompletionUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

/// OpenAI 兼容客户端：持有共享 HTTP Client 与已解析端点的配置
pub struct OpenAiCompatibleClient {
    http: Client,
    config: LlmConfig,
    endpoint: String,
}

impl OpenAiCompatibleClient {
    /// 端点留空时按 provider 取默认值；无默认值（如 custom）时报配置错误
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

    /// 构造请求（不发送），便于检查 URL 与请求头
    pub fn build_request(&self, messages: &[Message]) -> reqwest::RequestBuilder {
        let options = self.config.options.as_ref();
        let body = ChatRequest {
            model: &self.config.model,
            messages,
            temperature: options.map(|o| o.temperature).filter(|t| *t > 0.0),
            max_tokens: options.map(|o| o.max_tokens).filter(|m| *m > 0),
        };

        let mut req = self
            .http
            .post(format!("{}/chat/completions", self.endpoint))
            .json(&body);
        if let Some(key) = self.config.api_key.as_deref().filter(|k| !k.is_empty()) {
            req = req.bearer_auth(key);
        }
        if let Some(timeout) = options.map(|o| o.timeout).filter(|t| *t > 0) {
            req = req.timeout(Duration::from_secs(timeout));
        }
        req
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn chat(&self, messages: &[Message]) -> Result<ChatResponse, LlmError> {
        tracing::debug!(
            provider = %self.config.provider,
            model = %self.config.model,
            endpoint = %self.endpoint,
            messages = messages.len(),
            "LLM chat request"
        );

        let resp = self.build_request(messages).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "LLM error response: {}", body);
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let completion: ChatCompletion = resp
            .json()
            .await
            .map_err(|e| LlmError::Decode(e.to_string()))?;

        let usage = completion
            .usage
            .map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::EmptyResponse("no choices in response".to_string()))?;
        let content = choice.message.content.unwrap_or_default();

        tracing::info!(
            model = %self.config.model,
            content_len = content.len(),
            total_tokens = usage.total_tokens,
            "LLM response received"
        );

        Ok(ChatResponse {
            content,
            finish_reason: choice.finish_reason,
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
    use crate::domain::{LlmOptions, LlmProvider};
    use crate::llm::test_server::serve_once;

    fn client(config: LlmConfig) -> OpenAiCompatibleClient {
        OpenAiCompatibleClient::new(config, Client::new()).unwrap()
    }

    #[test]
    fn test_blank_endpoint_defaults_per_provider() {
        let c = client(LlmConfig::new(LlmProvider::OpenAi, "gpt-4o"));
        assert_eq!(c.endpoint(), "https://api.openai.com/v1");
        let c = client(LlmConfig::new(LlmProvider::Moonshot, "moonshot-v1-8k"));
        assert_eq!(c.endpoint(), "https://api.moonshot.cn/v1");
    }

    #[test]
    fn test_custom_without_endpoint_is_config_error() {
        let err = OpenAiCompatibleClient::new(LlmConfig::new(LlmProvider::Custom, "m"), Client::new())
            .err()
            .unwrap();
        assert!(matches!(err, LlmError::Config(_)));
    }

    #[test]
    fn test_request_uses_bearer_and_chat_completions() {
        let c = client(LlmConfig::new(LlmProvider::DeepSeek, "deepseek-chat").with_api_key("sk-1"));
        let req = c.build_request(&[Message::user("hi")]).build().unwrap();
        assert_eq!(req.url().as_str(), "https://api.deepseek.com/v1/chat/completions");
        assert_eq!(req.headers()["authorization"], "Bearer sk-1");
    }

    #[test]
    fn test_request_body_omits_non_positive_options() {
        let opts = LlmOptions {
            temperature: 0.0,
            max_tokens: 256,
            ..Default::default()
        };
        let c = client(LlmConfig::new(LlmProvider::OpenAi, "gpt-4o").with_options(opts));
        let req = c.build_request(&[Message::user("hi")]).build().unwrap();
        let body: serde_json::Value =
            serde_json::from_slice(req.body().unwrap().as_bytes().unwrap()).unwrap();
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["max_tokens"], 256);
        assert!(body.get("temperature").is_none());
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[tokio::test]
    async fn test_non_2xx_is_api_error() {
        let endpoint = serve_once(401, r#"{"error":"bad key"}"#).await;
        let c = client(LlmConfig::new(LlmProvider::OpenAi, "gpt-4o").with_endpoint(endpoint));
        match c.chat(&[Message::user("hi")]).await {
            Err(LlmError::Api { status, body }) => {
                assert_eq!(status, 401);
                assert!(body.contains("bad key"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_no_choices_is_empty_response() {
        let endpoint = serve_once(200, r#"{"choices":[]}"#).await;
        let c = client(LlmConfig::new(LlmProvider::Ollama, "llama3.1").with_endpoint(endpoint));
        let err = c.chat(&[Message::user("hi")]).await.unwrap_err();
        assert!(matches!(err, LlmError::EmptyResponse(_)));
    }

    #[tokio::test]
    async fn test_first_choice_is_returned() {
        let endpoint = serve_once(
            200,
            r#"{"choices":[{"message":{"content":"hello"},"finish_reason":"stop"}],
                "usage":{"prompt_tokens":3,"completion_tokens":1,"total_tokens":4}}"#,
        )
        .await;
        let c = client(LlmConfig::new(LlmProvider::OpenAi, "gpt-4o").with_endpoint(endpoint));
        let resp = c.chat(&[Message::user("hi")]).await.unwrap();
        assert_eq!(resp.content, "hello");
        assert_eq!(resp.finish_reason.as_deref(), Some("stop"));
        assert_eq!(resp.usage.total_tokens, 4);
    }
}
