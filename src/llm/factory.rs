//! 客户端工厂：按 provider 的线上格式选择适配器
//!
//! 新增提供商只需新增适配器并在 `WireShape` 上分派，不需要改动 Planner 或 Orchestrator。

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;

use crate::domain::{LlmConfig, WireShape};
use crate::llm::{AnthropicClient, LlmClient, LlmError, OpenAiCompatibleClient};

/// 根据 LlmConfig 构造客户端的能力；Orchestrator 通过它为每个任务创建 LLM 客户端
pub trait ClientFactory: Send + Sync {
    fn create(&self, config: &LlmConfig) -> Result<Arc<dyn LlmClient>, LlmError>;
}

impl<F> ClientFactory for F
where
    F: Fn(&LlmConfig) -> Result<Arc<dyn LlmClient>, LlmError> + Send + Sync,
{
    fn create(&self, config: &LlmConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
        self(config)
    }
}

/// 默认工厂：所有客户端共享一个带超时的 HTTP Client
#[derive(Clone)]
pub struct LlmClientFactory {
    http: Client,
}

impl LlmClientFactory {
    pub fn new(request_timeout: Duration) -> Result<Self, LlmError> {
        let http = Client::builder().timeout(request_timeout).build()?;
        Ok(Self { http })
    }
}

impl ClientFactory for LlmClientFactory {
    fn create(&self, config: &LlmConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
        if config.model.trim().is_empty() {
            return Err(LlmError::Config("model is required".to_string()));
        }
        tracing::info!(provider = %config.provider, model = %config.model, "Creating LLM client");
        let client: Arc<dyn LlmClient> = match config.provider.wire_shape() {
            WireShape::Anthropic => {
                Arc::new(AnthropicClient::new(config.clone(), self.http.clone())?)
            }
            WireShape::OpenAiCompatible => {
                Arc::new(OpenAiCompatibleClient::new(config.clone(), self.http.clone())?)
            }
        };
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LlmProvider;

    fn factory() -> LlmClientFactory {
        LlmClientFactory::new(Duration::from_secs(120)).unwrap()
    }

    #[test]
    fn test_openai_blank_endpoint_defaults() {
        let client = factory()
            .create(&LlmConfig::new(LlmProvider::OpenAi, "gpt-4o"))
            .unwrap();
        assert_eq!(client.endpoint(), "https://api.openai.com/v1");
        assert_eq!(client.model(), "gpt-4o");
    }

    #[test]
    fn test_anthropic_gets_anthropic_endpoint() {
        let client = factory()
            .create(&LlmConfig::new(LlmProvider::Anthropic, "claude-sonnet-4-20250514"))
            .unwrap();
        assert_eq!(client.endpoint(), "https://api.anthropic.com/v1");
    }

    #[test]
    fn test_missing_model_rejected() {
        let err = factory()
            .create(&LlmConfig::new(LlmProvider::OpenAi, " "))
            .err()
            .unwrap();
        assert!(matches!(err, LlmError::Config(_)));
    }

    #[test]
    fn test_custom_needs_endpoint() {
        let f = factory();
        assert!(f.create(&LlmConfig::new(LlmProvider::Custom, "m")).is_err());
        let client = f
            .create(&LlmConfig::new(LlmProvider::Custom, "m").with_endpoint("http://10.0.0.2:8080/v1"))
            .unwrap();
        assert_eq!(client.endpoint(), "http://10.0.0.2:8080/v1");
    }
}
