//! LLM 层：客户端抽象、OpenAI 兼容 / Anthropic 适配器、工厂与 Mock

pub mod anthropic;
pub mod factory;
pub mod mock;
pub mod openai;
pub mod traits;

pub use anthropic::AnthropicClient;
pub use factory::{ClientFactory, LlmClientFactory};
pub use mock::MockLlmClient;
pub use openai::OpenAiCompatibleClient;
pub use traits::{ChatResponse, LlmClient, LlmError, Message, Role, Usage};
