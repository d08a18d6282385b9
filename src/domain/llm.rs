//! LLM 配置：提供商、模型、端点与可调参数；预设表

use serde::{Deserialize, Serialize};

/// LLM 提供商
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LlmProvider {
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "anthropic")]
    Anthropic,
    #[serde(rename = "azure")]
    Azure,
    #[serde(rename = "google")]
    Google,
    #[serde(rename = "deepseek")]
    DeepSeek,
    #[serde(rename = "qwen")]
    Qwen,
    #[serde(rename = "zhipu")]
    Zhipu,
    #[serde(rename = "moonshot")]
    Moonshot,
    #[serde(rename = "ollama")]
    Ollama,
    #[serde(rename = "local_proxy")]
    LocalProxy,
    #[serde(rename = "custom")]
    Custom,
}

/// 请求/响应的线上格式
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WireShape {
    /// `/chat/completions` + Bearer
    OpenAiCompatible,
    /// `/messages` + x-api-key + anthropic-version
    Anthropic,
}

impl LlmProvider {
    pub fn wire_shape(self) -> WireShape {
        match self {
            Self::Anthropic => WireShape::Anthropic,
            Self::OpenAi
            | Self::Azure
            | Self::Google
            | Self::DeepSeek
            | Self::Qwen
            | Self::Zhipu
            | Self::Moonshot
            | Self::Ollama
            | Self::LocalProxy
            | Self::Custom => WireShape::OpenAiCompatible,
        }
    }

    /// 端点留空时使用的默认地址；无已知默认值时返回 None
    pub fn default_endpoint(self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some("https://api.openai.com/v1"),
            Self::Anthropic => Some("https://api.anthropic.com/v1"),
            Self::DeepSeek => Some("https://api.deepseek.com/v1"),
            Self::Qwen => Some("https://dashscope.aliyuncs.com/compatible-mode/v1"),
            Self::Zhipu => Some("https://open.bigmodel.cn/api/paas/v4"),
            Self::Moonshot => Some("https://api.moonshot.cn/v1"),
            Self::Ollama => Some("http://localhost:11434/v1"),
            Self::LocalProxy => Some("http://localhost:8000/v1"),
            Self::Azure | Self::Google | Self::Custom => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Azure => "azure",
            Self::Google => "google",
            Self::DeepSeek => "deepseek",
            Self::Qwen => "qwen",
            Self::Zhipu => "zhipu",
            Self::Moonshot => "moonshot",
            Self::Ollama => "ollama",
            Self::LocalProxy => "local_proxy",
            Self::Custom => "custom",
        }
    }
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 任务级 LLM 配置
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub model: String,
    /// 为空时按 provider 取默认端点
    #[serde(default)]
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<LlmOptions>,
}

impl LlmConfig {
    pub fn new(provider: LlmProvider, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            endpoint: String::new(),
            api_key: None,
            options: None,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_options(mut self, options: LlmOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// 实际生效的端点（去掉末尾 `/`）；未配置且无默认值时为 None
    pub fn effective_endpoint(&self) -> Option<String> {
        let endpoint = self.endpoint.trim();
        let endpoint = if endpoint.is_empty() {
            self.provider.default_endpoint()?
        } else {
            endpoint
        };
        Some(endpoint.trim_end_matches('/').to_string())
    }
}

/// LLM 高级选项；非正数的 temperature / max_tokens 不会发送
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmOptions {
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
    pub frequency_penalty: f64,
    pub presence_penalty: f64,
    /// 单次请求超时（秒），0 表示使用全局默认值
    pub timeout: u64,
    /// 仅保留配置兼容，不会触发自动重试
    pub retry_count: u32,
}

impl Default for LlmOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 4096,
            top_p: 1.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            timeout: 60,
            retry_count: 3,
        }
    }
}

/// 提供商预设（供前端选择）
#[derive(Clone, Debug, Serialize)]
pub struct LlmPreset {
    pub provider: LlmProvider,
    pub name: &'static str,
    pub default_model: &'static str,
    pub available_models: Vec<&'static str>,
    pub default_endpoint: &'static str,
    pub requires_api_key: bool,
}

/// 所有内置预设
pub fn presets() -> Vec<LlmPreset> {
    let preset = |provider: LlmProvider,
                  name: &'static str,
                  default_model: &'static str,
                  available_models: Vec<&'static str>,
                  requires_api_key: bool| LlmPreset {
        provider,
        name,
        default_model,
        available_models,
        default_endpoint: provider.default_endpoint().unwrap_or(""),
        requires_api_key,
    };

    vec![
        preset(
            LlmProvider::OpenAi,
            "OpenAI",
            "gpt-4o",
            vec!["gpt-4o", "gpt-4o-mini", "gpt-4-turbo", "gpt-3.5-turbo"],
            true,
        ),
        preset(
            LlmProvider::Anthropic,
            "Anthropic (Claude)",
            "claude-sonnet-4-20250514",
            vec![
                "claude-sonnet-4-20250514",
                "claude-opus-4-20250514",
                "claude-3-5-sonnet-20241022",
            ],
            true,
        ),
        preset(
            LlmProvider::DeepSeek,
            "DeepSeek",
            "deepseek-chat",
            vec!["deepseek-chat", "deepseek-coder"],
            true,
        ),
        preset(
            LlmProvider::Qwen,
            "通义千问",
            "qwen-max",
            vec!["qwen-max", "qwen-plus", "qwen-turbo"],
            true,
        ),
        preset(
            LlmProvider::Moonshot,
            "Moonshot (Kimi)",
            "moonshot-v1-8k",
            vec!["moonshot-v1-8k", "moonshot-v1-32k", "moonshot-v1-128k"],
            true,
        ),
        preset(
            LlmProvider::Ollama,
            "Ollama (本地)",
            "llama3.1",
            vec!["llama3.1", "qwen2.5", "mistral", "codellama", "deepseek-coder"],
            false,
        ),
        preset(LlmProvider::LocalProxy, "本地代理", "", vec![], false),
        preset(LlmProvider::Custom, "自定义 (OpenAI 兼容)", "", vec![], false),
    ]
}
