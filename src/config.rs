//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `STEPDOC__*` 覆盖（双下划线表示嵌套，如 `STEPDOC__LLM__PROVIDER=anthropic`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::auth::AuthSettings;
use crate::domain::{LlmConfig, LlmProvider};
use crate::orchestrator::OrchestratorSettings;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub browser: BrowserSection,
    pub orchestrator: OrchestratorSection,
    pub auth: AuthSection,
    pub server: ServerSection,
}

/// [app] 段：应用名、产物目录
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 截图与文档写入 `<output_dir>/<task_id>/`；未设置则不落盘
    pub output_dir: Option<PathBuf>,
}

/// [llm] 段：HTTP 超时，以及任务未指定 llm 时 CLI 使用的默认模型
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_provider")]
    pub provider: LlmProvider,
    #[serde(default = "default_model")]
    pub model: String,
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_provider() -> LlmProvider {
    LlmProvider::OpenAi
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            provider: default_provider(),
            model: default_model(),
            endpoint: None,
            api_key: None,
        }
    }
}

impl LlmSection {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn to_llm_config(&self) -> LlmConfig {
        let mut cfg = LlmConfig::new(self.provider, self.model.clone());
        if let Some(endpoint) = &self.endpoint {
            cfg = cfg.with_endpoint(endpoint.clone());
        }
        if let Some(key) = self.api_key.as_ref().filter(|k| !k.is_empty()) {
            cfg = cfg.with_api_key(key.clone());
        }
        cfg
    }
}

/// [browser] 段
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserSection {
    #[serde(default = "default_true")]
    pub headless: bool,
    #[serde(default = "default_navigation_timeout_secs")]
    pub navigation_timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_navigation_timeout_secs() -> u64 {
    30
}

impl Default for BrowserSection {
    fn default() -> Self {
        Self {
            headless: true,
            navigation_timeout_secs: default_navigation_timeout_secs(),
        }
    }
}

/// [orchestrator] 段：步骤间的等待时长（毫秒 / 秒）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorSection {
    pub page_settle_ms: u64,
    pub action_settle_ms: u64,
    pub wait_sleep_ms: u64,
    pub wait_selector_timeout_secs: u64,
    pub max_snapshot_elements: usize,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            page_settle_ms: 2000,
            action_settle_ms: 500,
            wait_sleep_ms: 2000,
            wait_selector_timeout_secs: 10,
            max_snapshot_elements: 20,
        }
    }
}

/// [auth] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    pub form_timeout_secs: u64,
    pub form_settle_ms: u64,
    pub sso_redirect_timeout_secs: u64,
    pub sso_settle_ms: u64,
    pub manual_poll_ms: u64,
    pub manual_timeout_secs: u64,
    pub session_ttl_hours: i64,
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            form_timeout_secs: 10,
            form_settle_ms: 3000,
            sso_redirect_timeout_secs: 10,
            sso_settle_ms: 5000,
            manual_poll_ms: 2000,
            manual_timeout_secs: 300,
            session_ttl_hours: 24,
        }
    }
}

impl AuthSection {
    pub fn to_settings(&self) -> AuthSettings {
        AuthSettings {
            form_timeout: Duration::from_secs(self.form_timeout_secs),
            form_settle: Duration::from_millis(self.form_settle_ms),
            sso_redirect_timeout: Duration::from_secs(self.sso_redirect_timeout_secs),
            sso_settle: Duration::from_millis(self.sso_settle_ms),
            manual_poll: Duration::from_millis(self.manual_poll_ms),
            manual_timeout: Duration::from_secs(self.manual_timeout_secs),
            session_ttl: chrono::Duration::hours(self.session_ttl_hours),
        }
    }
}

/// [server] 段：HTTP API 监听地址
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

impl Default for ServerSection {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

impl AppConfig {
    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        let o = &self.orchestrator;
        OrchestratorSettings {
            page_settle: Duration::from_millis(o.page_settle_ms),
            action_settle: Duration::from_millis(o.action_settle_ms),
            wait_sleep: Duration::from_millis(o.wait_sleep_ms),
            wait_selector_timeout: Duration::from_secs(o.wait_selector_timeout_secs),
            max_snapshot_elements: o.max_snapshot_elements,
            output_dir: self.app.output_dir.clone(),
            auth: self.auth.to_settings(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 STEPDOC__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml，找到则作为第一源
/// 2. 若传入 config_path，则追加该文件（可覆盖前面的键；文件必须存在）
/// 3. 最后叠加环境变量 STEPDOC__*
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    for name in ["config/default", "../config/default"] {
        if std::path::Path::new(&format!("{}.toml", name)).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(path) = config_path {
        builder = builder.add_source(config::File::from(path).required(true));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("STEPDOC")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.llm.request_timeout_secs, 120);
        assert!(cfg.browser.headless);
        let s = cfg.orchestrator_settings();
        assert_eq!(s.page_settle, Duration::from_secs(2));
        assert_eq!(s.wait_selector_timeout, Duration::from_secs(10));
        assert_eq!(s.auth.manual_timeout, Duration::from_secs(300));
        assert_eq!(s.auth.session_ttl, chrono::Duration::hours(24));
        assert!(s.output_dir.is_none());
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[app]
output_dir = "/tmp/stepdoc-out"

[llm]
provider = "anthropic"
model = "claude-sonnet-4-20250514"

[orchestrator]
page_settle_ms = 10
"#
        )
        .unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.llm.provider, LlmProvider::Anthropic);
        assert_eq!(cfg.llm.request_timeout_secs, 120);
        assert_eq!(cfg.orchestrator.page_settle_ms, 10);
        assert_eq!(cfg.orchestrator.action_settle_ms, 500);
        assert_eq!(cfg.app.output_dir, Some(PathBuf::from("/tmp/stepdoc-out")));

        let llm = cfg.llm.to_llm_config();
        assert_eq!(llm.model, "claude-sonnet-4-20250514");
        assert!(llm.api_key.is_none());
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        assert!(load_config(Some(PathBuf::from("/nonexistent/stepdoc.toml"))).is_err());
    }
}
