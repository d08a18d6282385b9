//! 浏览器驱动抽象
//!
//! 核心只依赖 BrowserDriver trait：导航、元素操作、等待、快照、截图、Cookie。
//! 每个任务通过 BrowserFactory 独占一个驱动实例，任务结束即关闭。
//! - `mock`: 可编排失败的内存实现（测试用）
//! - `chrome`: Headless Chrome 实现（feature "browser"）

#[cfg(feature = "browser")]
pub mod chrome;
pub mod mock;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::Cookie;

#[cfg(feature = "browser")]
pub use chrome::{ChromeBrowserFactory, ChromeDriver};
pub use mock::MockBrowser;

/// 浏览器操作错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BrowserError {
    #[error("browser not connected")]
    NotConnected,

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("timed out after {0:?} waiting for {1}")]
    Timeout(Duration, String),

    #[error("browser operation failed: {0}")]
    Operation(String),
}

/// 页面可交互元素
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub tag_name: String,
    pub selector: String,
    pub text: String,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    #[serde(default)]
    pub visible: bool,
    #[serde(default)]
    pub clickable: bool,
}

/// 页面快照：规划与修复时的页面上下文
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub url: String,
    pub title: String,
    pub elements: Vec<Element>,
    pub timestamp: DateTime<Utc>,
}

impl PageSnapshot {
    pub fn new(url: impl Into<String>, title: impl Into<String>, elements: Vec<Element>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            elements,
            timestamp: Utc::now(),
        }
    }
}

/// 截图选项
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScreenshotOptions {
    pub full_page: bool,
    /// 1-100，仅对 jpeg 生效
    pub quality: u32,
    pub format: ImageFormat,
}

impl Default for ScreenshotOptions {
    fn default() -> Self {
        Self {
            full_page: false,
            quality: 90,
            format: ImageFormat::Png,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpeg,
}

/// 浏览器驱动：所有操作为请求/响应式
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn connect(&self) -> Result<(), BrowserError>;
    async fn close(&self) -> Result<(), BrowserError>;

    async fn navigate(&self, url: &str) -> Result<(), BrowserError>;
    async fn current_url(&self) -> Result<String, BrowserError>;
    async fn title(&self) -> Result<String, BrowserError>;
    async fn wait_for_navigation(&self, timeout: Duration) -> Result<(), BrowserError>;
    /// 等待当前 URL 包含 `pattern`
    async fn wait_for_url(&self, pattern: &str, timeout: Duration) -> Result<(), BrowserError>;

    async fn click(&self, selector: &str) -> Result<(), BrowserError>;
    async fn fill(&self, selector: &str, value: &str) -> Result<(), BrowserError>;
    async fn hover(&self, selector: &str) -> Result<(), BrowserError>;
    async fn select(&self, selector: &str, value: &str) -> Result<(), BrowserError>;
    /// 滚动到元素；selector 为空时整页下滚一屏
    async fn scroll(&self, selector: Option<&str>) -> Result<(), BrowserError>;

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<(), BrowserError>;
    async fn wait_for_text(&self, text: &str, timeout: Duration) -> Result<(), BrowserError>;

    async fn snapshot(&self) -> Result<PageSnapshot, BrowserError>;
    async fn screenshot(&self, options: &ScreenshotOptions) -> Result<Vec<u8>, BrowserError>;

    async fn cookies(&self) -> Result<Vec<Cookie>, BrowserError>;
    async fn set_cookies(&self, cookies: &[Cookie]) -> Result<(), BrowserError>;
    async fn clear_cookies(&self) -> Result<(), BrowserError>;
    /// 后续所有请求附带的额外请求头（Token 认证）
    async fn set_extra_headers(&self, headers: &HashMap<String, String>) -> Result<(), BrowserError>;
}

/// 为每个任务创建独立的驱动实例
#[async_trait]
pub trait BrowserFactory: Send + Sync {
    async fn create(&self) -> Result<Box<dyn BrowserDriver>, BrowserError>;
}
