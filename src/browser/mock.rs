//! 内存浏览器驱动（测试用）
//!
//! 记录每次调用；可指定失败的选择器、导航失败、URL 轮询序列。Clone 后共享状态，
//! 因此同一实例既可作为 BrowserFactory 交给 Orchestrator，也可在测试中检查调用记录。

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use super::{BrowserDriver, BrowserError, BrowserFactory, Element, PageSnapshot, ScreenshotOptions};
use crate::domain::Cookie;

#[derive(Debug, Default)]
struct MockState {
    connected: bool,
    closed: bool,
    fail_connect: bool,
    fail_navigation: bool,
    current_url: String,
    url_script: VecDeque<String>,
    title: String,
    elements: Vec<Element>,
    failing_selectors: HashSet<String>,
    page_cookies: Vec<Cookie>,
    injected_cookies: Vec<Cookie>,
    headers: HashMap<String, String>,
    calls: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MockBrowser {
    state: Arc<Mutex<MockState>>,
}

impl MockBrowser {
    pub fn new() -> Self {
        let browser = Self::default();
        browser.lock().title = "Mock Page".to_string();
        browser
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// 对该选择器的任何元素操作 / 等待都返回 ElementNotFound
    pub fn fail_selector(self, selector: impl Into<String>) -> Self {
        self.lock().failing_selectors.insert(selector.into());
        self
    }

    pub fn fail_navigation(self) -> Self {
        self.lock().fail_navigation = true;
        self
    }

    pub fn fail_connect(self) -> Self {
        self.lock().fail_connect = true;
        self
    }

    /// 依次作为 current_url 的返回值；耗尽后保持最后一个
    pub fn with_urls<I, S>(self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lock().url_script = urls.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_elements(self, elements: Vec<Element>) -> Self {
        self.lock().elements = elements;
        self
    }

    /// 页面登录后“产生”的 Cookie，由 cookies() 返回
    pub fn with_page_cookies(self, cookies: Vec<Cookie>) -> Self {
        self.lock().page_cookies = cookies;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// 以 `prefix` 开头的调用记录
    pub fn calls_matching(&self, prefix: &str) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn injected_cookies(&self) -> Vec<Cookie> {
        self.lock().injected_cookies.clone()
    }

    pub fn extra_headers(&self) -> HashMap<String, String> {
        self.lock().headers.clone()
    }

    fn element_op(&self, call: String, selector: &str) -> Result<(), BrowserError> {
        let mut state = self.lock();
        state.calls.push(call);
        if !state.connected {
            return Err(BrowserError::NotConnected);
        }
        if state.failing_selectors.contains(selector) {
            return Err(BrowserError::ElementNotFound(selector.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl BrowserDriver for MockBrowser {
    async fn connect(&self) -> Result<(), BrowserError> {
        let mut state = self.lock();
        state.calls.push("connect".to_string());
        if state.fail_connect {
            return Err(BrowserError::Operation("chrome launch failed".to_string()));
        }
        state.connected = true;
        Ok(())
    }

    async fn close(&self) -> Result<(), BrowserError> {
        let mut state = self.lock();
        state.calls.push("close".to_string());
        state.connected = false;
        state.closed = true;
        Ok(())
    }

    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        let mut state = self.lock();
        state.calls.push(format!("navigate:{}", url));
        if state.fail_navigation {
            return Err(BrowserError::Navigation(format!("net::ERR_NAME_NOT_RESOLVED {}", url)));
        }
        state.current_url = url.to_string();
        Ok(())
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        let mut state = self.lock();
        state.calls.push("current_url".to_string());
        if let Some(next) = state.url_script.pop_front() {
            state.current_url = next;
        }
        Ok(state.current_url.clone())
    }

    async fn title(&self) -> Result<String, BrowserError> {
        Ok(self.lock().title.clone())
    }

    async fn wait_for_navigation(&self, _timeout: Duration) -> Result<(), BrowserError> {
        self.lock().calls.push("wait_for_navigation".to_string());
        Ok(())
    }

    async fn wait_for_url(&self, pattern: &str, timeout: Duration) -> Result<(), BrowserError> {
        let state = self.lock();
        if state.current_url.contains(pattern) {
            Ok(())
        } else {
            Err(BrowserError::Timeout(timeout, format!("url ~ {}", pattern)))
        }
    }

    async fn click(&self, selector: &str) -> Result<(), BrowserError> {
        self.element_op(format!("click:{}", selector), selector)
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<(), BrowserError> {
        self.element_op(format!("fill:{}={}", selector, value), selector)
    }

    async fn hover(&self, selector: &str) -> Result<(), BrowserError> {
        self.element_op(format!("hover:{}", selector), selector)
    }

    async fn select(&self, selector: &str, value: &str) -> Result<(), BrowserError> {
        self.element_op(format!("select:{}={}", selector, value), selector)
    }

    async fn scroll(&self, selector: Option<&str>) -> Result<(), BrowserError> {
        let selector = selector.unwrap_or("");
        self.element_op(format!("scroll:{}", selector), selector)
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<(), BrowserError> {
        let mut state = self.lock();
        state.calls.push(format!("wait_for_selector:{}", selector));
        if state.failing_selectors.contains(selector) {
            return Err(BrowserError::Timeout(timeout, selector.to_string()));
        }
        Ok(())
    }

    async fn wait_for_text(&self, text: &str, _timeout: Duration) -> Result<(), BrowserError> {
        self.lock().calls.push(format!("wait_for_text:{}", text));
        Ok(())
    }

    async fn snapshot(&self) -> Result<PageSnapshot, BrowserError> {
        let mut state = self.lock();
        state.calls.push("snapshot".to_string());
        if !state.connected {
            return Err(BrowserError::NotConnected);
        }
        Ok(PageSnapshot::new(
            state.current_url.clone(),
            state.title.clone(),
            state.elements.clone(),
        ))
    }

    async fn screenshot(&self, _options: &ScreenshotOptions) -> Result<Vec<u8>, BrowserError> {
        self.lock().calls.push("screenshot".to_string());
        Ok(vec![0x89, b'P', b'N', b'G'])
    }

    async fn cookies(&self) -> Result<Vec<Cookie>, BrowserError> {
        let state = self.lock();
        let mut cookies = state.page_cookies.clone();
        cookies.extend(state.injected_cookies.iter().cloned());
        Ok(cookies)
    }

    async fn set_cookies(&self, cookies: &[Cookie]) -> Result<(), BrowserError> {
        let mut state = self.lock();
        state.calls.push(format!("set_cookies:{}", cookies.len()));
        state.injected_cookies.extend(cookies.iter().cloned());
        Ok(())
    }

    async fn clear_cookies(&self) -> Result<(), BrowserError> {
        let mut state = self.lock();
        state.page_cookies.clear();
        state.injected_cookies.clear();
        Ok(())
    }

    async fn set_extra_headers(&self, headers: &HashMap<String, String>) -> Result<(), BrowserError> {
        let mut state = self.lock();
        state.calls.push(format!("set_extra_headers:{}", headers.len()));
        state.headers.extend(headers.clone());
        Ok(())
    }
}

#[async_trait]
impl BrowserFactory for MockBrowser {
    async fn create(&self) -> Result<Box<dyn BrowserDriver>, BrowserError> {
        Ok(Box::new(self.clone()))
    }
}
