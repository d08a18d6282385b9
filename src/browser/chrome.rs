//! Headless Chrome 驱动
//!
//! 需启用 feature "browser" 且系统已安装 Chrome/Chromium。
//! headless_chrome 为同步 API，所有调用经 spawn_blocking 执行。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use headless_chrome::protocol::cdp::Page::{CaptureScreenshotFormatOption, Viewport};
use headless_chrome::{Browser, LaunchOptions, Tab};

use super::{
    BrowserDriver, BrowserError, BrowserFactory, Element, ImageFormat, PageSnapshot,
    ScreenshotOptions,
};
use crate::domain::Cookie;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// 采集页面可交互元素，返回 JSON 字符串
const SNAPSHOT_JS: &str = r#"
(function() {
    function selectorOf(el) {
        if (el.id) return '#' + CSS.escape(el.id);
        const tag = el.tagName.toLowerCase();
        const name = el.getAttribute('name');
        if (name) return tag + "[name='" + name + "']";
        const path = [];
        let node = el;
        while (node && node.nodeType === 1 && node !== document.body) {
            let idx = 1;
            let sib = node;
            while ((sib = sib.previousElementSibling)) {
                if (sib.tagName === node.tagName) idx++;
            }
            path.unshift(node.tagName.toLowerCase() + ':nth-of-type(' + idx + ')');
            node = node.parentElement;
        }
        return 'body > ' + path.join(' > ');
    }
    const nodes = document.querySelectorAll('a, button, input, select, textarea, [role="button"], [role="link"], [onclick]');
    const out = [];
    for (const el of nodes) {
        const rect = el.getBoundingClientRect();
        const style = window.getComputedStyle(el);
        const visible = rect.width > 0 && rect.height > 0 && style.visibility !== 'hidden' && style.display !== 'none';
        const attributes = {};
        for (const key of ['id', 'name', 'type', 'placeholder', 'href', 'aria-label']) {
            const v = el.getAttribute(key);
            if (v) attributes[key] = v;
        }
        const text = (el.innerText || el.value || el.getAttribute('aria-label') || el.getAttribute('placeholder') || '').trim().substring(0, 100);
        out.push({
            tag_name: el.tagName.toLowerCase(),
            selector: selectorOf(el),
            text: text,
            attributes: attributes,
            visible: visible,
            clickable: !el.disabled,
        });
    }
    return JSON.stringify(out);
})()
"#;

struct ChromeSession {
    // Browser 进程随 session 释放
    _browser: Browser,
    tab: Arc<Tab>,
}

/// 单标签页的 Chrome 驱动
pub struct ChromeDriver {
    headless: bool,
    navigation_timeout: Duration,
    session: Mutex<Option<ChromeSession>>,
}

impl ChromeDriver {
    pub fn new(headless: bool, navigation_timeout: Duration) -> Self {
        Self {
            headless,
            navigation_timeout,
            session: Mutex::new(None),
        }
    }

    fn tab(&self) -> Result<Arc<Tab>, BrowserError> {
        let guard = self
            .session
            .lock()
            .map_err(|e| BrowserError::Operation(e.to_string()))?;
        guard
            .as_ref()
            .map(|s| Arc::clone(&s.tab))
            .ok_or(BrowserError::NotConnected)
    }

    /// 在阻塞线程池中对当前标签页执行 `f`
    async fn with_tab<T, F>(&self, f: F) -> Result<T, BrowserError>
    where
        T: Send + 'static,
        F: FnOnce(&Arc<Tab>) -> Result<T, BrowserError> + Send + 'static,
    {
        let tab = self.tab()?;
        tokio::task::spawn_blocking(move || f(&tab))
            .await
            .map_err(|e| BrowserError::Operation(format!("task join: {}", e)))?
    }

    async fn evaluate(&self, js: String) -> Result<Option<serde_json::Value>, BrowserError> {
        self.with_tab(move |tab| {
            tab.evaluate(&js, false)
                .map(|obj| obj.value)
                .map_err(|e| BrowserError::Operation(format!("evaluate failed: {}", e)))
        })
        .await
    }
}

/// 生成安全的 JS 字符串字面量
fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

fn element_error(selector: &str) -> impl FnOnce(anyhow::Error) -> BrowserError + '_ {
    move |_| BrowserError::ElementNotFound(selector.to_string())
}

fn op_error(what: &'static str) -> impl FnOnce(anyhow::Error) -> BrowserError {
    move |e| BrowserError::Operation(format!("{}: {}", what, e))
}

#[async_trait]
impl BrowserDriver for ChromeDriver {
    async fn connect(&self) -> Result<(), BrowserError> {
        if self.tab().is_ok() {
            return Ok(());
        }
        let headless = self.headless;
        let timeout = self.navigation_timeout;
        tracing::info!(headless, "launching chrome");
        let session = tokio::task::spawn_blocking(move || {
            let options = LaunchOptions::default_builder()
                .headless(headless)
                .build()
                .map_err(|e| BrowserError::Operation(format!("launch options: {}", e)))?;
            let browser = Browser::new(options)
                .map_err(|e| BrowserError::Operation(format!("chrome launch failed: {}", e)))?;
            let tab = browser.new_tab().map_err(op_error("new tab"))?;
            tab.set_default_timeout(timeout);
            Ok::<_, BrowserError>(ChromeSession {
                _browser: browser,
                tab,
            })
        })
        .await
        .map_err(|e| BrowserError::Operation(format!("task join: {}", e)))??;

        let mut guard = self
            .session
            .lock()
            .map_err(|e| BrowserError::Operation(e.to_string()))?;
        *guard = Some(session);
        Ok(())
    }

    async fn close(&self) -> Result<(), BrowserError> {
        let session = {
            let mut guard = self
                .session
                .lock()
                .map_err(|e| BrowserError::Operation(e.to_string()))?;
            guard.take()
        };
        if let Some(session) = session {
            tokio::task::spawn_blocking(move || {
                if let Err(e) = session.tab.close(false) {
                    tracing::debug!(error = %e, "tab close failed");
                }
                drop(session);
            })
            .await
            .map_err(|e| BrowserError::Operation(format!("task join: {}", e)))?;
        }
        Ok(())
    }

    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        let url = url.to_string();
        tracing::debug!(url = %url, "navigate");
        self.with_tab(move |tab| {
            tab.navigate_to(&url)
                .and_then(|t| t.wait_until_navigated())
                .map(|_| ())
                .map_err(|e| BrowserError::Navigation(format!("{}: {}", url, e)))
        })
        .await
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        self.with_tab(|tab| Ok(tab.get_url())).await
    }

    async fn title(&self) -> Result<String, BrowserError> {
        self.with_tab(|tab| tab.get_title().map_err(op_error("get title")))
            .await
    }

    async fn wait_for_navigation(&self, timeout: Duration) -> Result<(), BrowserError> {
        let fut = self.with_tab(|tab| {
            tab.wait_until_navigated()
                .map(|_| ())
                .map_err(|e| BrowserError::Navigation(e.to_string()))
        });
        match tokio::time::timeout(timeout, fut).await {
            Ok(res) => res,
            Err(_) => Err(BrowserError::Timeout(timeout, "navigation".to_string())),
        }
    }

    async fn wait_for_url(&self, pattern: &str, timeout: Duration) -> Result<(), BrowserError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.current_url().await?.contains(pattern) {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(BrowserError::Timeout(timeout, format!("url ~ {}", pattern)));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn click(&self, selector: &str) -> Result<(), BrowserError> {
        let sel = selector.to_string();
        self.with_tab(move |tab| {
            let element = tab.find_element(&sel).map_err(element_error(&sel))?;
            element.scroll_into_view().map_err(op_error("scroll into view"))?;
            element.click().map_err(op_error("click"))?;
            Ok(())
        })
        .await
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<(), BrowserError> {
        let sel = selector.to_string();
        let value = value.to_string();
        self.with_tab(move |tab| {
            let element = tab.find_element(&sel).map_err(element_error(&sel))?;
            element
                .call_js_fn("function() { this.focus(); this.value = ''; }", vec![], false)
                .map_err(op_error("clear input"))?;
            element.type_into(&value).map_err(op_error("type"))?;
            Ok(())
        })
        .await
    }

    async fn hover(&self, selector: &str) -> Result<(), BrowserError> {
        let sel = selector.to_string();
        self.with_tab(move |tab| {
            let element = tab.find_element(&sel).map_err(element_error(&sel))?;
            element.move_mouse_over().map_err(op_error("hover"))?;
            Ok(())
        })
        .await
    }

    async fn select(&self, selector: &str, value: &str) -> Result<(), BrowserError> {
        let js = format!(
            r#"(function() {{
                const el = document.querySelector({sel});
                if (!el) return false;
                el.value = {val};
                el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return true;
            }})()"#,
            sel = js_string(selector),
            val = js_string(value),
        );
        match self.evaluate(js).await? {
            Some(serde_json::Value::Bool(true)) => Ok(()),
            _ => Err(BrowserError::ElementNotFound(selector.to_string())),
        }
    }

    async fn scroll(&self, selector: Option<&str>) -> Result<(), BrowserError> {
        match selector.filter(|s| !s.is_empty()) {
            Some(sel) => {
                let sel = sel.to_string();
                self.with_tab(move |tab| {
                    let element = tab.find_element(&sel).map_err(element_error(&sel))?;
                    element.scroll_into_view().map_err(op_error("scroll"))?;
                    Ok(())
                })
                .await
            }
            None => self
                .evaluate("window.scrollBy(0, window.innerHeight)".to_string())
                .await
                .map(|_| ()),
        }
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<(), BrowserError> {
        let sel = selector.to_string();
        self.with_tab(move |tab| {
            tab.wait_for_element_with_custom_timeout(&sel, timeout)
                .map(|_| ())
                .map_err(|_| BrowserError::Timeout(timeout, sel))
        })
        .await
    }

    async fn wait_for_text(&self, text: &str, timeout: Duration) -> Result<(), BrowserError> {
        let js = format!(
            "document.body ? document.body.innerText.includes({}) : false",
            js_string(text)
        );
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(serde_json::Value::Bool(true)) = self.evaluate(js.clone()).await? {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(BrowserError::Timeout(timeout, format!("text {:?}", text)));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn snapshot(&self) -> Result<PageSnapshot, BrowserError> {
        let url = self.current_url().await?;
        let title = self.title().await.unwrap_or_default();
        let raw = self.evaluate(SNAPSHOT_JS.to_string()).await?;
        let elements: Vec<Element> = match raw {
            Some(serde_json::Value::String(json)) => serde_json::from_str(&json)
                .map_err(|e| BrowserError::Operation(format!("snapshot decode: {}", e)))?,
            _ => Vec::new(),
        };
        Ok(PageSnapshot::new(url, title, elements))
    }

    async fn screenshot(&self, options: &ScreenshotOptions) -> Result<Vec<u8>, BrowserError> {
        let options = options.clone();
        self.with_tab(move |tab| {
            let (format, quality) = match options.format {
                ImageFormat::Png => (CaptureScreenshotFormatOption::Png, None),
                ImageFormat::Jpeg => (CaptureScreenshotFormatOption::Jpeg, Some(options.quality)),
            };
            let clip = if options.full_page {
                let size = tab
                    .evaluate(
                        "JSON.stringify([document.documentElement.scrollWidth, document.documentElement.scrollHeight])",
                        false,
                    )
                    .map_err(op_error("page size"))?
                    .value
                    .and_then(|v| v.as_str().map(str::to_string))
                    .and_then(|s| serde_json::from_str::<[f64; 2]>(&s).ok());
                size.map(|[width, height]| Viewport {
                    x: 0.0,
                    y: 0.0,
                    width,
                    height,
                    scale: 1.0,
                })
            } else {
                None
            };
            tab.capture_screenshot(format, quality, clip, true)
                .map_err(op_error("screenshot"))
        })
        .await
    }

    async fn cookies(&self) -> Result<Vec<Cookie>, BrowserError> {
        self.with_tab(|tab| {
            let raw = tab.get_cookies().map_err(op_error("get cookies"))?;
            Ok(raw
                .into_iter()
                .map(|c| Cookie {
                    name: c.name,
                    value: c.value,
                    domain: c.domain,
                    path: c.path,
                    expires: if c.expires > 0.0 {
                        DateTime::from_timestamp(c.expires as i64, 0)
                    } else {
                        None
                    },
                    secure: c.secure,
                    http_only: c.http_only,
                })
                .collect())
        })
        .await
    }

    async fn set_cookies(&self, cookies: &[Cookie]) -> Result<(), BrowserError> {
        for cookie in cookies {
            let mut parts = vec![format!("{}={}", cookie.name, cookie.value)];
            if !cookie.path.is_empty() {
                parts.push(format!("path={}", cookie.path));
            }
            if !cookie.domain.is_empty() {
                parts.push(format!("domain={}", cookie.domain));
            }
            if let Some(expires) = cookie.expires {
                parts.push(format!("expires={}", expires.to_rfc2822()));
            }
            if cookie.secure {
                parts.push("secure".to_string());
            }
            let js = format!("document.cookie = {}", js_string(&parts.join("; ")));
            self.evaluate(js).await?;
        }
        Ok(())
    }

    async fn clear_cookies(&self) -> Result<(), BrowserError> {
        let js = r#"document.cookie.split(';').forEach(function(c) {
            const name = c.split('=')[0].trim();
            if (name) document.cookie = name + '=; expires=Thu, 01 Jan 1970 00:00:00 GMT; path=/';
        })"#;
        self.evaluate(js.to_string()).await.map(|_| ())
    }

    async fn set_extra_headers(&self, headers: &HashMap<String, String>) -> Result<(), BrowserError> {
        let headers = headers.clone();
        self.with_tab(move |tab| {
            let borrowed: HashMap<&str, &str> = headers
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect();
            tab.set_extra_http_headers(borrowed)
                .map_err(op_error("set extra headers"))
        })
        .await
    }
}

/// 每次创建一个新的 Chrome 实例
#[derive(Debug, Clone)]
pub struct ChromeBrowserFactory {
    pub headless: bool,
    pub navigation_timeout: Duration,
}

impl ChromeBrowserFactory {
    pub fn new(headless: bool, navigation_timeout: Duration) -> Self {
        Self {
            headless,
            navigation_timeout,
        }
    }
}

#[async_trait]
impl BrowserFactory for ChromeBrowserFactory {
    async fn create(&self) -> Result<Box<dyn BrowserDriver>, BrowserError> {
        Ok(Box::new(ChromeDriver::new(self.headless, self.navigation_timeout)))
    }
}
