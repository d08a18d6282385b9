//! 认证器：按 AuthConfig 策略生成浏览器可用的会话
//!
//! - `none` / `token`：不触碰浏览器
//! - `cookie`：直接注入
//! - `form` / `sso`：填写登录表单后收集 Cookie
//! - `manual`：轮询 URL 等待用户完成登录
//!
//! 所有策略都与调用方的 CancellationToken 竞争，取消时返回 `AuthError::Cancelled`。

pub mod heuristics;

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::browser::{BrowserDriver, BrowserError};
use crate::domain::{AuthConfig, Cookie, Credentials, Session, SsoConfig};

use heuristics::{
    is_login_page, is_sso_page, FORM_SUBMIT_SELECTORS, PASSWORD_SELECTOR, SSO_SUBMIT_SELECTORS,
    USERNAME_SELECTORS,
};

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("credentials are required for {0} authentication")]
    MissingCredentials(&'static str),

    #[error("sso_config is required for sso authentication")]
    MissingSsoConfig,

    #[error("no cookies supplied for cookie authentication")]
    MissingCookies,

    #[error("no token supplied for token authentication")]
    MissingToken,

    #[error("login form not found: {0}")]
    FormNotFound(String),

    #[error("manual login not completed within {0:?}")]
    ManualLoginTimeout(Duration),

    #[error("authentication cancelled")]
    Cancelled,

    #[error("browser error during authentication: {0}")]
    Browser(#[from] BrowserError),
}

/// 认证过程中的等待时长
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub form_timeout: Duration,
    pub form_settle: Duration,
    pub sso_redirect_timeout: Duration,
    pub sso_settle: Duration,
    pub manual_poll: Duration,
    pub manual_timeout: Duration,
    pub session_ttl: chrono::Duration,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            form_timeout: Duration::from_secs(10),
            form_settle: Duration::from_secs(3),
            sso_redirect_timeout: Duration::from_secs(10),
            sso_settle: Duration::from_secs(5),
            manual_poll: Duration::from_secs(2),
            manual_timeout: Duration::from_secs(300),
            session_ttl: chrono::Duration::hours(24),
        }
    }
}

/// 借用任务独占的浏览器驱动执行认证
pub struct Authenticator<'a> {
    browser: &'a dyn BrowserDriver,
    settings: AuthSettings,
}

impl<'a> Authenticator<'a> {
    pub fn new(browser: &'a dyn BrowserDriver, settings: AuthSettings) -> Self {
        Self { browser, settings }
    }

    pub async fn authenticate(
        &self,
        config: &AuthConfig,
        cancel: &CancellationToken,
    ) -> Result<Session, AuthError> {
        tracing::info!(strategy = config.kind(), "authenticating");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AuthError::Cancelled),
            res = self.dispatch(config) => res,
        }
    }

    /// 会话存在且未过期
    pub fn validate_session(&self, session: Option<&Session>) -> bool {
        session.map_or(false, |s| !s.is_expired_at(Utc::now()))
    }

    async fn dispatch(&self, config: &AuthConfig) -> Result<Session, AuthError> {
        match config {
            AuthConfig::None => Ok(self.session(Vec::new(), HashMap::new())),
            AuthConfig::Cookie { cookies } => self.cookie_auth(cookies).await,
            AuthConfig::Token { token } => self.token_auth(token),
            AuthConfig::Form { credentials } => {
                let creds = credentials
                    .as_ref()
                    .ok_or(AuthError::MissingCredentials("form"))?;
                self.form_auth(creds).await
            }
            AuthConfig::Sso {
                sso_config,
                credentials,
            } => {
                let sso = sso_config.as_ref().ok_or(AuthError::MissingSsoConfig)?;
                self.sso_auth(sso, credentials.as_ref()).await
            }
            AuthConfig::Manual => self.manual_auth().await,
        }
    }

    fn session(&self, cookies: Vec<Cookie>, headers: HashMap<String, String>) -> Session {
        Session::new(cookies, headers, self.settings.session_ttl)
    }

    async fn cookie_auth(&self, cookies: &[Cookie]) -> Result<Session, AuthError> {
        if cookies.is_empty() {
            return Err(AuthError::MissingCookies);
        }
        self.browser.set_cookies(cookies).await?;
        Ok(self.session(cookies.to_vec(), HashMap::new()))
    }

    fn token_auth(&self, token: &str) -> Result<Session, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }
        let mut headers = HashMap::new();
        headers.insert("Authorization".to_string(), format!("Bearer {}", token));
        Ok(self.session(Vec::new(), headers))
    }

    async fn form_auth(&self, creds: &Credentials) -> Result<Session, AuthError> {
        self.browser
            .wait_for_selector(PASSWORD_SELECTOR, self.settings.form_timeout)
            .await
            .map_err(|e| AuthError::FormNotFound(e.to_string()))?;

        self.fill_and_submit(creds, FORM_SUBMIT_SELECTORS).await?;
        tokio::time::sleep(self.settings.form_settle).await;
        self.harvest().await
    }

    async fn sso_auth(
        &self,
        sso: &SsoConfig,
        creds: Option<&Credentials>,
    ) -> Result<Session, AuthError> {
        if let Err(e) = self
            .browser
            .wait_for_navigation(self.settings.sso_redirect_timeout)
            .await
        {
            tracing::debug!(error = %e, "no sso redirect observed");
        }

        let url = self.browser.current_url().await?;
        if is_sso_page(&url, sso) {
            match creds {
                Some(creds) => {
                    tracing::info!(provider = ?sso.provider, url = %url, "on sso login page, submitting credentials");
                    self.fill_and_submit(creds, SSO_SUBMIT_SELECTORS).await?;
                }
                None => tracing::warn!(url = %url, "on sso login page but no credentials supplied"),
            }
        }

        tokio::time::sleep(self.settings.sso_settle).await;
        self.harvest().await
    }

    async fn manual_auth(&self) -> Result<Session, AuthError> {
        let deadline = tokio::time::Instant::now() + self.settings.manual_timeout;
        tracing::info!(timeout = ?self.settings.manual_timeout, "waiting for manual login");
        loop {
            let url = self.browser.current_url().await?;
            if !is_login_page(&url) {
                tracing::info!(url = %url, "manual login completed");
                return self.harvest().await;
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(AuthError::ManualLoginTimeout(self.settings.manual_timeout));
            }
            tokio::time::sleep(self.settings.manual_poll).await;
        }
    }

    /// 依次尝试用户名候选，填写密码，再依次尝试提交按钮
    async fn fill_and_submit(
        &self,
        creds: &Credentials,
        submit_selectors: &[&str],
    ) -> Result<(), AuthError> {
        let mut filled = false;
        for sel in USERNAME_SELECTORS {
            if self.browser.fill(sel, &creds.username).await.is_ok() {
                filled = true;
                break;
            }
        }
        if !filled {
            tracing::warn!("no username field matched");
        }

        self.browser.fill(PASSWORD_SELECTOR, &creds.password).await?;

        for sel in submit_selectors {
            if self.browser.click(sel).await.is_ok() {
                return Ok(());
            }
        }
        tracing::warn!("no submit button matched");
        Ok(())
    }

    async fn harvest(&self) -> Result<Session, AuthError> {
        let cookies = self.browser.cookies().await?;
        tracing::debug!(count = cookies.len(), "harvested cookies");
        Ok(self.session(cookies, HashMap::new()))
    }
}
