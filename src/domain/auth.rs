//! 认证配置与会话
//!
//! AuthConfig 是带标签的枚举（JSON 中以 `type` 区分），每种策略只携带自身需要的字段。

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// 认证配置：每个任务恰好一种策略
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthConfig {
    /// 无需认证
    None,
    /// 表单登录
    Form {
        #[serde(default)]
        credentials: Option<Credentials>,
    },
    /// SSO 单点登录；凭据可选（已登录的 IdP 会直接回调）
    Sso {
        #[serde(default)]
        sso_config: Option<SsoConfig>,
        #[serde(default)]
        credentials: Option<Credentials>,
    },
    /// 用户在浏览器中手动完成登录
    Manual,
    /// 直接注入 Cookie
    Cookie {
        #[serde(default)]
        cookies: Vec<Cookie>,
    },
    /// Bearer Token
    Token {
        #[serde(default)]
        token: String,
    },
}

impl AuthConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Form { .. } => "form",
            Self::Sso { .. } => "sso",
            Self::Manual => "manual",
            Self::Cookie { .. } => "cookie",
            Self::Token { .. } => "token",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// 登录凭据
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// SSO 提供商
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SsoProvider {
    #[default]
    Generic,
    Oauth2,
    Saml,
    Oidc,
    Cas,
}

/// SSO 配置
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SsoConfig {
    #[serde(default)]
    pub provider: SsoProvider,
    /// 登录页 URL（或其片段），用于判断是否停留在 SSO 页
    #[serde(default)]
    pub login_url: Option<String>,
    #[serde(default)]
    pub callback_url: Option<String>,
    /// 额外的 SSO 页特征子串；为空时使用内置特征
    #[serde(default)]
    pub indicators: Vec<String>,
}

/// HTTP Cookie
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            path: "/".to_string(),
            ..Default::default()
        }
    }
}

/// 认证会话：Cookie 和/或请求头 + 过期时间，仅在任务生命周期内存在
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub cookies: Vec<Cookie>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(cookies: Vec<Cookie>, headers: HashMap<String, String>, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            cookies,
            headers,
            expires_at: now + ttl,
            created_at: now,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_config_tagged_json() {
        let cfg: AuthConfig = serde_json::from_str(
            r#"{"type":"form","credentials":{"username":"u","password":"p"}}"#,
        )
        .unwrap();
        assert_eq!(
            cfg,
            AuthConfig::Form {
                credentials: Some(Credentials {
                    username: "u".into(),
                    password: "p".into()
                })
            }
        );
        assert_eq!(cfg.kind(), "form");

        let none: AuthConfig = serde_json::from_str(r#"{"type":"none"}"#).unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn test_token_defaults_to_empty() {
        let cfg: AuthConfig = serde_json::from_str(r#"{"type":"token"}"#).unwrap();
        assert_eq!(cfg, AuthConfig::Token { token: String::new() });
    }

    #[test]
    fn test_unknown_auth_type_rejected() {
        assert!(serde_json::from_str::<AuthConfig>(r#"{"type":"kerberos"}"#).is_err());
    }

    #[test]
    fn test_session_expiry() {
        let s = Session::new(vec![], HashMap::new(), Duration::hours(1));
        assert!(!s.is_expired_at(Utc::now()));
        assert!(s.is_expired_at(Utc::now() + Duration::hours(2)));
    }
}
