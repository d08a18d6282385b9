//! 登录页识别与表单选择器候选

use crate::domain::SsoConfig;

/// 用户名输入框候选，按顺序尝试
pub const USERNAME_SELECTORS: &[&str] = &[
    "input[name='username']",
    "input[name='email']",
    "input[type='email']",
    "input[id='username']",
    "input[id='email']",
];

pub const PASSWORD_SELECTOR: &str = "input[type='password']";

pub const FORM_SUBMIT_SELECTORS: &[&str] = &[
    "button[type='submit']",
    "input[type='submit']",
    "button:has-text('登录')",
    "button:has-text('Login')",
];

pub const SSO_SUBMIT_SELECTORS: &[&str] = &["button[type='submit']", "input[type='submit']", "#submit"];

const SSO_INDICATORS: &[&str] = &["login", "signin", "auth", "sso", "oauth", "saml"];

const LOGIN_INDICATORS: &[&str] = &["login", "signin", "sign-in", "auth"];

/// 当前 URL 是否仍停留在 SSO 登录页
///
/// 配置了 `login_url` 时只按它判断；否则使用配置的特征串，缺省为内置特征。
pub fn is_sso_page(url: &str, config: &SsoConfig) -> bool {
    let url = url.to_lowercase();
    if let Some(login_url) = config.login_url.as_deref().filter(|s| !s.is_empty()) {
        return url.contains(&login_url.to_lowercase());
    }
    if config.indicators.is_empty() {
        SSO_INDICATORS.iter().any(|i| url.contains(i))
    } else {
        config
            .indicators
            .iter()
            .any(|i| url.contains(&i.to_lowercase()))
    }
}

/// 手动登录轮询：URL 不再匹配时视为登录完成
pub fn is_login_page(url: &str) -> bool {
    let url = url.to_lowercase();
    LOGIN_INDICATORS.iter().any(|i| url.contains(i))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_page() {
        assert!(is_login_page("https://example.com/Login?next=/"));
        assert!(is_login_page("https://example.com/users/sign-in"));
        assert!(!is_login_page("https://example.com/dashboard"));
    }

    #[test]
    fn test_sso_page_defaults_and_overrides() {
        let default = SsoConfig::default();
        assert!(is_sso_page("https://idp.corp.com/saml/start", &default));
        assert!(!is_sso_page("https://app.corp.com/home", &default));

        let custom = SsoConfig {
            indicators: vec!["idp.corp".to_string()],
            ..Default::default()
        };
        assert!(is_sso_page("https://IDP.corp.com/x", &custom));
        assert!(!is_sso_page("https://app.corp.com/login", &custom));

        let by_url = SsoConfig {
            login_url: Some("https://sso.corp.com/".to_string()),
            ..Default::default()
        };
        assert!(is_sso_page("https://sso.corp.com/?app=1", &by_url));
        assert!(!is_sso_page("https://other.com/oauth", &by_url));
    }
}
