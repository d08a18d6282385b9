//! 执行计划：TaskPlan / ActionStep / ActionType
//!
//! ActionType 为闭合枚举；模型输出的未知动作保留原文为 `Unknown`，由步骤执行器判定为失败。

use serde::{Deserialize, Serialize};

/// 浏览器动作类型
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActionType {
    Navigate,
    Click,
    Fill,
    Hover,
    Select,
    Wait,
    Screenshot,
    Scroll,
    Unknown(String),
}

impl ActionType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Navigate => "navigate",
            Self::Click => "click",
            Self::Fill => "fill",
            Self::Hover => "hover",
            Self::Select => "select",
            Self::Wait => "wait",
            Self::Screenshot => "screenshot",
            Self::Scroll => "scroll",
            Self::Unknown(raw) => raw,
        }
    }
}

impl From<String> for ActionType {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "navigate" | "goto" => Self::Navigate,
            "click" => Self::Click,
            "fill" | "type" => Self::Fill,
            "hover" => Self::Hover,
            "select" => Self::Select,
            "wait" => Self::Wait,
            "screenshot" => Self::Screenshot,
            "scroll" => Self::Scroll,
            _ => Self::Unknown(raw),
        }
    }
}

impl From<ActionType> for String {
    fn from(action: ActionType) -> Self {
        action.as_str().to_string()
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单个操作步骤
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionStep {
    #[serde(default)]
    pub order: u32,
    pub action: ActionType,
    /// CSS 选择器或 URL
    #[serde(default)]
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_for: Option<String>,
    #[serde(default)]
    pub screenshot: bool,
    #[serde(default)]
    pub description: String,
}

impl ActionStep {
    pub fn new(order: u32, action: ActionType, target: impl Into<String>) -> Self {
        Self {
            order,
            action,
            target: target.into(),
            value: None,
            wait_for: None,
            screenshot: false,
            description: String::new(),
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_wait_for(mut self, selector: impl Into<String>) -> Self {
        self.wait_for = Some(selector.into());
        self
    }

    pub fn with_screenshot(mut self) -> Self {
        self.screenshot = true;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// 输入值；缺省为空串
    pub fn value_or_empty(&self) -> &str {
        self.value.as_deref().unwrap_or("")
    }

    /// 非空的等待选择器
    pub fn wait_selector(&self) -> Option<&str> {
        self.wait_for.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

/// 任务计划：由 Planner 每个任务生成一次，执行期间不被改写
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPlan {
    #[serde(default)]
    pub task_id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub steps: Vec<ActionStep>,
}
