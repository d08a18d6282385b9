//! 文档生成：计划 + 执行结果 → 操作指南
//!
//! 目前支持 Markdown 与 HTML；其余格式 `generator_for` 返回 None，由调用方跳过。

mod html;
mod markdown;

use std::path::Path;

use chrono::{DateTime, Utc};

use crate::domain::{ActionStep, ActionType, DocFormat, StepNumbering, StepResult, Task, TaskPlan};

pub use html::HtmlGenerator;
pub use markdown::MarkdownGenerator;

/// 生成的文档
#[derive(Clone, Debug)]
pub struct Document {
    pub title: String,
    pub content: String,
    pub format: DocFormat,
    pub created_at: DateTime<Utc>,
}

pub trait DocumentGenerator: Send + Sync {
    fn format(&self) -> DocFormat;
    fn generate(&self, task: &Task, plan: &TaskPlan, results: &[StepResult]) -> Document;
}

pub fn generator_for(format: DocFormat) -> Option<Box<dyn DocumentGenerator>> {
    match format {
        DocFormat::Markdown => Some(Box::new(MarkdownGenerator)),
        DocFormat::Html => Some(Box::new(HtmlGenerator)),
        DocFormat::Pdf | DocFormat::Docx => None,
    }
}

/// 文档标题：显式标题优先，其次计划描述，最后任务描述
pub(crate) fn document_title(task: &Task, plan: &TaskPlan) -> String {
    [&task.output.title, &plan.description, &task.description]
        .into_iter()
        .map(|s| s.trim())
        .find(|s| !s.is_empty())
        .unwrap_or("操作指南")
        .to_string()
}

/// 第 `n` 个步骤（从 1 起）的编号文本；None 时为空串
pub(crate) fn step_label(n: usize, numbering: StepNumbering) -> String {
    match numbering {
        StepNumbering::Number => n.to_string(),
        StepNumbering::Letter => {
            let mut n = n;
            let mut out = Vec::new();
            while n > 0 {
                n -= 1;
                out.push((b'A' + (n % 26) as u8) as char);
                n /= 26;
            }
            out.iter().rev().collect()
        }
        StepNumbering::None => String::new(),
    }
}

/// 已落盘截图的相对链接（文档与 `screenshots/` 同在任务目录下）；未截图或未保存时为 None
pub(crate) fn screenshot_link(result: Option<&StepResult>) -> Option<String> {
    let url = result
        .filter(|r| r.success)?
        .screenshot
        .as_ref()?
        .url
        .as_deref()?;
    let link = match Path::new(url).file_name() {
        Some(name) => format!("screenshots/{}", name.to_string_lossy()),
        None => url.to_string(),
    };
    Some(link)
}

pub(crate) fn action_sentence(step: &ActionStep) -> String {
    match &step.action {
        ActionType::Navigate => format!("打开网址：`{}`", step.target),
        ActionType::Click => format!("点击「{}」。", step.description),
        ActionType::Fill => format!("在输入框中填写：`{}`", step.value_or_empty()),
        ActionType::Hover => format!("将鼠标悬停在「{}」上。", step.description),
        ActionType::Select => format!("从下拉列表中选择「{}」。", step.value_or_empty()),
        ActionType::Wait => "等待页面加载完成。".to_string(),
        ActionType::Scroll => "向下滚动页面。".to_string(),
        ActionType::Screenshot => "查看当前页面。".to_string(),
        ActionType::Unknown(_) => step.description.clone(),
    }
}

pub(crate) fn step_tips(step: &ActionStep) -> Vec<&'static str> {
    let mut tips = Vec::new();
    match step.action {
        ActionType::Fill => tips.push("请确保输入的信息准确无误。"),
        ActionType::Click if ["提交", "确认", "submit"].iter().any(|k| step.description.to_lowercase().contains(k)) => {
            tips.push("提交前请仔细检查填写的内容。")
        }
        _ => {}
    }
    tips
}
