use std::fmt::Write;

use chrono::{Local, Utc};

use super::{
    action_sentence, document_title, screenshot_link, step_label, Document,
    DocumentGenerator,
};
use crate::domain::{DocFormat, StepResult, Task, TaskPlan};

const DEFAULT_THEME: &str = "#3B82F6";

const STYLE: &str = r#"
* { box-sizing: border-box; margin: 0; padding: 0; }
body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; line-height: 1.6; color: #1e293b; background: #f8fafc; padding: 2rem; }
.container { max-width: 800px; margin: 0 auto; background: #fff; border-radius: 16px; box-shadow: 0 4px 6px -1px rgba(0,0,0,.1); padding: 2rem; }
h1 { color: var(--theme); margin-bottom: 1rem; font-size: 2rem; }
h2 { margin: 1.5rem 0 1rem; }
.description { background: #f1f5f9; padding: 1rem; border-radius: 8px; margin-bottom: 2rem; }
.step { border-left: 3px solid var(--theme); padding-left: 1.5rem; margin-bottom: 1.5rem; }
.step.failed { border-left-color: #ef4444; }
.step-number { display: inline-block; min-width: 28px; height: 28px; background: var(--theme); color: #fff; border-radius: 14px; text-align: center; line-height: 28px; font-weight: bold; margin-right: .5rem; padding: 0 6px; }
.step h3 { display: inline; font-size: 1.1rem; }
.step p { margin-top: .5rem; color: #64748b; }
.step .error { color: #ef4444; }
.step img { max-width: 100%; border-radius: 8px; margin-top: 1rem; box-shadow: 0 2px 4px rgba(0,0,0,.1); }
.logo { max-height: 48px; margin-bottom: 1rem; }
.footer { margin-top: 2rem; padding-top: 1rem; border-top: 1px solid #e2e8f0; color: #94a3b8; font-size: .875rem; text-align: center; }
"#;

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// 单页 HTML，主题色取自 style_config
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlGenerator;

impl DocumentGenerator for HtmlGenerator {
    fn format(&self) -> DocFormat {
        DocFormat::Html
    }

    fn generate(&self, task: &Task, plan: &TaskPlan, results: &[StepResult]) -> Document {
        let title = document_title(task, plan);
        let style = &task.output.style_config;
        let theme = if style.theme_color.trim().is_empty() {
            DEFAULT_THEME
        } else {
            style.theme_color.trim()
        };
        let lang = if task.output.language.starts_with("en") { "en" } else { "zh-CN" };

        let mut html = String::new();
        let _ = write!(
            html,
            "<!DOCTYPE html>\n<html lang=\"{lang}\">\n<head>\n<meta charset=\"UTF-8\">\n\
             <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n\
             <title>{title}</title>\n<style>:root {{ --theme: {theme}; }}{STYLE}</style>\n</head>\n<body>\n<div class=\"container\">\n",
            lang = lang,
            title = escape(&title),
            theme = escape(theme),
            STYLE = STYLE,
        );
        if let Some(logo) = style.logo_url.as_deref().filter(|s| !s.is_empty()) {
            let _ = writeln!(html, "<img class=\"logo\" src=\"{}\" alt=\"logo\">", escape(logo));
        }
        let _ = writeln!(html, "<h1>{}</h1>", escape(&title));
        let _ = writeln!(
            html,
            "<div class=\"description\">\n<p>{}</p>\n<p><small>目标网站：<a href=\"{url}\">{url}</a></small></p>\n</div>",
            escape(&task.description),
            url = escape(&task.target_url),
        );

        html.push_str("<h2>操作步骤</h2>\n");
        for (i, step) in plan.steps.iter().enumerate() {
            let result = results.get(i);
            let failed = result.map_or(false, |r| !r.success);
            let _ = writeln!(
                html,
                "<div class=\"step{}\" id=\"step-{}\">",
                if failed { " failed" } else { "" },
                i + 1
            );
            let label = step_label(i + 1, task.output.content_config.step_numbering);
            if !label.is_empty() {
                let _ = writeln!(html, "<span class=\"step-number\">{}</span>", label);
            }
            let _ = writeln!(html, "<h3>{}</h3>", escape(&step.description));
            let _ = writeln!(html, "<p>{}</p>", escape(&action_sentence(step)));
            if let Some(err) = result.and_then(|r| r.error.as_deref()) {
                let _ = writeln!(html, "<p class=\"error\">{}</p>", escape(err));
            }
            if let Some(link) = screenshot_link(result) {
                let _ = writeln!(html, "<img src=\"{}\" alt=\"步骤 {} 截图\">", link, i + 1);
            }
            html.push_str("</div>\n");
        }

        let _ = write!(
            html,
            "<div class=\"footer\">文档生成时间：{}</div>\n</div>\n</body>\n</html>\n",
            Local::now().format("%Y-%m-%d %H:%M:%S")
        );

        Document {
            title,
            content: html,
            format: DocFormat::Html,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ActionStep, ActionType, LlmConfig, LlmProvider, Screenshot};

    #[test]
    fn test_html_escapes_and_themes() {
        let mut task = Task::new(
            "搜索 <script>",
            "https://a.test/?q=1&r=2",
            LlmConfig::new(LlmProvider::OpenAi, "gpt-4o"),
        );
        task.output.style_config.theme_color = "#10B981".into();
        let step = ActionStep::new(1, ActionType::Screenshot, "").with_description("首页");
        let plan = TaskPlan {
            task_id: task.id.clone(),
            description: String::new(),
            steps: vec![step.clone()],
        };
        let mut result = StepResult::succeeded(&step);
        result.screenshot = Some(Screenshot::new(1, 4, Some("out/screenshots/step_1.png".into())));
        let doc = HtmlGenerator.generate(&task, &plan, &[result]);

        assert_eq!(doc.format, DocFormat::Html);
        assert_eq!(doc.title, "搜索 <script>");
        assert!(doc.content.contains("<title>搜索 &lt;script&gt;</title>"));
        assert!(doc.content.contains("--theme: #10B981"));
        assert!(doc.content.contains("href=\"https://a.test/?q=1&amp;r=2\""));
        assert!(doc.content.contains("src=\"screenshots/step_1.png\""));
        assert!(!doc.content.contains("<script>"));
    }
}
