use std::fmt::Write;

use chrono::{Local, Utc};

use super::{
    action_sentence, document_title, screenshot_link, step_label, step_tips,
    Document, DocumentGenerator,
};
use crate::domain::{DocFormat, StepResult, Task, TaskPlan};

#[derive(Debug, Default, Clone, Copy)]
pub struct MarkdownGenerator;

impl DocumentGenerator for MarkdownGenerator {
    fn format(&self) -> DocFormat {
        DocFormat::Markdown
    }

    fn generate(&self, task: &Task, plan: &TaskPlan, results: &[StepResult]) -> Document {
        let title = document_title(task, plan);
        let content_cfg = &task.output.content_config;
        let mut md = String::new();

        let _ = writeln!(md, "# {}\n", title);

        if content_cfg.include_cover {
            let _ = writeln!(md, "> 目标网站：<{}>  ", task.target_url);
            let _ = writeln!(md, "> 日期：{}\n", Local::now().format("%Y-%m-%d"));
        }

        if content_cfg.include_toc && !plan.steps.is_empty() {
            md.push_str("## 目录\n\n");
            for (i, step) in plan.steps.iter().enumerate() {
                let _ = writeln!(md, "{}. [{}](#step-{})", i + 1, step.description, i + 1);
            }
            md.push_str("\n---\n\n");
        }

        md.push_str("## 概述\n\n");
        let _ = writeln!(
            md,
            "本指南演示如何在 [{url}]({url}) 上完成以下操作：\n",
            url = task.target_url
        );
        let _ = writeln!(md, "> {}\n", task.description);

        md.push_str("## 操作步骤\n\n");
        for (i, step) in plan.steps.iter().enumerate() {
            let result = results.get(i);
            let label = step_label(i + 1, content_cfg.step_numbering);
            let _ = writeln!(md, "<a id=\"step-{}\"></a>\n", i + 1);
            if label.is_empty() {
                let _ = writeln!(md, "### {}\n", step.description);
            } else {
                let _ = writeln!(md, "### 步骤 {}：{}\n", label, step.description);
            }
            let _ = writeln!(md, "{}", action_sentence(step));

            if let Some(err) = result.and_then(|r| r.error.as_deref()) {
                let _ = writeln!(md, "\n> ⚠️ 该步骤执行失败：{}", err);
            }

            if let Some(link) = screenshot_link(result) {
                let _ = writeln!(md, "\n![步骤 {} 截图]({})\n", label, link);
            }

            if content_cfg.include_tips {
                let tips = step_tips(step);
                if !tips.is_empty() {
                    let _ = writeln!(md, "\n> **提示**：{}\n", tips.join(" "));
                }
            }
            md.push('\n');
        }

        md.push_str("## 总结\n\n");
        let _ = writeln!(
            md,
            "通过以上 {} 个步骤，即可完成「{}」。\n",
            plan.steps.len(),
            task.description
        );
        md.push_str("---\n\n");
        let _ = writeln!(md, "*文档生成时间：{}*", Local::now().format("%Y-%m-%d %H:%M:%S"));

        Document {
            title,
            content: md,
            format: DocFormat::Markdown,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        ActionStep, ActionType, LlmConfig, LlmProvider, Screenshot, StepNumbering,
    };

    fn fixture() -> (Task, TaskPlan, Vec<StepResult>) {
        let task = Task::new(
            "注册新账号",
            "https://a.test",
            LlmConfig::new(LlmProvider::OpenAi, "gpt-4o"),
        );
        let steps = vec![
            ActionStep::new(1, ActionType::Fill, "#email")
                .with_value("a@b.c")
                .with_description("填写邮箱"),
            ActionStep::new(2, ActionType::Click, "#submit")
                .with_screenshot()
                .with_description("点击提交"),
            ActionStep::new(3, ActionType::Click, "#done")
                .with_screenshot()
                .with_description("完成"),
        ];
        let mut clicked = StepResult::succeeded(&steps[1]);
        clicked.screenshot = Some(Screenshot::new(
            2,
            4,
            Some("/out/t1/screenshots/step_2.png".into()),
        ));
        let results = vec![
            StepResult::succeeded(&steps[0]),
            clicked,
            StepResult::failed(&steps[2], "element not found: #done"),
        ];
        let plan = TaskPlan {
            task_id: task.id.clone(),
            description: "注册流程".into(),
            steps,
        };
        (task, plan, results)
    }

    #[test]
    fn test_markdown_sections() {
        let (task, plan, results) = fixture();
        let doc = MarkdownGenerator.generate(&task, &plan, &results);
        assert_eq!(doc.title, "注册流程");
        let md = &doc.content;
        assert!(md.starts_with("# 注册流程\n"));
        assert!(md.contains("## 目录"));
        assert!(md.contains("### 步骤 2：点击提交"));
        assert!(md.contains("在输入框中填写：`a@b.c`"));
        assert!(md.contains("![步骤 2 截图](screenshots/step_2.png)"));
        // 失败步骤不引用截图
        assert!(!md.contains("step_3.png"));
        assert!(md.contains("该步骤执行失败：element not found: #done"));
        assert!(md.contains("**提示**：提交前请仔细检查填写的内容。"));
        assert!(md.contains("通过以上 3 个步骤"));
    }

    #[test]
    fn test_toc_links_resolve_to_step_anchors() {
        let (task, plan, results) = fixture();
        let md = MarkdownGenerator.generate(&task, &plan, &results).content;
        for n in 1..=3 {
            assert!(md.contains(&format!("](#step-{})", n)));
            assert!(md.contains(&format!("<a id=\"step-{}\"></a>", n)));
        }
        assert!(!md.contains("#步骤-"));
    }

    #[test]
    fn test_requested_screenshot_without_saved_file_has_no_link() {
        let (task, plan, mut results) = fixture();
        // 截图失败或未配置输出目录
        results[1].screenshot = None;
        let md = MarkdownGenerator.generate(&task, &plan, &results).content;
        assert!(!md.contains("截图]("));

        results[1].screenshot = Some(Screenshot::new(2, 4, None));
        let md = MarkdownGenerator.generate(&task, &plan, &results).content;
        assert!(!md.contains("截图]("));
    }

    #[test]
    fn test_markdown_respects_content_config() {
        let (mut task, plan, results) = fixture();
        task.output.title = "自定义标题".into();
        task.output.content_config.include_toc = false;
        task.output.content_config.include_tips = false;
        task.output.content_config.step_numbering = StepNumbering::Letter;
        let md = MarkdownGenerator.generate(&task, &plan, &results).content;
        assert!(md.starts_with("# 自定义标题"));
        assert!(!md.contains("## 目录"));
        assert!(!md.contains("**提示**"));
        assert!(md.contains("### 步骤 B：点击提交"));
    }
}
