//! 规划 / 修复 / 叙述提示词

use crate::browser::{Element, PageSnapshot};
use crate::domain::{ActionStep, StepResult};

pub const SYSTEM_PROMPT: &str = r#"你是浏览器自动化专家，负责把用户用自然语言描述的任务转换成可执行的浏览器操作步骤。

只输出一个 JSON 对象，字段如下：
- task_id: 任务标识
- description: 任务总体描述
- steps: 步骤数组，每个步骤包含
  - order: 从 1 开始的序号
  - action: navigate / click / fill / hover / select / wait / screenshot / scroll 之一
  - target: CSS 选择器或 URL
  - value: 输入值（fill / select 时必填）
  - wait_for: 操作后等待出现的选择器（可选）
  - screenshot: 是否在该步骤后截图
  - description: 面向普通用户的步骤说明

选择器优先级：id > name > 稳定的 class > 结构路径。"#;

/// 把元素列表渲染为提示词片段，最多 `max` 个
pub fn format_elements(elements: &[Element], max: usize) -> String {
    if elements.is_empty() {
        return "(no interactive elements)\n".to_string();
    }
    let mut out = String::new();
    for el in elements.iter().take(max) {
        let text = el.text.trim();
        if el.selector.is_empty() {
            out.push_str(&format!("- <{}> {}\n", el.tag_name, text));
        } else {
            out.push_str(&format!("- <{}> {} [{}]\n", el.tag_name, text, el.selector));
        }
    }
    if elements.len() > max {
        out.push_str(&format!("... {} more elements\n", elements.len() - max));
    }
    out
}

fn page_section(snapshot: &PageSnapshot, max_elements: usize) -> String {
    format!(
        "当前页面 URL: {}\n页面标题: {}\n\n可交互元素:\n{}",
        snapshot.url,
        snapshot.title,
        format_elements(&snapshot.elements, max_elements)
    )
}

pub fn task_prompt(
    description: &str,
    target_url: &str,
    snapshot: Option<&PageSnapshot>,
    max_elements: usize,
) -> String {
    let page = snapshot
        .map(|s| page_section(s, max_elements))
        .unwrap_or_default();
    format!(
        r##"## 用户任务
{description}

## 目标网站
{target_url}

{page}
## 输出要求
输出如下结构的 JSON：
{{
  "task_id": "uuid",
  "description": "任务总体描述",
  "steps": [
    {{"order": 1, "action": "click", "target": "#login", "value": "", "wait_for": "", "screenshot": true, "description": "点击登录按钮"}}
  ]
}}

注意：
1. 关键操作后设置 screenshot: true
2. 页面跳转后加入必要的 wait 步骤
3. 只输出 JSON"##
    )
}

pub fn refine_prompt(step: &ActionStep, snapshot: &PageSnapshot, max_elements: usize) -> String {
    format!(
        r#"以下步骤执行失败，请根据当前页面重新给出该步骤（通常是修正选择器）。

原步骤:
- 序号: {order}
- 操作: {action}
- 目标: {target}
- 值: {value}
- 描述: {desc}

{page}
只输出修正后的单个步骤 JSON 对象，字段与原步骤相同。"#,
        order = step.order,
        action = step.action,
        target = step.target,
        value = step.value_or_empty(),
        desc = step.description,
        page = page_section(snapshot, max_elements),
    )
}

pub fn narrate_prompt(step: &ActionStep, result: &StepResult) -> String {
    format!(
        r#"请为下面的操作写一句帮助文档中的说明：

操作: {}
目标: {}
值: {}
执行成功: {}

要求：语言简洁、面向普通用户、不使用技术术语、用祈使句告诉用户怎么做。直接输出说明文本。"#,
        step.action,
        step.target,
        step.value_or_empty(),
        result.success
    )
}
