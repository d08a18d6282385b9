//! 文档输出配置与支持的格式

use serde::{Deserialize, Serialize};

/// 文档格式
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocFormat {
    Markdown,
    Html,
    Pdf,
    Docx,
}

impl DocFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Markdown => ".md",
            Self::Html => ".html",
            Self::Pdf => ".pdf",
            Self::Docx => ".docx",
        }
    }
}

/// 文档输出配置
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// 输出格式（可多选）
    pub formats: Vec<DocFormat>,
    /// 文档语言：zh / en
    pub language: String,
    /// 为空时使用计划描述
    pub title: String,
    pub screenshot_config: ScreenshotConf,
    pub style_config: StyleConfig,
    pub content_config: ContentConfig,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            formats: vec![DocFormat::Markdown],
            language: "zh".to_string(),
            title: String::new(),
            screenshot_config: ScreenshotConf::default(),
            style_config: StyleConfig::default(),
            content_config: ContentConfig::default(),
        }
    }
}

/// 截图配置
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenshotConf {
    /// 1-100
    pub quality: u32,
    pub annotate: bool,
    pub full_page: bool,
    pub highlight_color: String,
}

impl Default for ScreenshotConf {
    fn default() -> Self {
        Self {
            quality: 90,
            annotate: true,
            full_page: false,
            highlight_color: "#FF0000".to_string(),
        }
    }
}

/// 样式配置
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleConfig {
    /// simple / professional / custom
    pub template: String,
    pub logo_url: Option<String>,
    pub theme_color: String,
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            template: "simple".to_string(),
            logo_url: None,
            theme_color: "#3B82F6".to_string(),
        }
    }
}

/// 步骤编号样式
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepNumbering {
    #[default]
    Number,
    Letter,
    None,
}

/// 内容配置
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    pub include_toc: bool,
    pub include_cover: bool,
    pub step_numbering: StepNumbering,
    pub include_tips: bool,
    /// 生成文档前由 LLM 将每步改写为面向用户的说明
    pub narrate_steps: bool,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            include_toc: true,
            include_cover: false,
            step_numbering: StepNumbering::Number,
            include_tips: true,
            narrate_steps: false,
        }
    }
}

/// 格式信息
#[derive(Clone, Debug, Serialize)]
pub struct FormatInfo {
    pub format: DocFormat,
    pub name: &'static str,
    pub description: &'static str,
    pub extension: &'static str,
}

pub fn supported_formats() -> Vec<FormatInfo> {
    let info = |format: DocFormat, name, description| FormatInfo {
        format,
        name,
        description,
        extension: format.extension(),
    };
    vec![
        info(DocFormat::Markdown, "Markdown", "轻量级标记语言，适合技术文档和 Git 仓库"),
        info(DocFormat::Html, "HTML", "网页格式，可直接在浏览器中查看"),
        info(DocFormat::Pdf, "PDF", "便携文档格式，适合打印和正式分发"),
        info(DocFormat::Docx, "Word (DOCX)", "Microsoft Word 格式，便于二次编辑"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_output_is_markdown() {
        let out = OutputConfig::default();
        assert_eq!(out.formats, vec![DocFormat::Markdown]);
        assert!(out.content_config.include_toc);
    }

    #[test]
    fn test_partial_output_json() {
        let out: OutputConfig =
            serde_json::from_str(r#"{"formats":["html","pdf"],"title":"指南"}"#).unwrap();
        assert_eq!(out.formats, vec![DocFormat::Html, DocFormat::Pdf]);
        assert_eq!(out.title, "指南");
        assert_eq!(out.style_config.theme_color, "#3B82F6");
    }
}
