//! 单步执行：动作分发 → 稳定等待 → 按需截图
//!
//! 驱动错误不会向上抛出，而是记录为失败的 StepResult，由编排器决定是否修复。

use std::path::{Path, PathBuf};

use crate::browser::{BrowserDriver, BrowserError, ImageFormat, ScreenshotOptions};
use crate::domain::{ActionStep, ActionType, Screenshot, StepResult};

use super::OrchestratorSettings;

pub struct StepExecutor<'a> {
    browser: &'a dyn BrowserDriver,
    settings: &'a OrchestratorSettings,
    screenshot_options: ScreenshotOptions,
    /// 截图落盘目录；None 时只记录元数据
    screenshot_dir: Option<PathBuf>,
}

impl<'a> StepExecutor<'a> {
    pub fn new(browser: &'a dyn BrowserDriver, settings: &'a OrchestratorSettings) -> Self {
        Self {
            browser,
            settings,
            screenshot_options: ScreenshotOptions::default(),
            screenshot_dir: None,
        }
    }

    pub fn with_screenshot_options(mut self, options: ScreenshotOptions) -> Self {
        self.screenshot_options = options;
        self
    }

    pub fn with_screenshot_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.screenshot_dir = dir;
        self
    }

    pub async fn execute(&self, step: &ActionStep) -> StepResult {
        tracing::debug!(target_sel = %step.target, value = ?step.value, "executing step");
        if let Err(e) = self.perform(step).await {
            tracing::warn!(error = %e, "step failed");
            return StepResult::failed(step, e.to_string());
        }

        tokio::time::sleep(self.settings.action_settle).await;

        let mut result = StepResult::succeeded(step);
        if step.screenshot || step.action == ActionType::Screenshot {
            match self.capture(step).await {
                Ok(shot) => result.screenshot = Some(shot),
                // 截图动作本身失败即步骤失败；附带截图失败只记日志
                Err(e) if step.action == ActionType::Screenshot => {
                    return StepResult::failed(step, e.to_string());
                }
                Err(e) => tracing::warn!(error = %e, "screenshot failed"),
            }
        }
        result
    }

    async fn perform(&self, step: &ActionStep) -> Result<(), BrowserError> {
        let b = self.browser;
        match &step.action {
            ActionType::Navigate => b.navigate(&step.target).await?,
            ActionType::Click => b.click(&step.target).await?,
            ActionType::Fill => b.fill(&step.target, step.value_or_empty()).await?,
            ActionType::Hover => b.hover(&step.target).await?,
            ActionType::Select => b.select(&step.target, step.value_or_empty()).await?,
            ActionType::Scroll => {
                let target = step.target.trim();
                b.scroll((!target.is_empty()).then_some(target)).await?
            }
            ActionType::Screenshot => {}
            ActionType::Wait => {
                let selector = step
                    .wait_selector()
                    .or_else(|| Some(step.target.trim()).filter(|s| !s.is_empty()));
                match selector {
                    Some(sel) => {
                        b.wait_for_selector(sel, self.settings.wait_selector_timeout)
                            .await?
                    }
                    None => tokio::time::sleep(self.settings.wait_sleep).await,
                }
                return Ok(());
            }
            ActionType::Unknown(raw) => {
                return Err(BrowserError::Operation(format!("unsupported action: {}", raw)));
            }
        }

        if let Some(sel) = step.wait_selector() {
            b.wait_for_selector(sel, self.settings.wait_selector_timeout)
                .await?;
        }
        Ok(())
    }

    async fn capture(&self, step: &ActionStep) -> Result<Screenshot, BrowserError> {
        let bytes = self.browser.screenshot(&self.screenshot_options).await?;
        let url = match &self.screenshot_dir {
            Some(dir) => self.save(dir, step.order, &bytes).await,
            None => None,
        };
        tracing::debug!(size = bytes.len(), path = ?url, "screenshot captured");
        Ok(Screenshot::new(step.order, bytes.len(), url))
    }

    async fn save(&self, dir: &Path, order: u32, bytes: &[u8]) -> Option<String> {
        let ext = match self.screenshot_options.format {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
        };
        let path = dir.join(format!("step_{}.{}", order, ext));
        let written = async {
            tokio::fs::create_dir_all(dir).await?;
            tokio::fs::write(&path, bytes).await
        }
        .await;
        match written {
            Ok(()) => Some(path.display().to_string()),
            Err(e) => {
                tracing::warn!(error = %e, path = %path.display(), "failed to save screenshot");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::browser::MockBrowser;

    fn settings() -> OrchestratorSettings {
        OrchestratorSettings {
            action_settle: Duration::from_millis(1),
            wait_sleep: Duration::from_millis(50),
            wait_selector_timeout: Duration::from_millis(10),
            ..OrchestratorSettings::default()
        }
    }

    async fn browser() -> MockBrowser {
        let b = MockBrowser::new();
        b.connect().await.unwrap();
        b
    }

    #[tokio::test]
    async fn test_wait_without_selector_sleeps() {
        let b = browser().await;
        let s = settings();
        let exec = StepExecutor::new(&b, &s);
        let step = ActionStep::new(1, ActionType::Wait, "");

        let started = Instant::now();
        let result = exec.execute(&step).await;
        assert!(result.success);
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert!(b.calls_matching("wait_for_selector").is_empty());
    }

    #[tokio::test]
    async fn test_wait_with_selector() {
        let b = browser().await.fail_selector("#never");
        let s = settings();
        let exec = StepExecutor::new(&b, &s);

        let ok = exec
            .execute(&ActionStep::new(1, ActionType::Wait, "").with_wait_for("#list"))
            .await;
        assert!(ok.success);
        let failed = exec
            .execute(&ActionStep::new(2, ActionType::Wait, "#never"))
            .await;
        assert!(!failed.success);
        assert_eq!(
            b.calls_matching("wait_for_selector"),
            vec!["wait_for_selector:#list", "wait_for_selector:#never"]
        );
    }

    #[tokio::test]
    async fn test_driver_error_becomes_failed_result() {
        let b = browser().await.fail_selector("#gone");
        let s = settings();
        let result = StepExecutor::new(&b, &s)
            .execute(&ActionStep::new(3, ActionType::Click, "#gone").with_screenshot())
            .await;
        assert!(!result.success);
        assert_eq!(result.order, 3);
        assert_eq!(result.error.as_deref(), Some("element not found: #gone"));
        assert!(result.screenshot.is_none());
        assert!(b.calls_matching("screenshot").is_empty());
    }

    #[tokio::test]
    async fn test_unknown_action_fails() {
        let b = browser().await;
        let s = settings();
        let step = ActionStep::new(1, ActionType::from("drag".to_string()), "#a");
        let result = StepExecutor::new(&b, &s).execute(&step).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("unsupported action: drag"));
    }

    #[tokio::test]
    async fn test_screenshot_saved_to_dir() {
        let dir = tempfile::tempdir().unwrap();
        let b = browser().await;
        let s = settings();
        let exec = StepExecutor::new(&b, &s).with_screenshot_dir(Some(dir.path().join("shots")));

        let result = exec
            .execute(&ActionStep::new(4, ActionType::Fill, "#q").with_value("rust").with_screenshot())
            .await;
        assert!(result.success);
        let shot = result.screenshot.unwrap();
        assert_eq!(shot.step_order, 4);
        assert_eq!(shot.size, 4);
        let path = PathBuf::from(shot.url.unwrap());
        assert!(path.ends_with("shots/step_4.png"));
        assert!(path.exists());
        assert_eq!(b.calls_matching("fill:"), vec!["fill:#q=rust"]);
    }
}
