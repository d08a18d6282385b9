//! 任务编排器：驱动任务从 pending 到终态
//!
//! 流程：建 LLM 客户端 → 取浏览器并连接 → 认证 / 导航 → 快照 → 规划 → 逐步执行（每步至多修复一次）
//! → 生成文档 → completed。规划完成前的任何错误都是致命的；步骤内的失败只记录在结果中。
//! 浏览器在任何退出路径上都会关闭。

pub mod step;

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::auth::{AuthSettings, Authenticator};
use crate::browser::{BrowserDriver, BrowserFactory, ImageFormat, PageSnapshot, ScreenshotOptions};
use crate::core::{TaskError, TaskSupervisor};
use crate::docgen::generator_for;
use crate::domain::{
    ActionStep, DocumentInfo, StepResult, Task, TaskPlan, TaskResult, TaskStatus,
};
use crate::llm::ClientFactory;
use crate::planner::{AiPlanner, Planner};
use crate::store::{StoreError, TaskStore};

pub use step::StepExecutor;

/// 编排过程中的等待时长与输出位置
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// 首次导航后、抓取快照前
    pub page_settle: Duration,
    /// 每个成功动作之后
    pub action_settle: Duration,
    /// 无选择器的 wait 步骤
    pub wait_sleep: Duration,
    pub wait_selector_timeout: Duration,
    pub max_snapshot_elements: usize,
    /// 截图与文档落盘根目录：`<output_dir>/<task_id>/`
    pub output_dir: Option<PathBuf>,
    pub auth: AuthSettings,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            page_settle: Duration::from_secs(2),
            action_settle: Duration::from_millis(500),
            wait_sleep: Duration::from_secs(2),
            wait_selector_timeout: Duration::from_secs(10),
            max_snapshot_elements: crate::planner::DEFAULT_MAX_ELEMENTS,
            output_dir: None,
            auth: AuthSettings::default(),
        }
    }
}

/// 单步修复状态机：Attempted → {Succeeded, FailedOnce → RefinedAttempted → {Succeeded, FailedFinal}}
enum RepairPhase {
    Attempted,
    FailedOnce(StepResult),
    RefinedAttempted(ActionStep),
    Succeeded(StepResult),
    FailedFinal(StepResult),
}

/// 与取消令牌竞争；取消时返回 TaskError::Cancelled
async fn guarded<F: Future>(cancel: &CancellationToken, fut: F) -> Result<F::Output, TaskError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TaskError::Cancelled),
        out = fut => Ok(out),
    }
}

pub struct Orchestrator {
    browsers: Arc<dyn BrowserFactory>,
    store: Arc<dyn TaskStore>,
    clients: Arc<dyn ClientFactory>,
    supervisor: TaskSupervisor,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        browsers: Arc<dyn BrowserFactory>,
        store: Arc<dyn TaskStore>,
        clients: Arc<dyn ClientFactory>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            browsers,
            store,
            clients,
            supervisor: TaskSupervisor::new(),
            settings,
        }
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    pub fn supervisor(&self) -> &TaskSupervisor {
        &self.supervisor
    }

    /// 保存 pending 任务并在 tokio 运行时上异步执行，立即返回任务 ID
    pub async fn submit(self: &Arc<Self>, task: Task) -> Result<String, TaskError> {
        self.store.create(&task).await?;
        self.supervisor.register(&task.id).await;
        let id = task.id.clone();
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut task = task;
            if let Err(e) = this.execute_task(&mut task).await {
                tracing::warn!(task_id = %task.id, error = %e, "task did not complete");
            }
        });
        Ok(id)
    }

    /// 请求取消：运行中的任务在下一个挂起点结束为 cancelled；尚未开始的任务直接记为 cancelled
    pub async fn cancel(&self, task_id: &str) -> Result<Task, TaskError> {
        let task = self.store.get(task_id).await?;
        if task.status.is_terminal() {
            return Ok(task);
        }
        self.supervisor.cancel(task_id).await;
        if task.status == TaskStatus::Pending {
            return match self.store.update_status(task_id, TaskStatus::Cancelled).await {
                Ok(task) => Ok(task),
                // 期间已结束
                Err(StoreError::Transition(_)) => Ok(self.store.get(task_id).await?),
                Err(e) => Err(e.into()),
            };
        }
        Ok(task)
    }

    /// 同步执行任务直至终态；致命错误同时写入 `task.error_message`
    pub async fn execute_task(&self, task: &mut Task) -> Result<(), TaskError> {
        let cancel = self.supervisor.register(&task.id).await;
        let span = tracing::info_span!("task", task_id = %task.id);
        let res = self.run(task, &cancel).instrument(span).await;
        self.supervisor.finish(&task.id).await;
        res
    }

    async fn run(&self, task: &mut Task, cancel: &CancellationToken) -> Result<(), TaskError> {
        if cancel.is_cancelled() {
            return self.finish_with_error(task, TaskError::Cancelled).await;
        }

        tracing::info!(url = %task.target_url, "starting task");
        self.mark_running(task).await?;
        // cancel() 可能恰好落在状态写入前后
        if cancel.is_cancelled() {
            return self.finish_with_error(task, TaskError::Cancelled).await;
        }
        let started = Instant::now();

        tracing::info!(provider = %task.llm.provider, model = %task.llm.model, "creating llm client");
        let client = match self.clients.create(&task.llm) {
            Ok(c) => c,
            Err(e) => return self.finish_with_error(task, TaskError::LlmClient(e)).await,
        };
        let planner = AiPlanner::new(client).with_max_elements(self.settings.max_snapshot_elements);

        let browser = match self.browsers.create().await {
            Ok(b) => b,
            Err(e) => return self.finish_with_error(task, e.into()).await,
        };

        let outcome = self.drive(task, browser.as_ref(), &planner, cancel).await;
        if let Err(e) = browser.close().await {
            tracing::warn!(error = %e, "failed to close browser");
        }

        match outcome {
            Ok(mut result) => {
                result.duration_ms = started.elapsed().as_millis() as u64;
                tracing::info!(
                    steps = result.steps.len(),
                    failed = result.steps.iter().filter(|s| !s.success).count(),
                    duration_ms = result.duration_ms,
                    "task completed"
                );
                task.result = Some(result);
                task.advance(TaskStatus::Completed).map_err(StoreError::from)?;
                self.persist(task).await?;
                Ok(())
            }
            Err(e) => self.finish_with_error(task, e).await,
        }
    }

    /// 连接浏览器之后的全部流程
    async fn drive(
        &self,
        task: &Task,
        browser: &dyn BrowserDriver,
        planner: &dyn Planner,
        cancel: &CancellationToken,
    ) -> Result<TaskResult, TaskError> {
        guarded(cancel, browser.connect()).await??;

        match task.auth.as_ref().filter(|a| !a.is_none()) {
            Some(auth) => {
                guarded(cancel, browser.navigate(&task.target_url)).await??;
                let session = Authenticator::new(browser, self.settings.auth.clone())
                    .authenticate(auth, cancel)
                    .await?;
                if !session.cookies.is_empty() {
                    guarded(cancel, browser.set_cookies(&session.cookies)).await??;
                }
                if !session.headers.is_empty() {
                    guarded(cancel, browser.set_extra_headers(&session.headers)).await??;
                }
                guarded(cancel, browser.navigate(&task.target_url)).await??;
            }
            None => {
                tracing::info!(url = %task.target_url, "navigating");
                guarded(cancel, browser.navigate(&task.target_url)).await??;
            }
        }

        guarded(cancel, tokio::time::sleep(self.settings.page_settle)).await?;
        let mut snapshot = guarded(cancel, browser.snapshot())
            .await?
            .map_err(TaskError::Snapshot)?;
        tracing::info!(
            url = %snapshot.url,
            title = %snapshot.title,
            elements = snapshot.elements.len(),
            "page snapshot"
        );

        let mut plan = guarded(
            cancel,
            planner.parse_task(&task.description, &task.target_url, Some(&snapshot)),
        )
        .await??;
        if plan.task_id.is_empty() {
            plan.task_id = task.id.clone();
        }

        let executor = StepExecutor::new(browser, &self.settings)
            .with_screenshot_options(ScreenshotOptions {
                full_page: task.output.screenshot_config.full_page,
                quality: task.output.screenshot_config.quality,
                format: ImageFormat::Png,
            })
            .with_screenshot_dir(self.task_dir(task).map(|d| d.join("screenshots")));

        let mut result = TaskResult::default();
        let total = plan.steps.len();
        for (i, step) in plan.steps.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(TaskError::Cancelled);
            }
            let span = tracing::info_span!("step", order = step.order, action = %step.action);
            let outcome = async {
                tracing::info!(index = i + 1, total, description = %step.description, "executing step");
                self.run_step(&executor, browser, planner, step, &snapshot, cancel)
                    .await
            }
            .instrument(span)
            .await?;

            if let Some(shot) = &outcome.screenshot {
                result.screenshots.push(shot.clone());
            }
            result.steps.push(outcome);

            match guarded(cancel, browser.snapshot()).await? {
                Ok(fresh) => snapshot = fresh,
                Err(e) => tracing::warn!(error = %e, "snapshot after step failed, keeping previous"),
            }
        }

        result.documents = self
            .generate_documents(task, &plan, &result.steps, planner, cancel)
            .await?;
        Ok(result)
    }

    /// 执行一个计划步骤，失败时用最新快照修复一次
    async fn run_step(
        &self,
        executor: &StepExecutor<'_>,
        browser: &dyn BrowserDriver,
        planner: &dyn Planner,
        step: &ActionStep,
        last_snapshot: &PageSnapshot,
        cancel: &CancellationToken,
    ) -> Result<StepResult, TaskError> {
        let mut phase = RepairPhase::Attempted;
        loop {
            phase = match phase {
                RepairPhase::Attempted => {
                    let result = executor.execute(step).await;
                    if result.success {
                        RepairPhase::Succeeded(result)
                    } else {
                        RepairPhase::FailedOnce(result)
                    }
                }
                RepairPhase::FailedOnce(original) => {
                    let fresh = match guarded(cancel, browser.snapshot()).await? {
                        Ok(s) => s,
                        Err(e) => {
                            tracing::warn!(error = %e, "snapshot for refinement failed, using previous");
                            last_snapshot.clone()
                        }
                    };
                    match guarded(cancel, planner.refine_step(step, &fresh)).await? {
                        Ok(refined) => RepairPhase::RefinedAttempted(refined),
                        Err(e) => {
                            tracing::warn!(error = %e, "refinement failed, keeping original error");
                            RepairPhase::FailedFinal(original)
                        }
                    }
                }
                RepairPhase::RefinedAttempted(refined) => {
                    let result = executor.execute(&refined).await;
                    if result.success {
                        RepairPhase::Succeeded(result)
                    } else {
                        RepairPhase::FailedFinal(result)
                    }
                }
                RepairPhase::Succeeded(result) | RepairPhase::FailedFinal(result) => {
                    return Ok(result)
                }
            };
        }
    }

    async fn generate_documents(
        &self,
        task: &Task,
        plan: &TaskPlan,
        results: &[StepResult],
        planner: &dyn Planner,
        cancel: &CancellationToken,
    ) -> Result<Vec<DocumentInfo>, TaskError> {
        let generators: Vec<_> = task
            .output
            .formats
            .iter()
            .filter_map(|f| {
                let gen = generator_for(*f);
                if gen.is_none() {
                    tracing::debug!(format = ?f, "no generator for format, skipping");
                }
                gen
            })
            .collect();
        if generators.is_empty() {
            return Ok(Vec::new());
        }

        let narrated;
        let plan = if task.output.content_config.narrate_steps {
            let mut copy = plan.clone();
            for (step, result) in copy.steps.iter_mut().zip(results) {
                let text = guarded(cancel, planner.generate_step_description(step, result)).await?;
                step.description = text;
            }
            narrated = copy;
            &narrated
        } else {
            plan
        };

        let dir = self.task_dir(task);
        let mut docs = Vec::with_capacity(generators.len());
        for gen in generators {
            let doc = gen.generate(task, plan, results);
            let url = match &dir {
                Some(dir) => {
                    let path = dir.join(format!("guide{}", doc.format.extension()));
                    let written = async {
                        tokio::fs::create_dir_all(dir).await?;
                        tokio::fs::write(&path, doc.content.as_bytes()).await
                    }
                    .await;
                    match written {
                        Ok(()) => Some(path.display().to_string()),
                        Err(e) => {
                            tracing::warn!(error = %e, path = %path.display(), "failed to write document");
                            None
                        }
                    }
                }
                None => None,
            };
            docs.push(DocumentInfo {
                id: uuid::Uuid::new_v4().to_string(),
                format: doc.format,
                url,
                size: doc.content.len() as u64,
                content: doc.content,
                created_at: doc.created_at,
            });
        }
        Ok(docs)
    }

    fn task_dir(&self, task: &Task) -> Option<PathBuf> {
        self.settings.output_dir.as_ref().map(|d| d.join(&task.id))
    }

    /// 记录致命错误并进入 failed / cancelled
    async fn finish_with_error(&self, task: &mut Task, err: TaskError) -> Result<(), TaskError> {
        let next = if err.is_cancelled() {
            TaskStatus::Cancelled
        } else {
            TaskStatus::Failed
        };
        tracing::error!(error = %err, status = %next, "task aborted");
        task.error_message = Some(err.to_string());
        if let Err(e) = task.advance(next) {
            tracing::warn!(error = %e, "status already terminal");
        }
        if let Err(e) = self.persist(task).await {
            tracing::error!(error = %e, "failed to persist task");
        }
        Err(err)
    }

    /// pending → running 经由存储做状态校验，不会覆盖 cancel() 已写入的终态
    async fn mark_running(&self, task: &mut Task) -> Result<(), TaskError> {
        match self.store.update_status(&task.id, TaskStatus::Running).await {
            Ok(stored) => {
                *task = stored;
                Ok(())
            }
            Err(StoreError::NotFound(_)) => {
                task.advance(TaskStatus::Running).map_err(StoreError::from)?;
                self.store.create(task).await?;
                Ok(())
            }
            Err(StoreError::Transition(e)) => {
                let stored = self.store.get(&task.id).await?;
                let cancelled = stored.status == TaskStatus::Cancelled;
                *task = stored;
                if cancelled {
                    tracing::info!("task cancelled before start");
                    Err(TaskError::Cancelled)
                } else {
                    Err(StoreError::Transition(e).into())
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// 写回存储；任务尚未登记时创建
    async fn persist(&self, task: &Task) -> Result<(), StoreError> {
        match self.store.update(task).await {
            Err(StoreError::NotFound(_)) => self.store.create(task).await,
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::MockBrowser;
    use crate::domain::{ActionType, LlmConfig, LlmProvider};
    use crate::llm::{LlmClient, LlmError, MockLlmClient};
    use crate::store::MemoryTaskStore;

    fn fast_settings() -> OrchestratorSettings {
        OrchestratorSettings {
            page_settle: Duration::from_millis(1),
            action_settle: Duration::from_millis(1),
            wait_sleep: Duration::from_millis(1),
            wait_selector_timeout: Duration::from_millis(5),
            ..OrchestratorSettings::default()
        }
    }

    fn orchestrator(browser: &MockBrowser, llm: &MockLlmClient) -> (Orchestrator, Arc<MemoryTaskStore>) {
        let store = Arc::new(MemoryTaskStore::new());
        let llm = llm.clone();
        let clients = move |_: &LlmConfig| -> Result<Arc<dyn LlmClient>, LlmError> {
            Ok(Arc::new(llm.clone()))
        };
        let orch = Orchestrator::new(
            Arc::new(browser.clone()),
            store.clone(),
            Arc::new(clients),
            fast_settings(),
        );
        (orch, store)
    }

    fn task() -> Task {
        Task::new("搜索 Rust", "https://a.test", LlmConfig::new(LlmProvider::OpenAi, "gpt-4o"))
    }

    const THREE_STEPS: &str = r##"{"task_id":"t","description":"search","steps":[
        {"order":1,"action":"fill","target":"#q","value":"rust","description":"输入关键词"},
        {"order":2,"action":"click","target":"#stale","description":"点击搜索"},
        {"order":3,"action":"click","target":"#first","description":"打开第一条结果"}
    ]}"##;

    #[tokio::test]
    async fn test_refined_step_replaces_failure() {
        let browser = MockBrowser::new().fail_selector("#stale");
        let llm = MockLlmClient::new()
            .with_reply(THREE_STEPS)
            .with_reply(r##"{"action":"click","target":"#search","description":"点击搜索"}"##);
        let (orch, store) = orchestrator(&browser, &llm);
        let mut t = task();

        orch.execute_task(&mut t).await.unwrap();

        assert_eq!(t.status, TaskStatus::Completed);
        let result = t.result.as_ref().unwrap();
        assert_eq!(result.steps.len(), 3);
        assert!(result.steps.iter().all(|s| s.success));
        assert_eq!(result.steps[1].order, 2);
        assert_eq!(
            browser.calls_matching("click:"),
            vec!["click:#stale", "click:#search", "click:#first"]
        );
        assert_eq!(llm.call_count(), 2);
        assert_eq!(store.get(&t.id).await.unwrap().status, TaskStatus::Completed);
        assert!(browser.is_closed());
    }

    #[tokio::test]
    async fn test_refine_error_keeps_original_failure() {
        let browser = MockBrowser::new().fail_selector("#stale");
        let llm = MockLlmClient::new().with_reply(THREE_STEPS).with_error("overloaded");
        let (orch, _) = orchestrator(&browser, &llm);
        let mut t = task();

        orch.execute_task(&mut t).await.unwrap();

        let steps = &t.result.as_ref().unwrap().steps;
        assert_eq!(steps.len(), 3);
        assert!(!steps[1].success);
        assert_eq!(steps[1].error.as_deref(), Some("element not found: #stale"));
        assert!(steps[2].success);
        assert_eq!(t.status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn test_refined_step_failing_again_is_final() {
        let browser = MockBrowser::new().fail_selector("#stale").fail_selector("#also-bad");
        let llm = MockLlmClient::new()
            .with_reply(THREE_STEPS)
            .with_reply(r##"{"action":"click","target":"#also-bad"}"##);
        let (orch, _) = orchestrator(&browser, &llm);
        let mut t = task();

        orch.execute_task(&mut t).await.unwrap();

        let steps = &t.result.as_ref().unwrap().steps;
        assert_eq!(steps[1].error.as_deref(), Some("element not found: #also-bad"));
        // 只修复一次
        assert_eq!(llm.call_count(), 2);
        assert_eq!(browser.calls_matching("click:#also-bad").len(), 1);
    }

    #[tokio::test]
    async fn test_plan_parse_error_is_fatal() {
        let browser = MockBrowser::new();
        let llm = MockLlmClient::new().with_reply("sorry, no plan");
        let (orch, store) = orchestrator(&browser, &llm);
        let mut t = task();

        let err = orch.execute_task(&mut t).await.unwrap_err();
        assert!(matches!(err, TaskError::Plan(_)));
        assert_eq!(t.status, TaskStatus::Failed);
        assert!(t.error_message.as_deref().unwrap().starts_with("planning failed"));
        assert!(t.result.is_none());
        assert_eq!(store.get(&t.id).await.unwrap().status, TaskStatus::Failed);
        assert!(browser.is_closed());
    }

    #[tokio::test]
    async fn test_navigation_error_is_fatal() {
        let browser = MockBrowser::new().fail_navigation();
        let llm = MockLlmClient::new();
        let (orch, _) = orchestrator(&browser, &llm);
        let mut t = task();

        let err = orch.execute_task(&mut t).await.unwrap_err();
        assert!(matches!(err, TaskError::Browser(_)));
        assert_eq!(t.status, TaskStatus::Failed);
        assert_eq!(llm.call_count(), 0);
        assert!(browser.is_closed());
    }

    #[tokio::test]
    async fn test_client_factory_error_is_fatal() {
        let browser = MockBrowser::new();
        let store = Arc::new(MemoryTaskStore::new());
        let clients = |_: &LlmConfig| -> Result<Arc<dyn LlmClient>, LlmError> {
            Err(LlmError::Config("endpoint is required".into()))
        };
        let orch = Orchestrator::new(Arc::new(browser.clone()), store, Arc::new(clients), fast_settings());
        let mut t = task();

        let err = orch.execute_task(&mut t).await.unwrap_err();
        assert!(matches!(err, TaskError::LlmClient(_)));
        assert_eq!(t.status, TaskStatus::Failed);
        assert!(browser.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let browser = MockBrowser::new();
        let llm = MockLlmClient::new().with_reply(THREE_STEPS);
        let (orch, store) = orchestrator(&browser, &llm);
        let t = task();
        store.create(&t).await.unwrap();

        let cancelled = orch.cancel(&t.id).await.unwrap();
        assert_eq!(cancelled.status, TaskStatus::Cancelled);

        let mut t = t;
        let err = orch.execute_task(&mut t).await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(t.status, TaskStatus::Cancelled);
        assert!(browser.calls().is_empty());
    }

    #[tokio::test]
    async fn test_documents_generated_per_supported_format() {
        let dir = tempfile::tempdir().unwrap();
        let browser = MockBrowser::new();
        let llm = MockLlmClient::new().with_reply(
            r##"{"description":"d","steps":[{"order":1,"action":"screenshot","target":"","description":"首页"}]}"##,
        );
        let store = Arc::new(MemoryTaskStore::new());
        let llm_c = llm.clone();
        let clients = move |_: &LlmConfig| -> Result<Arc<dyn LlmClient>, LlmError> {
            Ok(Arc::new(llm_c.clone()))
        };
        let settings = OrchestratorSettings {
            output_dir: Some(dir.path().to_path_buf()),
            ..fast_settings()
        };
        let orch = Orchestrator::new(Arc::new(browser.clone()), store, Arc::new(clients), settings);
        let mut t = task();
        t.output.formats = vec![
            crate::domain::DocFormat::Markdown,
            crate::domain::DocFormat::Pdf,
            crate::domain::DocFormat::Html,
        ];

        orch.execute_task(&mut t).await.unwrap();

        let result = t.result.as_ref().unwrap();
        assert_eq!(result.documents.len(), 2);
        assert_eq!(result.screenshots.len(), 1);
        assert_eq!(result.steps[0].action, ActionType::Screenshot);
        let task_dir = dir.path().join(&t.id);
        assert!(task_dir.join("guide.md").exists());
        assert!(task_dir.join("guide.html").exists());
        assert!(task_dir.join("screenshots/step_1.png").exists());
        assert!(result.documents[0].content.starts_with("# d"));
    }
}
