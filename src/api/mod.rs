//! HTTP API（feature "web"）
//!
//! - `POST /api/tasks` 提交任务（立即返回 pending 任务，后台执行）
//! - `GET  /api/tasks` / `GET /api/tasks/:id` 查询
//! - `POST /api/tasks/:id/cancel` 取消
//! - `GET  /api/llm/presets`、`POST /api/llm/validate` LLM 配置
//! - `GET  /api/formats` 输出格式
//! - `GET  /api/health`

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::core::TaskError;
use crate::domain::{
    presets, supported_formats, FormatInfo, LlmConfig, LlmPreset, Task, TaskRequest,
};
use crate::llm::{ClientFactory, LlmClient};
use crate::orchestrator::Orchestrator;
use crate::store::StoreError;

type ApiError = (StatusCode, String);

pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
    /// 仅用于 /api/llm/validate
    pub clients: Arc<dyn ClientFactory>,
    /// 请求未携带 llm 时使用
    pub default_llm: LlmConfig,
}

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/api/health", get(|| async { "OK" }))
        .route("/api/tasks", get(api_tasks_list).post(api_tasks_create))
        .route("/api/tasks/:id", get(api_task_get))
        .route("/api/tasks/:id/cancel", post(api_task_cancel))
        .route("/api/llm/presets", get(api_llm_presets))
        .route("/api/llm/validate", post(api_llm_validate))
        .route("/api/formats", get(api_formats))
        .with_state(state)
}

fn task_error(err: TaskError) -> ApiError {
    match err {
        TaskError::Store(StoreError::NotFound(id)) => {
            (StatusCode::NOT_FOUND, format!("task not found: {}", id))
        }
        TaskError::Store(StoreError::AlreadyExists(id)) => {
            (StatusCode::CONFLICT, format!("task already exists: {}", id))
        }
        other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
    }
}

/// POST /api/tasks：校验后提交，返回 201 与 pending 任务
async fn api_tasks_create(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<TaskRequest>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    req.validate().map_err(|e| (StatusCode::BAD_REQUEST, e))?;
    let task = req.into_task(&state.default_llm);
    let snapshot = task.clone();
    state.orchestrator.submit(task).await.map_err(task_error)?;
    tracing::info!(task_id = %snapshot.id, "task submitted");
    Ok((StatusCode::CREATED, Json(snapshot)))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default)]
    offset: usize,
}

fn default_limit() -> usize {
    20
}

/// GET /api/tasks?limit=&offset=
async fn api_tasks_list(
    State(state): State<Arc<ApiState>>,
    Query(q): Query<ListQuery>,
) -> Result<Json<Vec<Task>>, ApiError> {
    let tasks = state
        .orchestrator
        .store()
        .list(q.limit, q.offset)
        .await
        .map_err(|e| task_error(e.into()))?;
    Ok(Json(tasks))
}

async fn api_task_get(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<Json<Task>, ApiError> {
    let task = state
        .orchestrator
        .store()
        .get(&id)
        .await
        .map_err(|e| task_error(e.into()))?;
    Ok(Json(task))
}

async fn api_task_cancel(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<Json<Task>, ApiError> {
    let task = state.orchestrator.cancel(&id).await.map_err(task_error)?;
    Ok(Json(task))
}

async fn api_llm_presets() -> Json<Vec<LlmPreset>> {
    Json(presets())
}

#[derive(Debug, Serialize)]
struct ValidateResponse {
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// POST /api/llm/validate：用一次最小对话确认端点与凭据可用
async fn api_llm_validate(
    State(state): State<Arc<ApiState>>,
    Json(config): Json<LlmConfig>,
) -> Json<ValidateResponse> {
    let outcome = match state.clients.create(&config) {
        Ok(client) => client.validate().await,
        Err(e) => Err(e),
    };
    Json(match outcome {
        Ok(()) => ValidateResponse {
            valid: true,
            error: None,
        },
        Err(e) => {
            tracing::info!(provider = %config.provider, error = %e, "llm validation failed");
            ValidateResponse {
                valid: false,
                error: Some(e.to_string()),
            }
        }
    })
}

async fn api_formats() -> Json<Vec<FormatInfo>> {
    Json(supported_formats())
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::browser::MockBrowser;
    use crate::domain::{LlmProvider, TaskStatus};
    use crate::llm::{LlmError, MockLlmClient};
    use crate::orchestrator::OrchestratorSettings;
    use crate::store::MemoryTaskStore;

    fn app(llm: MockLlmClient) -> Router {
        let clients: Arc<dyn ClientFactory> =
            Arc::new(move |_: &LlmConfig| -> Result<Arc<dyn LlmClient>, LlmError> {
                Ok(Arc::new(llm.clone()))
            });
        let orchestrator = Arc::new(Orchestrator::new(
            Arc::new(MockBrowser::new()),
            Arc::new(MemoryTaskStore::new()),
            Arc::clone(&clients),
            OrchestratorSettings {
                page_settle: std::time::Duration::from_millis(1),
                ..Default::default()
            },
        ));
        router(Arc::new(ApiState {
            orchestrator,
            clients,
            default_llm: LlmConfig::new(LlmProvider::OpenAi, "gpt-4o"),
        }))
    }

    async fn call(app: &Router, method: &str, uri: &str, body: &str) -> (StatusCode, String) {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_create_and_get_task() {
        let app = app(MockLlmClient::new().with_reply(r#"{"description":"d","steps":[]}"#));
        let (status, body) = call(
            &app,
            "POST",
            "/api/tasks",
            r#"{"description":"打开首页","target_url":"https://a.test"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let task: Task = serde_json::from_str(&body).unwrap();
        assert_eq!(task.status, TaskStatus::Pending);

        let mut final_status = TaskStatus::Pending;
        for _ in 0..100 {
            let (status, body) = call(&app, "GET", &format!("/api/tasks/{}", task.id), "").await;
            assert_eq!(status, StatusCode::OK);
            final_status = serde_json::from_str::<Task>(&body).unwrap().status;
            if final_status.is_terminal() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert_eq!(final_status, TaskStatus::Completed);

        let (_, body) = call(&app, "GET", "/api/tasks?limit=5", "").await;
        assert_eq!(serde_json::from_str::<Vec<Task>>(&body).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_bad_request_and_not_found() {
        let app = app(MockLlmClient::new());
        let (status, body) = call(
            &app,
            "POST",
            "/api/tasks",
            r#"{"description":"x","target_url":"not a url"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("target_url"));

        let (status, _) = call(&app, "GET", "/api/tasks/missing", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&app, "POST", "/api/tasks/missing/cancel", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_llm_validate_and_catalogs() {
        let app = app(MockLlmClient::new().with_reply("hi"));
        let (status, body) = call(
            &app,
            "POST",
            "/api/llm/validate",
            r#"{"provider":"openai","model":"gpt-4o"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, r#"{"valid":true}"#);

        let (_, body) = call(&app, "POST", "/api/llm/validate", r#"{"provider":"openai","model":"gpt-4o"}"#).await;
        assert!(body.contains(r#""valid":false"#));

        let (_, body) = call(&app, "GET", "/api/formats", "").await;
        assert!(body.contains("markdown"));
        let (_, body) = call(&app, "GET", "/api/llm/presets", "").await;
        assert!(body.contains("anthropic"));
    }
}
