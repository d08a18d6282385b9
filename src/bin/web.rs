//! StepDoc HTTP 服务
//!
//! 启动: cargo run --bin stepdoc-web --features web
//! 监听地址取自 `[server] bind`（默认 127.0.0.1:8080）

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use stepdoc::api::{router, ApiState};
use stepdoc::browser::ChromeBrowserFactory;
use stepdoc::config::load_config;
use stepdoc::llm::{ClientFactory, LlmClientFactory};
use stepdoc::store::MemoryTaskStore;
use stepdoc::{observability, Orchestrator};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let cfg = load_config(None).context("Failed to load config")?;
    let clients: Arc<dyn ClientFactory> = Arc::new(
        LlmClientFactory::new(cfg.llm.request_timeout()).context("Failed to build HTTP client")?,
    );
    let browsers = Arc::new(ChromeBrowserFactory::new(
        cfg.browser.headless,
        Duration::from_secs(cfg.browser.navigation_timeout_secs),
    ));
    let orchestrator = Arc::new(Orchestrator::new(
        browsers,
        Arc::new(MemoryTaskStore::new()),
        Arc::clone(&clients),
        cfg.orchestrator_settings(),
    ));

    let state = Arc::new(ApiState {
        orchestrator: Arc::clone(&orchestrator),
        clients,
        default_llm: cfg.llm.to_llm_config(),
    });
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&cfg.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", cfg.server.bind))?;
    tracing::info!(addr = %cfg.server.bind, "stepdoc-web listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested, cancelling running tasks");
            orchestrator.supervisor().shutdown();
        })
        .await
        .context("Server error")?;
    Ok(())
}
