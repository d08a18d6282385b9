//! StepDoc CLI
//!
//! 用法：
//! - `stepdoc run <task.json> [--config <file>]`：执行任务并输出结果 JSON（需 feature "browser"）
//! - `stepdoc validate <llm.json> [--config <file>]`：验证 LLM 配置
//! - `stepdoc presets` / `stepdoc formats`

use std::path::PathBuf;

use anyhow::{bail, Context};
use stepdoc::config::{load_config, AppConfig};
use stepdoc::domain::{presets, supported_formats, LlmConfig};
use stepdoc::llm::{ClientFactory, LlmClient, LlmClientFactory};
use stepdoc::observability;

const USAGE: &str = "usage:
  stepdoc run <task.json> [--config <file>]
  stepdoc validate <llm.json> [--config <file>]
  stepdoc presets
  stepdoc formats";

struct Args {
    command: String,
    input: Option<PathBuf>,
    config: Option<PathBuf>,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = std::env::args().skip(1);
    let command = args.next().unwrap_or_else(|| "help".to_string());
    let mut input = None;
    let mut config = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let path = args.next().context("--config requires a path")?;
                config = Some(PathBuf::from(path));
            }
            other if input.is_none() && !other.starts_with('-') => {
                input = Some(PathBuf::from(other));
            }
            other => bail!("unexpected argument: {}\n{}", other, USAGE),
        }
    }
    Ok(Args {
        command,
        input,
        config,
    })
}

fn read_json<T: serde::de::DeserializeOwned>(path: &PathBuf) -> anyhow::Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid JSON in {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();
    let args = parse_args()?;

    match args.command.as_str() {
        "run" => {
            let input = args.input.as_ref().context(USAGE)?;
            let cfg = load_config(args.config.clone()).context("Failed to load config")?;
            run_task(input, &cfg).await
        }
        "validate" => {
            let input = args.input.as_ref().context(USAGE)?;
            let cfg = load_config(args.config.clone()).context("Failed to load config")?;
            let llm: LlmConfig = read_json(input)?;
            let factory = LlmClientFactory::new(cfg.llm.request_timeout())
                .context("Failed to build HTTP client")?;
            let client = factory.create(&llm).context("Invalid LLM config")?;
            client
                .validate()
                .await
                .with_context(|| format!("LLM validation failed ({})", client.endpoint()))?;
            println!("ok: {} {}", llm.provider, client.model());
            Ok(())
        }
        "presets" => {
            println!("{}", serde_json::to_string_pretty(&presets())?);
            Ok(())
        }
        "formats" => {
            println!("{}", serde_json::to_string_pretty(&supported_formats())?);
            Ok(())
        }
        "help" | "--help" | "-h" => {
            println!("{}", USAGE);
            Ok(())
        }
        other => bail!("unknown command: {}\n{}", other, USAGE),
    }
}

#[cfg(feature = "browser")]
async fn run_task(input: &PathBuf, cfg: &AppConfig) -> anyhow::Result<()> {
    use std::sync::Arc;
    use std::time::Duration;

    use stepdoc::browser::ChromeBrowserFactory;
    use stepdoc::domain::{TaskRequest, TaskStatus};
    use stepdoc::store::MemoryTaskStore;
    use stepdoc::Orchestrator;

    let request: TaskRequest = read_json(input)?;
    request.validate().map_err(anyhow::Error::msg)?;
    let mut task = request.into_task(&cfg.llm.to_llm_config());

    let clients = LlmClientFactory::new(cfg.llm.request_timeout())
        .context("Failed to build HTTP client")?;
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(ChromeBrowserFactory::new(
            cfg.browser.headless,
            Duration::from_secs(cfg.browser.navigation_timeout_secs),
        )),
        Arc::new(MemoryTaskStore::new()),
        Arc::new(clients),
        cfg.orchestrator_settings(),
    ));

    let watcher = Arc::clone(&orchestrator);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, cancelling task");
            watcher.supervisor().shutdown();
        }
    });

    if let Err(e) = orchestrator.execute_task(&mut task).await {
        tracing::warn!(error = %e, "task did not complete");
    }
    println!("{}", serde_json::to_string_pretty(&task)?);
    if task.status != TaskStatus::Completed {
        bail!(
            "task {}: {}",
            task.status,
            task.error_message.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

#[cfg(not(feature = "browser"))]
async fn run_task(_input: &PathBuf, _cfg: &AppConfig) -> anyhow::Result<()> {
    bail!("stepdoc was built without the \"browser\" feature; rebuild with --features browser")
}
