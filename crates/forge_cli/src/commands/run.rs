//! Run command - generate an app, run it and keep it healthy.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use forge_generate::{GenerationOrchestrator, GenerationRequest, Phase};
use forge_heal::{extract_code, ErrorMonitor};
use forge_notify::{NotificationHub, Notifier};
use forge_runtime::{DockerRuntime, EnvironmentRuntime};
use forge_sandbox::{CreateRequest, EnvironmentManager};
use tracing::info;

use super::output::{run_pipeline, spawn_printer, GenerationArgs, CLI_CLIENT};
use crate::config::ForgeConfig;

#[derive(Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub generation: GenerationArgs,

    /// Docker daemon address (defaults to the local socket)
    #[arg(long, env = "DOCKER_HOST")]
    pub docker_host: Option<String>,
}

pub async fn execute(args: RunArgs, config: ForgeConfig, quiet: bool) -> Result<()> {
    let generator = args.generation.client(&config.llm)?;
    let request = args.generation.request()?;

    let runtime: Arc<dyn EnvironmentRuntime> = match &args.docker_host {
        Some(host) if host.starts_with("tcp://") || host.starts_with("http") => Arc::new(
            DockerRuntime::with_host(host)
                .await
                .context("Container runtime unavailable")?,
        ),
        _ => Arc::new(
            DockerRuntime::new()
                .await
                .context("Container runtime unavailable")?,
        ),
    };

    let hub = Arc::new(NotificationHub::new());
    let printer = spawn_printer(hub.register(CLI_CLIENT), quiet);
    let notifier: Arc<dyn Notifier> = hub.clone();

    let orchestrator = GenerationOrchestrator::new(generator.clone(), notifier.clone());
    let manager = EnvironmentManager::new(runtime, notifier.clone(), config.sandbox.clone());
    manager.start_reclaimer();
    let monitor = ErrorMonitor::new(manager.clone(), generator, notifier, config.healing.clone());

    let result = serve(&args, &orchestrator, &manager, &monitor, request).await;

    monitor.shutdown().await;
    manager.shutdown().await;
    orchestrator.shutdown().await;
    hub.unregister(CLI_CLIENT);
    let _ = printer.await;

    result
}

async fn serve(
    args: &RunArgs,
    orchestrator: &Arc<GenerationOrchestrator>,
    manager: &Arc<EnvironmentManager>,
    monitor: &Arc<ErrorMonitor>,
    request: GenerationRequest,
) -> Result<()> {
    let session = run_pipeline(orchestrator, request).await?;
    let artifacts = orchestrator.artifacts(&session.id)?;
    let frontend = artifacts
        .get(&Phase::Frontend)
        .context("Generation produced no frontend artifact")?;

    let environment_id = manager
        .create(CreateRequest::new(args.generation.project.clone(), extract_code(frontend)).client(CLI_CLIENT))
        .await
        .context("Failed to create environment")?;
    let snapshot = manager.status(&environment_id)?;
    info!(environment_id = %environment_id, "Environment running");

    monitor.start();

    println!("✅ Application running");
    println!();
    if let Some(url) = &snapshot.url {
        println!("URL: {}", url);
    }
    println!("Environment: {}", environment_id);
    println!("Press Ctrl-C to stop.");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    println!();
    println!("Shutting down...");

    let attempts = monitor.attempts(&environment_id);
    if !attempts.is_empty() {
        println!("Repairs attempted: {}", attempts.len());
        for attempt in attempts {
            let action = attempt
                .outcome
                .map(|o| o.action)
                .unwrap_or_else(|| "pending".to_string());
            println!("  {} → {}", attempt.kind, action);
        }
    }
    Ok(())
}
