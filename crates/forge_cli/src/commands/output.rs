//! Console rendering of notifications and shared generation options.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use forge_generate::{
    GenerationClient, GenerationOrchestrator, GenerationRequest, LlmClient, LlmConfig,
    ScriptedGenerator, SessionSnapshot, SessionStatus,
};
use forge_notify::{Event, Notification};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::info;

/// Client id the CLI registers with the notification hub.
pub const CLI_CLIENT: &str = "cli";

/// Options shared by commands that run the generation pipeline.
#[derive(Args)]
pub struct GenerationArgs {
    /// What to build
    #[arg(short, long)]
    pub prompt: String,

    /// Project identifier
    #[arg(long, default_value = "default")]
    pub project: String,

    /// Extra context as a JSON object
    #[arg(long)]
    pub context: Option<String>,

    /// Use the built-in scripted generator instead of an LLM
    #[arg(long)]
    pub offline: bool,
}

impl GenerationArgs {
    pub fn client(&self, config: &LlmConfig) -> Result<Arc<dyn GenerationClient>> {
        if self.offline {
            info!("Using offline scripted generator");
            return Ok(Arc::new(ScriptedGenerator::new()));
        }
        let client = LlmClient::from_config(config).context("LLM client unavailable")?;
        info!(provider = ?client.provider(), model = %client.model(), "Using LLM");
        Ok(Arc::new(client))
    }

    pub fn request(&self) -> Result<GenerationRequest> {
        let mut request =
            GenerationRequest::new(self.prompt.clone(), self.project.clone()).client(CLI_CLIENT);
        if let Some(raw) = &self.context {
            let context: serde_json::Value =
                serde_json::from_str(raw).context("Invalid argument: --context is not valid JSON")?;
            request = request.context(context);
        }
        Ok(request)
    }
}

/// Start a session and wait for it to complete.
pub async fn run_pipeline(
    orchestrator: &Arc<GenerationOrchestrator>,
    request: GenerationRequest,
) -> Result<SessionSnapshot> {
    let id = orchestrator.start(request)?;
    let snapshot = orchestrator.wait(&id).await?;
    if snapshot.status != SessionStatus::Completed {
        bail!(
            "Generation {} {}: {}",
            id,
            snapshot.status,
            snapshot.errors.join("; ")
        );
    }
    Ok(snapshot)
}

fn render(notification: &Notification) -> String {
    match &notification.event {
        Event::GenerationUpdate(update) => match &update.phase {
            Some(phase) => format!("[generation] {} {}", phase, update.status),
            None => format!("[generation] {}", update.status),
        },
        Event::EnvironmentUpdate(update) => match &update.url {
            Some(url) => format!("[environment] {} at {}", update.status, url),
            None => format!("[environment] {}", update.status),
        },
        Event::ConsoleLog(log) => format!("[{}] {}", log.source, log.message),
        Event::Error(report) => format!("[error] {}: {}", report.origin, report.message),
    }
}

/// Print notifications until the hub drops the sender.
pub fn spawn_printer(mut rx: UnboundedReceiver<Notification>, quiet: bool) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(notification) = rx.recv().await {
            let console = matches!(notification.event, Event::ConsoleLog(_));
            if quiet && console {
                continue;
            }
            println!("{}", render(&notification));
        }
    })
}
