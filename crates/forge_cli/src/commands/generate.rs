//! Generate command - run the generation pipeline only.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use forge_generate::GenerationOrchestrator;
use forge_notify::{NotificationHub, Notifier};

use super::output::{run_pipeline, spawn_printer, GenerationArgs, CLI_CLIENT};
use crate::config::ForgeConfig;

#[derive(Args)]
pub struct GenerateArgs {
    #[command(flatten)]
    pub generation: GenerationArgs,

    /// Directory to write one file per phase into
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub async fn execute(args: GenerateArgs, config: ForgeConfig, quiet: bool) -> Result<()> {
    let generator = args.generation.client(&config.llm)?;
    let request = args.generation.request()?;

    let hub = Arc::new(NotificationHub::new());
    let printer = spawn_printer(hub.register(CLI_CLIENT), quiet);
    let notifier: Arc<dyn Notifier> = hub.clone();
    let orchestrator = GenerationOrchestrator::new(generator, notifier);

    let result = match run_pipeline(&orchestrator, request).await {
        Ok(session) => orchestrator.artifacts(&session.id).map_err(anyhow::Error::from),
        Err(e) => Err(e),
    };
    orchestrator.shutdown().await;
    hub.unregister(CLI_CLIENT);
    let _ = printer.await;
    let artifacts = result?;

    match &args.output {
        Some(dir) => {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create output directory {:?}", dir))?;
            for (phase, content) in &artifacts {
                let path = dir.join(format!("{}.md", phase));
                fs::write(&path, content).with_context(|| format!("Failed to write {:?}", path))?;
            }
            println!("✅ {} artifacts written to {:?}", artifacts.len(), dir);
        }
        None => {
            for (phase, content) in &artifacts {
                println!("===== {} =====", phase);
                println!("{}", content);
                println!();
            }
        }
    }
    Ok(())
}
