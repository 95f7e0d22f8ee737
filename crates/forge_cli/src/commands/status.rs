//! Status command - check the container runtime and LLM configuration.

use anyhow::{bail, Result};
use clap::Args;
use forge_generate::LlmClient;
use forge_runtime::DockerRuntime;

use crate::config::ForgeConfig;

#[derive(Args)]
pub struct StatusArgs {
    /// Docker daemon address (defaults to the local socket)
    #[arg(long, env = "DOCKER_HOST")]
    pub docker_host: Option<String>,
}

pub async fn execute(args: StatusArgs, config: ForgeConfig) -> Result<()> {
    let mut healthy = true;

    let docker = match &args.docker_host {
        Some(host) if host.starts_with("tcp://") || host.starts_with("http") => {
            DockerRuntime::with_host(host).await
        }
        _ => DockerRuntime::new().await,
    };
    match docker {
        Ok(_) => println!("✅ Container runtime: available"),
        Err(e) => {
            healthy = false;
            println!("❌ Container runtime: {}", e);
        }
    }

    match LlmClient::from_config(&config.llm) {
        Ok(client) => println!(
            "✅ LLM: {:?} ({})",
            client.provider(),
            client.model()
        ),
        Err(e) => println!("⚠️  LLM: {} (use --offline to generate without one)", e),
    }

    println!(
        "   Environments: up to {}, reclaimed after {}s",
        config.sandbox.max_concurrent, config.sandbox.idle_timeout_secs
    );
    println!(
        "   Self-healing: {}, scanning every {}s",
        if config.healing.auto_fix_enabled { "on" } else { "off" },
        config.healing.scan_interval_secs
    );

    if !healthy {
        bail!("Container runtime unavailable");
    }
    Ok(())
}
