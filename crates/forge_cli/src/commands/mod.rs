//! CLI command definitions.
//!
//! This module defines the command structure for the PromptForge CLI.
//! Each subcommand wires the component crates together for one workflow.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Overrides;

pub mod config;
pub mod generate;
pub mod output;
pub mod run;
pub mod status;

/// PromptForge - prompt to running, self-healing application
#[derive(Parser)]
#[command(name = "forge")]
#[command(version, about = "PromptForge - prompt to running, self-healing application")]
#[command(long_about = r#"
PromptForge turns a natural-language request into a running application.
A phased generation pipeline writes the code, an isolated container runs
it, and an error monitor repairs failures it sees in the output.

WORKFLOWS:
  run       → Generate an app, run it in a container and keep it healthy
  generate  → Run the generation pipeline only
  status    → Check the container runtime and LLM configuration
  config    → Print the effective configuration

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments
  3 - Configuration error
  4 - Container runtime error
  5 - Generation failure
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Configuration file (.toml, .yaml or .yml)
    #[arg(short, long, global = true, env = "FORGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Maximum number of concurrent environments
    #[arg(long, global = true, env = "FORGE_MAX_CONCURRENT")]
    pub max_concurrent: Option<usize>,

    /// Seconds before an environment is reclaimed
    #[arg(long, global = true, env = "FORGE_IDLE_TIMEOUT")]
    pub idle_timeout: Option<u64>,

    /// Seconds between reclaimer passes
    #[arg(long, global = true, env = "FORGE_RECLAIM_INTERVAL")]
    pub reclaim_interval: Option<u64>,

    /// Seconds between error scans
    #[arg(long, global = true, env = "FORGE_SCAN_INTERVAL")]
    pub scan_interval: Option<u64>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            max_concurrent: self.max_concurrent,
            idle_timeout_secs: self.idle_timeout,
            reclaim_interval_secs: self.reclaim_interval,
            scan_interval_secs: self.scan_interval,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate an application, run it and monitor it until interrupted
    Run(run::RunArgs),

    /// Run the generation pipeline and print or save the artifacts
    Generate(generate::GenerateArgs),

    /// Check the container runtime and LLM configuration
    Status(status::StatusArgs),

    /// Print the effective configuration
    Config(config::ConfigArgs),
}
