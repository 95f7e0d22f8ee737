//! PromptForge CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Invalid arguments
//! - 3: Configuration error
//! - 4: Container runtime error
//! - 5: Generation failure

use std::process::ExitCode;

use clap::Parser;
use forge_generate::GenerationError;
use forge_heal::HealError;
use forge_runtime::RuntimeError;
use forge_sandbox::SandboxError;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod config;

use commands::{Cli, Commands};
use config::ForgeConfig;

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_ARGS: u8 = 2;
    pub const CONFIG_ERROR: u8 = 3;
    pub const RUNTIME_ERROR: u8 = 4;
    pub const GENERATION_FAILURE: u8 = 5;
}

const CRATES: [&str; 6] = [
    "forge_cli",
    "forge_runtime",
    "forge_notify",
    "forge_sandbox",
    "forge_generate",
    "forge_heal",
];

fn init_logging(cli: &Cli) {
    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };
    let mut directives = vec!["warn".to_string()];
    directives.extend(CRATES.iter().map(|name| format!("{}={}", name, level)));

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(directives.join(",")));

    let log_result = tracing_subscriber::registry()
        .with(filter)
        .with(cli.log_json.then(|| fmt::layer().json()))
        .with((!cli.log_json).then(|| fmt::layer().with_target(false)))
        .try_init();

    if log_result.is_err() {
        // Logging already initialized, continue
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    let config = match ForgeConfig::load(cli.config.as_deref(), &cli.overrides()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Configuration error: {:#}", e);
            return ExitCode::from(ExitCodes::CONFIG_ERROR);
        }
    };

    let quiet = cli.quiet;
    let result = match cli.command {
        Commands::Run(args) => commands::run::execute(args, config, quiet).await,
        Commands::Generate(args) => commands::generate::execute(args, config, quiet).await,
        Commands::Status(args) => commands::status::execute(args, config).await,
        Commands::Config(args) => commands::config::execute(args, config).await,
    };

    match result {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            let exit_code = categorize_error(&e);
            eprintln!("❌ Error: {:#}", e);
            ExitCode::from(exit_code)
        }
    }
}

/// Categorize error to determine exit code
fn categorize_error(e: &anyhow::Error) -> u8 {
    for cause in e.chain() {
        if let Some(err) = cause.downcast_ref::<SandboxError>() {
            return match err {
                SandboxError::InvalidConfig(_) => ExitCodes::CONFIG_ERROR,
                _ => ExitCodes::RUNTIME_ERROR,
            };
        }
        if cause.downcast_ref::<RuntimeError>().is_some() {
            return ExitCodes::RUNTIME_ERROR;
        }
        if let Some(err) = cause.downcast_ref::<HealError>() {
            return match err {
                HealError::InvalidConfig(_) => ExitCodes::CONFIG_ERROR,
                _ => ExitCodes::GENERAL_ERROR,
            };
        }
        if cause.downcast_ref::<GenerationError>().is_some() {
            return ExitCodes::GENERATION_FAILURE;
        }
    }

    let msg = e.to_string().to_lowercase();
    if msg.contains("generation") {
        ExitCodes::GENERATION_FAILURE
    } else if msg.contains("container runtime") {
        ExitCodes::RUNTIME_ERROR
    } else if msg.contains("argument") {
        ExitCodes::INVALID_ARGS
    } else {
        ExitCodes::GENERAL_ERROR
    }
}
