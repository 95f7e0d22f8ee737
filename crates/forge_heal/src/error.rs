//! Error types for the healing module.

use forge_generate::GenerationError;
use forge_sandbox::SandboxError;
use thiserror::Error;

/// Result type alias for healing operations.
pub type HealResult<T> = Result<T, HealError>;

/// Errors that can occur while monitoring or repairing environments.
#[derive(Error, Debug)]
pub enum HealError {
    #[error("Environment not found: {0}")]
    NotFound(String),

    #[error("Sandbox error: {0}")]
    Sandbox(#[from] SandboxError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
