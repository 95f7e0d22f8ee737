//! Error types for the sandbox module.

use forge_runtime::RuntimeError;
use thiserror::Error;

/// Result type alias for sandbox operations.
pub type SandboxResult<T> = Result<T, SandboxError>;

/// Errors that can occur while managing environments.
#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("Maximum concurrent environments ({limit}) reached")]
    CapacityExceeded { limit: usize },

    #[error("Environment not found: {0}")]
    NotFound(String),

    #[error("Environment {0} has no running instance")]
    NotRunning(String),

    #[error("Environment manager is shutting down")]
    ShuttingDown,

    #[error("Environment {0} was destroyed during creation")]
    Aborted(String),

    #[error("Runtime error: {0}")]
    Collaborator(#[from] RuntimeError),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
