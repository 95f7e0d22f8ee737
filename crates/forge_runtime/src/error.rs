//! Error types for the runtime module.

use thiserror::Error;

/// Result type alias for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Errors raised by an environment runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Container runtime not available: {0}")]
    Unavailable(String),

    #[error("Image build failed: {0}")]
    BuildFailed(String),

    #[error("Image pull failed: {0}")]
    ImagePullFailed(String),

    #[error("Instance not found: {0}")]
    InstanceNotFound(String),

    #[error("Instance start failed: {0}")]
    StartFailed(String),

    #[error("No host port bound for container port {0}")]
    PortNotBound(u16),

    #[error("Command execution failed: {0}")]
    ExecFailed(String),

    #[error("Log stream failed: {0}")]
    LogStream(String),

    #[error("Docker API error: {0}")]
    DockerApi(#[from] bollard::errors::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
