//! Environment runtime trait and types.

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::config::InstanceSpec;
use crate::error::RuntimeResult;

/// Reference to a built image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef(pub String);

impl ImageRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque handle to a created instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceHandle {
    /// Runtime-assigned identifier
    pub id: String,
    /// Human-readable instance name
    pub name: String,
}

impl fmt::Display for InstanceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// Network endpoint an instance is reachable on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// HTTP URL for the endpoint.
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// What to build an image from.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Directory holding the file tree and its `Dockerfile`
    pub context_dir: PathBuf,
    /// Base image the Dockerfile starts from
    pub base_image: String,
    /// Tag for the resulting image
    pub tag: String,
}

/// Result of executing a command inside an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOutput {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(exit_code: i64, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Check if the command exited with code 0.
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }

    /// Get combined output (stdout + stderr).
    pub fn combined_output(&self) -> String {
        if self.stdout.is_empty() {
            self.stderr.clone()
        } else if self.stderr.is_empty() {
            self.stdout.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Output stream a log line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSource {
    Stdout,
    Stderr,
}

impl fmt::Display for LogSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdout => write!(f, "stdout"),
            Self::Stderr => write!(f, "stderr"),
        }
    }
}

/// One line of instance output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub timestamp: DateTime<Utc>,
    pub source: LogSource,
    pub message: String,
}

impl LogLine {
    pub fn new(source: LogSource, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            source,
            message: message.into(),
        }
    }
}

/// Lazily produced instance output. Ends when the instance stops.
pub type LogStream = BoxStream<'static, RuntimeResult<LogLine>>;

/// Environment runtime trait.
///
/// Builds and runs one isolated instance per environment and exposes the
/// control surface the environment manager drives.
#[async_trait]
pub trait EnvironmentRuntime: Send + Sync {
    /// Build an image from a file tree.
    async fn build(&self, request: &BuildRequest) -> RuntimeResult<ImageRef>;

    /// Create an instance from an image without starting it.
    async fn run(&self, image: &ImageRef, spec: &InstanceSpec) -> RuntimeResult<InstanceHandle>;

    /// Start an instance and report the host endpoint bound to its port.
    async fn start(&self, handle: &InstanceHandle, spec: &InstanceSpec) -> RuntimeResult<Endpoint>;

    /// Execute a shell command inside a running instance.
    async fn exec(&self, handle: &InstanceHandle, command: &str) -> RuntimeResult<ExecOutput>;

    /// Follow combined stdout/stderr. Re-issue the call to restart.
    async fn stream_logs(&self, handle: &InstanceHandle) -> RuntimeResult<LogStream>;

    /// Stop a running instance.
    async fn stop(&self, handle: &InstanceHandle) -> RuntimeResult<()>;

    /// Remove a stopped instance.
    async fn remove(&self, handle: &InstanceHandle) -> RuntimeResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combined_output() {
        let both = ExecOutput {
            exit_code: 1,
            stdout: "out".to_string(),
            stderr: "err".to_string(),
        };
        assert_eq!(both.combined_output(), "out\nerr");
        assert_eq!(ExecOutput::success("only").combined_output(), "only");
        assert!(!ExecOutput::failure(2, "bad").succeeded());
    }

    #[test]
    fn test_endpoint_url() {
        assert_eq!(Endpoint::new("localhost", 41234).url(), "http://localhost:41234");
    }
}
