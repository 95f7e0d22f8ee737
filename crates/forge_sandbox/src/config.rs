//! Environment manager configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{SandboxError, SandboxResult};

/// Configuration for the environment manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Maximum number of resident environments
    pub max_concurrent: usize,
    /// Age in seconds after which an environment is reclaimed
    pub idle_timeout_secs: u64,
    /// Seconds between reclaimer passes
    pub reclaim_interval_secs: u64,
    /// Base image the project Dockerfile starts from
    pub base_image: String,
    /// Port the dev server listens on inside the instance
    pub app_port: u16,
    /// Host reported in environment URLs
    pub host: String,
    /// Lines of recent output kept per environment
    pub output_buffer_lines: usize,
    /// Command used to read recent output when the buffer is empty
    pub tail_command: String,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 10,
            idle_timeout_secs: 300,
            reclaim_interval_secs: 60,
            base_image: "node:18-alpine".to_string(),
            app_port: 3000,
            host: "localhost".to_string(),
            output_buffer_lines: 200,
            tail_command: "tail -n 50 /var/log/app.log 2>/dev/null".to_string(),
        }
    }
}

impl SandboxConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn reclaim_interval(&self) -> Duration {
        Duration::from_secs(self.reclaim_interval_secs)
    }

    /// Reject values the manager cannot operate with.
    pub fn validate(&self) -> SandboxResult<()> {
        if self.max_concurrent == 0 {
            return Err(SandboxError::InvalidConfig(
                "max_concurrent must be at least 1".to_string(),
            ));
        }
        if self.reclaim_interval_secs == 0 {
            return Err(SandboxError::InvalidConfig(
                "reclaim_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.base_image.trim().is_empty() {
            return Err(SandboxError::InvalidConfig("base_image is empty".to_string()));
        }
        Ok(())
    }
}
