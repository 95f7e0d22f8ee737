//! LLM client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the LLM-backed generation client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// `openai` or `anthropic`; detected from the environment when unset
    pub provider: Option<String>,
    /// Model override
    pub model: Option<String>,
    /// Seconds a completed generation stays cached
    pub cache_ttl_secs: u64,
    /// Maximum tokens per completion
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: None,
            model: None,
            cache_ttl_secs: 3600,
            max_tokens: 4096,
        }
    }
}

impl LlmConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}
