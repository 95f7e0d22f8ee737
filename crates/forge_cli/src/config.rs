//! Effective configuration of the `forge` binary.
//!
//! Defaults come from the component crates, a TOML or YAML file may
//! override them, and `FORGE_*` environment variables or flags override the
//! file.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use forge_generate::LlmConfig;
use forge_heal::HealingConfig;
use forge_sandbox::SandboxConfig;
use serde::{Deserialize, Serialize};

/// Values set from the command line or environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub max_concurrent: Option<usize>,
    pub idle_timeout_secs: Option<u64>,
    pub reclaim_interval_secs: Option<u64>,
    pub scan_interval_secs: Option<u64>,
}

/// Configuration for every component.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ForgeConfig {
    pub sandbox: SandboxConfig,
    pub healing: HealingConfig,
    pub llm: LlmConfig,
}

impl ForgeConfig {
    /// Load from a file, picking the format by extension.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {:?}", path))?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("toml") => toml::from_str(&content)
                .with_context(|| format!("Invalid TOML configuration in {:?}", path)),
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
                .with_context(|| format!("Invalid YAML configuration in {:?}", path)),
            _ => bail!(
                "Unsupported configuration format {:?}, expected .toml, .yaml or .yml",
                path
            ),
        }
    }

    /// Defaults, then the optional file, then the overrides. The result is
    /// validated.
    pub fn load(path: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply(overrides);
        config.validate()?;
        Ok(config)
    }

    pub fn apply(&mut self, overrides: &Overrides) {
        if let Some(value) = overrides.max_concurrent {
            self.sandbox.max_concurrent = value;
        }
        if let Some(value) = overrides.idle_timeout_secs {
            self.sandbox.idle_timeout_secs = value;
        }
        if let Some(value) = overrides.reclaim_interval_secs {
            self.sandbox.reclaim_interval_secs = value;
        }
        if let Some(value) = overrides.scan_interval_secs {
            self.healing.scan_interval_secs = value;
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.sandbox
            .validate()
            .context("Invalid sandbox configuration")?;
        self.healing
            .validate()
            .context("Invalid healing configuration")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(suffix: &str, content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = ForgeConfig::load(None, &Overrides::default()).unwrap();
        assert_eq!(config.sandbox.max_concurrent, 10);
        assert_eq!(config.sandbox.idle_timeout_secs, 300);
        assert_eq!(config.sandbox.reclaim_interval_secs, 60);
        assert_eq!(config.healing.scan_interval_secs, 10);
        assert_eq!(config.llm.cache_ttl_secs, 3600);
    }

    #[test]
    fn test_toml_file() {
        let file = write_config(
            ".toml",
            "[sandbox]\nmax_concurrent = 4\n\n[healing]\nauto_fix_enabled = false\n",
        );
        let config = ForgeConfig::load(Some(file.path()), &Overrides::default()).unwrap();
        assert_eq!(config.sandbox.max_concurrent, 4);
        assert_eq!(config.sandbox.idle_timeout_secs, 300);
        assert!(!config.healing.auto_fix_enabled);
    }

    #[test]
    fn test_yaml_file_with_overrides() {
        let file = write_config(".yaml", "sandbox:\n  idle_timeout_secs: 120\nllm:\n  provider: anthropic\n");
        let overrides = Overrides {
            idle_timeout_secs: Some(600),
            scan_interval_secs: Some(5),
            ..Default::default()
        };
        let config = ForgeConfig::load(Some(file.path()), &overrides).unwrap();
        assert_eq!(config.sandbox.idle_timeout_secs, 600);
        assert_eq!(config.healing.scan_interval_secs, 5);
        assert_eq!(config.llm.provider.as_deref(), Some("anthropic"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let overrides = Overrides {
            max_concurrent: Some(0),
            ..Default::default()
        };
        assert!(ForgeConfig::load(None, &overrides).is_err());

        let overrides = Overrides {
            scan_interval_secs: Some(0),
            ..Default::default()
        };
        assert!(ForgeConfig::load(None, &overrides).is_err());
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let file = write_config(".ini", "max_concurrent=3");
        let err = ForgeConfig::from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("Unsupported configuration format"));
    }
}
