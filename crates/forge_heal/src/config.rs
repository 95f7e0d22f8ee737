//! Healing configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HealError, HealResult};

/// Shell commands the repair strategies run inside an environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairCommands {
    /// Prefix for installing a missing package; the package name is appended
    pub install: String,
    pub rebuild: String,
    pub reinstall: String,
    pub lint_fix: String,
    pub format: String,
}

impl Default for RepairCommands {
    fn default() -> Self {
        Self {
            install: "npm install".to_string(),
            rebuild: "npm run build".to_string(),
            reinstall: "npm install --force".to_string(),
            lint_fix: "npx eslint . --fix".to_string(),
            format: "npx prettier --write .".to_string(),
        }
    }
}

/// Error monitor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealingConfig {
    pub scan_interval_secs: u64,
    /// When false, scans report failures without running strategies
    pub auto_fix_enabled: bool,
    pub commands: RepairCommands,
    /// File name globs for the source file a rewrite targets
    pub source_patterns: Vec<String>,
}

impl Default for HealingConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: 10,
            auto_fix_enabled: true,
            commands: RepairCommands::default(),
            source_patterns: ["*.ts", "*.tsx", "*.js", "*.jsx"]
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}

impl HealingConfig {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }

    pub fn validate(&self) -> HealResult<()> {
        if self.scan_interval_secs == 0 {
            return Err(HealError::InvalidConfig(
                "scan_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.source_patterns.is_empty() {
            return Err(HealError::InvalidConfig(
                "source_patterns must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HealingConfig::default();
        assert_eq!(config.scan_interval(), Duration::from_secs(10));
        assert!(config.auto_fix_enabled);
        assert_eq!(config.commands.rebuild, "npm run build");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_override() {
        let config: HealingConfig =
            serde_json::from_str(r#"{"auto_fix_enabled": false, "commands": {"format": "npx biome format --write ."}}"#)
                .unwrap();
        assert!(!config.auto_fix_enabled);
        assert_eq!(config.scan_interval_secs, 10);
        assert_eq!(config.commands.format, "npx biome format --write .");
        assert_eq!(config.commands.lint_fix, "npx eslint . --fix");
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = HealingConfig {
            scan_interval_secs: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(HealError::InvalidConfig(_))));
    }
}
