//! Config command - print the effective configuration.

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};

use crate::config::ForgeConfig;

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ConfigFormat {
    Toml,
    Yaml,
    Json,
}

#[derive(Args)]
pub struct ConfigArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value = "toml")]
    pub format: ConfigFormat,
}

pub fn render(config: &ForgeConfig, format: ConfigFormat) -> Result<String> {
    let rendered = match format {
        ConfigFormat::Toml => toml::to_string_pretty(config).context("Failed to render TOML")?,
        ConfigFormat::Yaml => serde_yaml::to_string(config).context("Failed to render YAML")?,
        ConfigFormat::Json => {
            serde_json::to_string_pretty(config).context("Failed to render JSON")?
        }
    };
    Ok(rendered)
}

pub async fn execute(args: ConfigArgs, config: ForgeConfig) -> Result<()> {
    println!("{}", render(&config, args.format)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rendered_toml_round_trips() {
        let rendered = render(&ForgeConfig::default(), ConfigFormat::Toml).unwrap();
        assert!(rendered.contains("max_concurrent = 10"));

        let parsed: ForgeConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.healing.scan_interval_secs, 10);
    }
}
