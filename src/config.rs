use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::logging::{LogFormat, LogLevel};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub harvest: HarvestConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_store_base")]
    pub store_base: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            store_base: default_store_base(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_api_base() -> String {
    "https://api.steampowered.com".to_string()
}
fn default_store_base() -> String {
    "https://store.steampowered.com".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_user_agent() -> String {
    concat!("steam-harvest/", env!("CARGO_PKG_VERSION")).to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct HarvestConfig {
    #[serde(default = "default_checkpoint_every")]
    pub checkpoint_every: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub request_delay_ms: u64,
    /// Ids known to never resolve. Skipped in place.
    #[serde(default = "default_denylist")]
    pub denylist: Vec<i64>,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            checkpoint_every: default_checkpoint_every(),
            max_attempts: default_max_attempts(),
            request_delay_ms: 0,
            denylist: default_denylist(),
        }
    }
}

fn default_checkpoint_every() -> usize {
    100
}
fn default_max_attempts() -> u32 {
    3
}
fn default_denylist() -> Vec<i64> {
    vec![440810]
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,
    #[serde(default)]
    pub format: LogFormat,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.harvest.checkpoint_every == 0 {
        anyhow::bail!("harvest.checkpoint_every must be >= 1");
    }
    if config.harvest.max_attempts == 0 {
        anyhow::bail!("harvest.max_attempts must be >= 1");
    }
    if config.source.timeout_secs == 0 {
        anyhow::bail!("source.timeout_secs must be >= 1");
    }
    if config.source.api_base.trim().is_empty() {
        anyhow::bail!("source.api_base must not be empty");
    }
    if config.source.store_base.trim().is_empty() {
        anyhow::bail!("source.store_base must not be empty");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_str)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn defaults_fill_missing_sections() {
        let config = parse("[db]\npath = \"./data/steam.sqlite\"\n").unwrap();
        assert_eq!(config.harvest.checkpoint_every, 100);
        assert_eq!(config.harvest.max_attempts, 3);
        assert_eq!(config.harvest.denylist, vec![440810]);
        assert_eq!(config.source.timeout_secs, 30);
        assert_eq!(config.logging.level, LogLevel::Info);
        assert_eq!(config.logging.format, LogFormat::Text);
    }

    #[test]
    fn rejects_zero_checkpoint_interval() {
        let err = parse("[db]\npath = \"x\"\n[harvest]\ncheckpoint_every = 0\n").unwrap_err();
        assert!(err.to_string().contains("checkpoint_every"));
    }

    #[test]
    fn rejects_zero_attempts() {
        assert!(parse("[db]\npath = \"x\"\n[harvest]\nmax_attempts = 0\n").is_err());
    }

    #[test]
    fn rejects_unknown_log_level() {
        assert!(parse("[db]\npath = \"x\"\n[logging]\nlevel = \"loud\"\n").is_err());
    }

    #[test]
    fn empty_denylist_is_allowed() {
        let config = parse("[db]\npath = \"x\"\n[harvest]\ndenylist = []\n").unwrap();
        assert!(config.harvest.denylist.is_empty());
    }
}
