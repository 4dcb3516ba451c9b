use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::metrics::thresholds::{self, ThresholdConfig, ThresholdOverrides};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Location of the snapshot database (default: `<config dir>/metrics.db`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
    /// Partial threshold overrides; unset fields keep their defaults
    #[serde(default)]
    pub thresholds: ThresholdOverrides,
}

impl Config {
    pub fn config_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("TEAM_PULSE_CONFIG_DIR") {
            PathBuf::from(dir)
        } else {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("~/.config"))
                .join("team-pulse")
        }
    }

    pub fn config_file() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load config from file, returning defaults if the file doesn't exist
    pub fn load() -> Result<Self> {
        let path = Self::config_file();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let dir = Self::config_dir();
        fs::create_dir_all(&dir)?;

        let path = Self::config_file();
        let content = toml::to_string_pretty(self)?;
        fs::write(&path, &content)?;
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("metrics.db"))
    }

    /// Thresholds with this config's overrides applied
    pub fn thresholds(&self) -> ThresholdConfig {
        thresholds::resolve(Some(&self.thresholds))
    }
}
