pub mod poll_config;
pub mod telemetry_config;

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::config::poll_config::PollConfig;
use crate::config::telemetry_config::TelemetryConfig;
use crate::core::bluetooth::constants::DEFAULT_SCAN_TIMEOUT_SECS;

pub const CONFIG_FILE_NAME: &str = "peripheral_link.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtensionConfig {
    pub telemetry: TelemetryConfig,
    pub poll: PollConfig,
    /// How long a device request scans before giving up
    pub scan_timeout_secs: u64,
}

impl Default for ExtensionConfig {
    fn default() -> Self {
        ExtensionConfig {
            telemetry: TelemetryConfig::default(),
            poll: PollConfig::default(),
            scan_timeout_secs: DEFAULT_SCAN_TIMEOUT_SECS,
        }
    }
}

impl ExtensionConfig {
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Loads the config from `dir`, falling back to defaults when the file is missing.
    pub async fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let file_path = dir.as_ref().join(CONFIG_FILE_NAME);

        if !file_path.exists() {
            warn!("Config file not found at {:?}, using default.", file_path);
            return Ok(Self::default());
        }

        let config_json = fs::read_to_string(&file_path).await?;
        let config = Self::from_json_str(&config_json)?;

        info!("Config loaded from {:?}", file_path);
        Ok(config)
    }

    /// Saves the config into `dir`, creating the directory if needed.
    pub async fn save(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create config directory {:?}", dir))?;
        let file_path = dir.join(CONFIG_FILE_NAME);

        let config_json = match serde_json::to_string_pretty(self) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize extension config to JSON: {}", e);
                return Err(e.into());
            }
        };

        fs::write(&file_path, config_json).await?;

        info!("Extension config saved to {:?}.", file_path);
        Ok(())
    }
}
