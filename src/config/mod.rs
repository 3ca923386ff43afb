pub mod inspector_config;

use std::path::{Path, PathBuf};

use anyhow::Result;
use log::{Level, LevelFilter, error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::config::inspector_config::{ConnectionConfig, ScanConfig};
use crate::utils::ensure_directory_exists;

/// Default configuration file, relative to the working directory
pub const CONFIG_FILE_NAME: &str = "gatt-inspector.json";

/// Environment variable overriding the configuration file path
pub const CONFIG_PATH_ENV: &str = "GATT_INSPECTOR_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub scan: ScanConfig,
    pub connection: ConnectionConfig,
    /// One of off, error, warn, info, debug, trace
    pub log_level: String,
    /// Where characteristic metadata is persisted; in memory only when unset
    pub metadata_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            scan: ScanConfig::default(),
            connection: ConnectionConfig::default(),
            log_level: "info".to_string(),
            metadata_path: Some(PathBuf::from("gatt-metadata.json")),
        }
    }
}

impl AppConfig {
    /// The configured path, from the environment or the default file name
    pub fn default_path() -> PathBuf {
        std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME))
    }

    /// Log level filter, falling back to info for unknown names
    pub fn log_level(&self) -> LevelFilter {
        self.log_level.parse().unwrap_or_else(|_| {
            warn!("Unknown log level {:?}, using info", self.log_level);
            LevelFilter::Info
        })
    }

    /// What to report about `path` once logging is installed, since loading
    /// happens before the logger exists
    pub fn load_report(path: &Path) -> (Level, String) {
        if path.exists() {
            (Level::Info, format!("Config loaded from {:?}", path))
        } else {
            (Level::Warn, format!("Config file not found at {:?}, using default.", path))
        }
    }

    /// Loads the config from a configuration file.
    pub async fn load_config<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file_path = path.as_ref();

        if !file_path.exists() {
            warn!("Config file not found at {:?}, using default.", file_path);
            return Ok(Self::default());
        }

        let config_json = fs::read_to_string(file_path).await?;
        let config: Self = serde_json::from_str(&config_json)?;

        info!("Config loaded from {:?}", file_path);
        Ok(config)
    }

    /// Saves the current config to a configuration file.
    pub async fn save_config<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file_path = path.as_ref();
        if let Some(dir) = file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            ensure_directory_exists(dir).await?;
        }

        let config_json = match serde_json::to_string_pretty(&self) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize config to JSON: {}", e);
                return Err(e.into());
            }
        };

        fs::write(file_path, config_json).await?;
        info!("Config saved to {:?}.", file_path);
        Ok(())
    }
}
