pub mod options;
pub mod transport_config;

use std::path::Path;

use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::core::error::Result;
use crate::utils::ensure_directory_exists;

pub use options::LissabonOptions;
pub use transport_config::{BleConfig, WifiConfig};

pub const DEFAULT_CONFIG_FILE_NAME: &str = "lissabon.json";

fn default_log_level() -> String {
    "info".to_string()
}

/// Platform configuration, in the bridge's config file layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LissabonConfig {
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub options: Option<LissabonOptions>,
    #[serde(default)]
    pub ble: BleConfig,
    #[serde(default)]
    pub wifi: WifiConfig,
}

impl Default for LissabonConfig {
    fn default() -> Self {
        LissabonConfig {
            platform: Some("Lissabon".to_string()),
            name: Some("Lissabon".to_string()),
            log_level: default_log_level(),
            options: Some(LissabonOptions {
                discover_ble: true,
                ..LissabonOptions::default()
            }),
            ble: BleConfig::default(),
            wifi: WifiConfig::default(),
        }
    }
}

impl LissabonConfig {
    /// Loads the config from `path`; a missing file yields the defaults.
    pub async fn load(path: &Path) -> Result<Self> {
        let file_path_str = path.to_string_lossy().into_owned();
        if !path.exists() {
            warn!("Config file not found at {:?}, using default.", file_path_str);
            return Ok(Self::default());
        }

        let config_json = fs::read_to_string(path).await?;
        let config: Self = serde_json::from_str(&config_json)?;
        if config.options.is_none() {
            error!("No configuration options found");
        }

        info!("Config loaded from {:?}", file_path_str);
        Ok(config)
    }

    /// Saves the config to `path`, creating its directory if needed.
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            ensure_directory_exists(dir).await?;
        }

        let config_json = match serde_json::to_string_pretty(&self) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize config to JSON: {}", e);
                return Err(e.into());
            }
        };

        fs::write(path, config_json).await?;
        info!("Config saved to {:?}.", path.to_string_lossy());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bluetooth::DeviceType;

    #[test]
    fn parses_plugin_config() {
        let json = r#"{
            "platform": "Lissabon",
            "name": "Lissabon",
            "options": {
                "discoverWifi": false,
                "discoverBle": false,
                "devices": [{
                    "address": "192.168.1.40",
                    "name": "Kitchen",
                    "type": "ledstrip",
                    "hasBrightness": true,
                    "hasTemperature": true,
                    "isBluetooth": false
                }]
            },
            "ble": { "operationTimeoutMs": 2500 }
        }"#;
        let config: LissabonConfig = serde_json::from_str(json).unwrap();
        let options = config.options.unwrap();
        assert!(!options.discover_ble);
        assert_eq!(options.devices.len(), 1);
        assert_eq!(options.devices[0].device_type, DeviceType::Ledstrip);
        assert!(!options.has_ble_devices());
        assert_eq!(config.ble.operation_timeout_ms, 2500);
        assert_eq!(config.ble.max_concurrent_connects, 1);
        assert!(config.ble.resume_scan_after_connect);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn options_section_may_be_missing() {
        let config: LissabonConfig = serde_json::from_str(r#"{"platform": "Lissabon"}"#).unwrap();
        assert!(config.options.is_none());
    }

    #[tokio::test]
    async fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(DEFAULT_CONFIG_FILE_NAME);

        let mut config = LissabonConfig::default();
        config.ble.max_concurrent_connects = 2;
        config.save(&path).await.unwrap();

        let loaded = LissabonConfig::load(&path).await.unwrap();
        assert_eq!(loaded, config);
    }

    #[tokio::test]
    async fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = LissabonConfig::load(&dir.path().join("absent.json")).await.unwrap();
        assert_eq!(loaded, LissabonConfig::default());
    }
}
