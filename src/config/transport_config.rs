use serde::{Deserialize, Serialize};

use crate::core::bluetooth::{
    BLUETOOTH_OPERATION_TIMEOUT_MS, DEFAULT_MAX_CONCURRENT_CONNECTS, WIFI_REQUEST_TIMEOUT_MS,
};

/// Bluetooth radio settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BleConfig {
    /// Upper bound for each connect, discover, read, write and disconnect step.
    pub operation_timeout_ms: u64,
    /// Connects allowed in flight on the shared radio.
    pub max_concurrent_connects: usize,
    /// Resume scanning after a connect finishes; when false the scan stays stopped.
    pub resume_scan_after_connect: bool,
}

impl Default for BleConfig {
    fn default() -> Self {
        BleConfig {
            operation_timeout_ms: BLUETOOTH_OPERATION_TIMEOUT_MS,
            max_concurrent_connects: DEFAULT_MAX_CONCURRENT_CONNECTS,
            resume_scan_after_connect: true,
        }
    }
}

/// WiFi (HTTP) settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WifiConfig {
    pub request_timeout_ms: u64,
}

impl Default for WifiConfig {
    fn default() -> Self {
        WifiConfig {
            request_timeout_ms: WIFI_REQUEST_TIMEOUT_MS,
        }
    }
}
