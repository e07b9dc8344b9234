use serde::{Deserialize, Serialize};

use crate::core::bluetooth::DeviceDescriptor;

/// Discovery options of the platform
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LissabonOptions {
    /// mDNS discovery of WiFi lights. Not supported; takes precedence when set.
    pub discover_wifi: bool,
    /// Scan for BLE lights and register what is found.
    pub discover_ble: bool,
    /// Statically configured lights, registered when no discovery is enabled.
    pub devices: Vec<DeviceDescriptor>,
}

impl LissabonOptions {
    /// True if any configured device is reached over BLE.
    pub fn has_ble_devices(&self) -> bool {
        self.devices.iter().any(|d| d.is_bluetooth)
    }
}
