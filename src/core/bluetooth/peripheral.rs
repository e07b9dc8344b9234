//! GATT access to one peripheral
//! The session and scanner only talk to the radio through [`GattPeripheral`],
//! so the bluest-backed implementation below can be swapped for a test double.

use async_trait::async_trait;
use bluest::{Adapter, Characteristic, Device};
use log::{debug, info};
use regex::Regex;
use uuid::Uuid;

use crate::core::error::Result;

/// GATT operations against one remote peripheral
#[async_trait]
pub trait GattPeripheral: Send + Sync + 'static {
    /// Characteristic reference valid for the lifetime of the peripheral object
    type Handle: Clone + Send + Sync + 'static;

    /// Hardware address, or an empty string on platforms that hide it
    fn link_address(&self) -> String;

    /// Identifier assigned by the BLE stack
    fn session_id(&self) -> String;

    async fn connect(&self) -> Result<()>;

    /// Discovers the characteristics of `service` restricted to `wanted`.
    /// A missing service yields an empty list.
    async fn discover(&self, service: Uuid, wanted: &[Uuid]) -> Result<Vec<(Uuid, Self::Handle)>>;

    async fn read(&self, handle: &Self::Handle) -> Result<Vec<u8>>;

    async fn write(&self, handle: &Self::Handle, data: &[u8]) -> Result<()>;

    async fn disconnect(&self) -> Result<()>;
}

/// A peripheral reached through the bluest adapter
#[derive(Clone)]
pub struct BluestPeripheral {
    adapter: Adapter,
    device: Device,
}

impl BluestPeripheral {
    pub fn new(adapter: Adapter, device: Device) -> Self {
        Self { adapter, device }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }
}

#[async_trait]
impl GattPeripheral for BluestPeripheral {
    type Handle = Characteristic;

    fn link_address(&self) -> String {
        extract_mac_address(&self.device.id().to_string()).unwrap_or_default()
    }

    fn session_id(&self) -> String {
        self.device.id().to_string()
    }

    async fn connect(&self) -> Result<()> {
        if !self.device.is_connected().await {
            info!("Initiating connection to {}...", self.device.id());
            self.adapter.connect_device(&self.device).await?;
        }
        Ok(())
    }

    async fn discover(&self, service_uuid: Uuid, wanted: &[Uuid]) -> Result<Vec<(Uuid, Characteristic)>> {
        let services = self.device.discover_services_with_uuid(service_uuid).await?;
        let Some(service) = services.first() else {
            debug!("Service {} not present on {}", service_uuid, self.device.id());
            return Ok(Vec::new());
        };

        let mut found = Vec::new();
        for uuid in wanted {
            for characteristic in service.discover_characteristics_with_uuid(*uuid).await? {
                debug!("Found characteristic: {}", characteristic.uuid());
                found.push((characteristic.uuid(), characteristic));
            }
        }
        Ok(found)
    }

    async fn read(&self, handle: &Characteristic) -> Result<Vec<u8>> {
        Ok(handle.read().await?)
    }

    async fn write(&self, handle: &Characteristic, data: &[u8]) -> Result<()> {
        handle.write(data).await?;
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        if self.device.is_connected().await {
            self.adapter.disconnect_device(&self.device).await?;
        } else {
            debug!("Device {} not connected", self.device.id());
        }
        Ok(())
    }
}

/// Pulls a MAC address out of a platform device id, if it carries one.
pub fn extract_mac_address(device_id_str: &str) -> Option<String> {
    let re = Regex::new(r"([0-9A-Fa-f]{2}[:-]){5}([0-9A-Fa-f]{2})").ok()?;
    re.find_iter(device_id_str)
        .last()
        .map(|m| m.as_str().replace('-', ":").to_uppercase())
}
