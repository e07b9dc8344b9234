//! Lissabon platform
//! Picks the discovery mode at launch and turns device descriptors into
//! registered accessories with a lightbulb handler each.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, error, info, warn};
use tokio::sync::{Mutex, mpsc};
use uuid::Uuid;

use crate::config::LissabonConfig;
use crate::core::bluetooth::{
    CommandExecutor, DeviceDescriptor, DeviceSession, Discovery, GattPeripheral, RadioCoordinator,
};
use crate::core::lightbulb::{AccessoryInfo, Lightbulb};
use crate::core::wifi::WifiLight;

/// Deterministic accessory id for a device address.
pub fn accessory_uuid(address: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, address.as_bytes())
}

/// An accessory as the bridge stores it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformAccessory {
    pub uuid: Uuid,
    pub display_name: String,
    pub info: AccessoryInfo,
    /// The descriptor the accessory was created from
    pub context: DeviceDescriptor,
}

impl PlatformAccessory {
    pub fn new(device: &DeviceDescriptor) -> Self {
        Self {
            uuid: accessory_uuid(&device.address),
            display_name: device.name.clone(),
            info: AccessoryInfo::for_device(device),
            context: device.clone(),
        }
    }
}

/// The bridge side of accessory registration
#[async_trait]
pub trait AccessoryRegistry: Send + Sync + 'static {
    async fn find(&self, uuid: &Uuid) -> Option<PlatformAccessory>;
    async fn register(&self, accessory: PlatformAccessory) -> Result<()>;
}

/// Registry kept in memory; `restore` plays the part of the bridge's cache.
#[derive(Default)]
pub struct InMemoryRegistry {
    accessories: Mutex<HashMap<Uuid, PlatformAccessory>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called for every accessory restored from the cache before launch.
    pub async fn restore(&self, accessory: PlatformAccessory) {
        info!("Loading accessory from cache: {}", accessory.display_name);
        self.accessories.lock().await.insert(accessory.uuid, accessory);
    }

    pub async fn accessories(&self) -> Vec<PlatformAccessory> {
        self.accessories.lock().await.values().cloned().collect()
    }
}

#[async_trait]
impl AccessoryRegistry for InMemoryRegistry {
    async fn find(&self, uuid: &Uuid) -> Option<PlatformAccessory> {
        self.accessories.lock().await.get(uuid).cloned()
    }

    async fn register(&self, accessory: PlatformAccessory) -> Result<()> {
        let mut accessories = self.accessories.lock().await;
        if accessories.contains_key(&accessory.uuid) {
            anyhow::bail!("duplicate accessory UUID {}", accessory.uuid);
        }
        accessories.insert(accessory.uuid, accessory);
        Ok(())
    }
}

/// The mode chosen at launch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchMode {
    WifiDiscovery,
    BleDiscovery,
    Static,
    /// No `options` section at all
    Unconfigured,
}

/// What to do with scanner discoveries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryPolicy {
    /// Register every discovered light.
    RegisterAll,
    /// Only hand peripherals to already configured lights.
    AttachKnown,
}

pub struct LissabonPlatform<P: GattPeripheral, R: AccessoryRegistry> {
    config: LissabonConfig,
    registry: Arc<R>,
    radio: RadioCoordinator,
    http: reqwest::Client,
    handlers: Mutex<HashMap<String, Arc<Lightbulb<P>>>>,
}

impl<P: GattPeripheral, R: AccessoryRegistry> LissabonPlatform<P, R> {
    pub fn new(config: LissabonConfig, registry: Arc<R>, radio: RadioCoordinator) -> Result<Self> {
        let http = WifiLight::client(Duration::from_millis(config.wifi.request_timeout_ms))
            .context("Failed to build HTTP client")?;
        Ok(Self {
            config,
            registry,
            radio,
            http,
            handlers: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &LissabonConfig {
        &self.config
    }

    pub fn radio(&self) -> &RadioCoordinator {
        &self.radio
    }

    pub fn launch_mode(&self) -> LaunchMode {
        match &self.config.options {
            None => LaunchMode::Unconfigured,
            Some(options) if options.discover_wifi => LaunchMode::WifiDiscovery,
            Some(options) if options.discover_ble => LaunchMode::BleDiscovery,
            Some(_) => LaunchMode::Static,
        }
    }

    /// Runs the launch step of the chosen mode.
    ///
    /// Static devices are registered here; BLE discovery is left to the
    /// caller, which owns the scanner and feeds [`Self::run_discovery`].
    pub async fn did_finish_launching(&self) -> Result<LaunchMode> {
        let mode = self.launch_mode();
        match mode {
            LaunchMode::Unconfigured => {
                error!("No configuration options found");
            }
            LaunchMode::WifiDiscovery => {
                warn!("mDNS discovery of WiFi lights is not supported; nothing registered");
            }
            LaunchMode::BleDiscovery => {
                debug!("Executed didFinishLaunching callback, BLE-discover");
            }
            LaunchMode::Static => {
                debug!("Executed didFinishLaunching callback, register");
                self.register_configured().await?;
            }
        }
        Ok(mode)
    }

    async fn register_configured(&self) -> Result<()> {
        let devices = self
            .config
            .options
            .as_ref()
            .map(|options| options.devices.clone())
            .unwrap_or_default();
        if devices.is_empty() {
            warn!("No devices configured");
            return Ok(());
        }
        for device in devices {
            self.register_device(device, None).await?;
        }
        Ok(())
    }

    /// Registers a device once; later calls only attach a live peripheral.
    pub async fn register_device(
        &self,
        device: DeviceDescriptor,
        peripheral: Option<P>,
    ) -> Result<Arc<Lightbulb<P>>> {
        let mut handlers = self.handlers.lock().await;

        if let Some(handler) = handlers.get(&device.address).cloned() {
            drop(handlers);
            if let (Some(peripheral), Some(light)) = (peripheral, handler.as_ble()) {
                if light.attach(peripheral).await {
                    info!("[{}] Peripheral attached to {}", device.name, device.address);
                }
            }
            return Ok(handler);
        }

        let uuid = accessory_uuid(&device.address);
        match self.registry.find(&uuid).await {
            Some(existing) => {
                info!("Restoring existing accessory from cache: {}", existing.display_name);
            }
            None => {
                info!("Adding new accessory: {:?}", device);
                self.registry
                    .register(PlatformAccessory::new(&device))
                    .await
                    .with_context(|| format!("Failed to register {}", device.address))?;
            }
        }

        let handler = Arc::new(self.build_handler(device.clone(), peripheral));
        handlers.insert(device.address, handler.clone());
        Ok(handler)
    }

    fn build_handler(&self, device: DeviceDescriptor, peripheral: Option<P>) -> Lightbulb<P> {
        if device.is_bluetooth {
            let session = DeviceSession::new(
                &device.name,
                &device.address,
                peripheral,
                self.radio.clone(),
                Duration::from_millis(self.config.ble.operation_timeout_ms),
            );
            Lightbulb::Ble(CommandExecutor::new(device, session))
        } else {
            Lightbulb::Wifi(WifiLight::new(device, self.http.clone()))
        }
    }

    /// Consumes scanner discoveries until the channel closes.
    pub async fn run_discovery(
        &self,
        mut discoveries: mpsc::Receiver<Discovery<P>>,
        policy: DiscoveryPolicy,
    ) {
        while let Some(Discovery { descriptor, peripheral }) = discoveries.recv().await {
            match policy {
                DiscoveryPolicy::RegisterAll => {
                    if let Err(e) = self.register_device(descriptor, Some(peripheral)).await {
                        error!("Failed to register discovered light: {:#}", e);
                    }
                }
                DiscoveryPolicy::AttachKnown => match self.handler(&descriptor.address).await {
                    Some(handler) => {
                        if let Some(light) = handler.as_ble() {
                            if light.attach(peripheral).await {
                                info!(
                                    "[{}] Peripheral attached to {}",
                                    descriptor.name, descriptor.address
                                );
                            }
                        }
                    }
                    None => debug!("Ignoring unconfigured light {}", descriptor.address),
                },
            }
        }
        debug!("Discovery channel closed");
    }

    pub async fn handler(&self, address: &str) -> Option<Arc<Lightbulb<P>>> {
        self.handlers.lock().await.get(address).cloned()
    }

    pub async fn handlers(&self) -> Vec<Arc<Lightbulb<P>>> {
        self.handlers.lock().await.values().cloned().collect()
    }
}
