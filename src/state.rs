//! Bridge state management
//! This module wires the configuration, the platform and the Bluetooth manager together.

use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, warn};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::LissabonConfig;
use crate::core::BluetoothManager;
use crate::core::bluetooth::{BluestPeripheral, RadioCoordinator};
use crate::platform::{DiscoveryPolicy, InMemoryRegistry, LaunchMode, LissabonPlatform};

pub type Platform = LissabonPlatform<BluestPeripheral, InMemoryRegistry>;

/// Running bridge
pub struct BridgeState {
    pub platform: Arc<Platform>,
    pub registry: Arc<InMemoryRegistry>,
    bluetooth_manager: Option<Arc<Mutex<BluetoothManager>>>,
    discovery_task: Option<JoinHandle<()>>,
}

impl BridgeState {
    pub fn new(config: LissabonConfig) -> Result<Self> {
        let radio = RadioCoordinator::new(
            config.ble.max_concurrent_connects,
            config.ble.resume_scan_after_connect,
        );
        let registry = Arc::new(InMemoryRegistry::new());
        let platform = Arc::new(LissabonPlatform::new(config, registry.clone(), radio)?);
        Ok(Self {
            platform,
            registry,
            bluetooth_manager: None,
            discovery_task: None,
        })
    }

    /// Launches the platform and, when BLE lights are involved, the scanner.
    pub async fn start(&mut self) -> Result<LaunchMode> {
        let mode = self.platform.did_finish_launching().await?;
        let policy = match mode {
            LaunchMode::BleDiscovery => DiscoveryPolicy::RegisterAll,
            LaunchMode::Static if self.has_static_ble_devices() => DiscoveryPolicy::AttachKnown,
            _ => return Ok(mode),
        };

        info!("Initializing BluetoothManager...");
        let ble = &self.platform.config().ble;
        let manager = match BluetoothManager::new(ble, self.platform.radio().clone()).await {
            Ok(manager) => manager,
            Err(e) if policy == DiscoveryPolicy::AttachKnown => {
                warn!("Bluetooth unavailable, configured BLE lights stay unreachable: {:#}", e);
                return Ok(mode);
            }
            Err(e) => return Err(e).context("Failed to initialize BluetoothManager"),
        };
        let manager = Arc::new(Mutex::new(manager));
        let discoveries = manager.lock().await.start_scan().await?;

        let platform = self.platform.clone();
        self.discovery_task = Some(tokio::spawn(async move {
            platform.run_discovery(discoveries, policy).await;
        }));
        self.bluetooth_manager = Some(manager);
        Ok(mode)
    }

    fn has_static_ble_devices(&self) -> bool {
        self.platform
            .config()
            .options
            .as_ref()
            .is_some_and(|options| options.has_ble_devices())
    }

    /// Stops scanning and waits for the discovery consumer to drain.
    pub async fn shutdown(&mut self) -> Result<()> {
        if let Some(manager) = self.bluetooth_manager.take() {
            manager.lock().await.stop_scan().await?;
        }
        if let Some(task) = self.discovery_task.take() {
            if let Err(e) = task.await {
                warn!("Discovery task ended abnormally: {}", e);
            }
        }
        info!("Bridge stopped");
        Ok(())
    }
}
