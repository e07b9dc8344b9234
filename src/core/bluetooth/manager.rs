//! Bluetooth manager for the Lissabon bridge
//! This module owns the adapter, the shared radio coordinator and the scanner.

use std::time::Duration;

use anyhow::{Result, anyhow};
use bluest::Adapter;
use log::info;
use tokio::sync::mpsc;

use crate::config::BleConfig;
use crate::core::bluetooth::peripheral::BluestPeripheral;
use crate::core::bluetooth::radio::RadioCoordinator;
use crate::core::bluetooth::scanner::{BluetoothScanner, Discovery};

/// Manages Bluetooth operations
pub struct BluetoothManager {
    adapter: Adapter,
    radio: RadioCoordinator,
    scanner: BluetoothScanner,
}

impl BluetoothManager {
    /// Opens the default adapter and waits for it to be available.
    pub async fn new(config: &BleConfig, radio: RadioCoordinator) -> Result<Self> {
        let adapter = Adapter::default()
            .await
            .ok_or_else(|| anyhow!("No Bluetooth adapter found"))?;
        adapter.wait_available().await?;
        info!("Bluetooth adapter is available.");

        let scanner = BluetoothScanner::new(
            adapter.clone(),
            radio.clone(),
            Duration::from_millis(config.operation_timeout_ms),
        );
        Ok(Self {
            adapter,
            radio,
            scanner,
        })
    }

    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    pub fn radio(&self) -> &RadioCoordinator {
        &self.radio
    }

    /// Scans for Lissabon lights; discoveries arrive on the returned channel.
    pub async fn start_scan(&mut self) -> Result<mpsc::Receiver<Discovery<BluestPeripheral>>> {
        self.scanner.start_scan().await
    }

    pub async fn stop_scan(&mut self) -> Result<()> {
        if self.scanner.is_scanning() {
            self.scanner.stop_scan().await?;
        }
        Ok(())
    }
}
