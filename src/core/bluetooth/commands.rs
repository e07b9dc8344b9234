//! Lissabon BLE light commands
//! The [`CommandExecutor`] turns bridge get/set requests into single GATT round
//! trips, one at a time per device.

use std::sync::Mutex as StdMutex;

use log::{debug, info};
use tokio::sync::Mutex;

use crate::core::bluetooth::codec::LightValue;
use crate::core::bluetooth::peripheral::GattPeripheral;
use crate::core::bluetooth::session::DeviceSession;
use crate::core::bluetooth::types::{CharacteristicKind, ConnectionState, DeviceDescriptor};
use crate::core::error::Result;

/// Last values seen on the wire, updated only by successful operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LastKnown {
    pub is_on: bool,
    pub brightness: u16,
    pub temperature: u16,
}

impl LastKnown {
    fn record(&mut self, value: LightValue) {
        match value {
            LightValue::On(v) => self.is_on = v,
            LightValue::Brightness(v) => self.brightness = v,
            LightValue::Temperature(v) => self.temperature = v,
        }
    }
}

/// Command executor for one BLE light
pub struct CommandExecutor<P: GattPeripheral> {
    descriptor: DeviceDescriptor,
    /// Execution lock: every request holds it for its whole round trip.
    session: Mutex<DeviceSession<P>>,
    last_known: StdMutex<LastKnown>,
}

impl<P: GattPeripheral> CommandExecutor<P> {
    /// Create a new CommandExecutor
    pub fn new(descriptor: DeviceDescriptor, session: DeviceSession<P>) -> Self {
        Self {
            descriptor,
            session: Mutex::new(session),
            last_known: StdMutex::new(LastKnown::default()),
        }
    }

    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    pub fn last_known(&self) -> LastKnown {
        *self.last_known.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn remember(&self, value: LightValue) {
        self.last_known
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .record(value);
    }

    /// Attaches a scanned peripheral if the session has none yet.
    pub async fn attach(&self, peripheral: P) -> bool {
        self.session.lock().await.attach(peripheral)
    }

    pub async fn has_peripheral(&self) -> bool {
        self.session.lock().await.has_peripheral()
    }

    pub async fn state(&self) -> ConnectionState {
        self.session.lock().await.state()
    }

    /// Encodes `value` and writes it to its characteristic.
    pub async fn set(&self, value: LightValue) -> Result<()> {
        debug!("[{}] Set {:?}", self.descriptor.name, value);
        let mut session = self.session.lock().await;
        session.write(value.kind(), &value.to_bytes()).await?;
        self.remember(value);
        Ok(())
    }

    /// Reads and decodes the characteristic `kind`.
    pub async fn get(&self, kind: CharacteristicKind) -> Result<LightValue> {
        debug!("[{}] Get {}", self.descriptor.name, kind);
        let buf = self.session.lock().await.read(kind).await?;
        let value = LightValue::from_bytes(kind, &buf);
        debug!("[{}] Get {} -> {:?}", self.descriptor.name, kind, value);
        self.remember(value);
        Ok(value)
    }

    /// Writes several values over one connection.
    ///
    /// Stops at the first failure; values written before it are kept.
    pub async fn set_all(&self, values: &[LightValue]) -> Result<()> {
        info!("[{}] Set {} values", self.descriptor.name, values.len());
        let mut session = self.session.lock().await;
        session.open().await?;
        let mut result = Ok(());
        for value in values {
            if let Err(e) = session.write(value.kind(), &value.to_bytes()).await {
                result = Err(e);
                break;
            }
            self.remember(*value);
        }
        let closed = session.close().await;
        result.and(closed)
    }

    pub async fn set_on(&self, on: bool) -> Result<()> {
        self.set(LightValue::On(on)).await
    }

    pub async fn get_on(&self) -> Result<bool> {
        Ok(self.get(CharacteristicKind::IsOn).await?.as_bool())
    }

    pub async fn set_brightness(&self, brightness: u16) -> Result<()> {
        self.set(LightValue::Brightness(brightness)).await
    }

    pub async fn get_brightness(&self) -> Result<u16> {
        Ok(self.get(CharacteristicKind::Brightness).await?.as_u16())
    }

    pub async fn set_temperature(&self, temperature: u16) -> Result<()> {
        self.set(LightValue::Temperature(temperature)).await
    }

    pub async fn get_temperature(&self) -> Result<u16> {
        Ok(self.get(CharacteristicKind::Temperature).await?.as_u16())
    }
}
