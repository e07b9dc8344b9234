//! Lightbulb accessory handler
//! One handler per registered device, whatever its transport.

use crate::core::bluetooth::{
    CharacteristicKind, CommandExecutor, DeviceDescriptor, GattPeripheral, LightValue,
};
use crate::core::error::Result;
use crate::core::wifi::WifiLight;

/// Accessory information shown by the bridge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessoryInfo {
    pub manufacturer: String,
    pub model: String,
    pub serial_number: String,
    /// Characteristics the bridge should expose, `On` always first.
    pub characteristics: Vec<CharacteristicKind>,
}

impl AccessoryInfo {
    pub fn for_device(device: &DeviceDescriptor) -> Self {
        let mut characteristics = vec![CharacteristicKind::IsOn];
        if device.has_brightness {
            characteristics.push(CharacteristicKind::Brightness);
        }
        if device.has_temperature {
            characteristics.push(CharacteristicKind::Temperature);
        }
        Self {
            manufacturer: "jackjansen".to_string(),
            model: device.device_type.to_string(),
            serial_number: device.address.clone(),
            characteristics,
        }
    }
}

pub enum Lightbulb<P: GattPeripheral> {
    Wifi(WifiLight),
    Ble(CommandExecutor<P>),
}

impl<P: GattPeripheral> Lightbulb<P> {
    pub fn descriptor(&self) -> &DeviceDescriptor {
        match self {
            Self::Wifi(light) => light.descriptor(),
            Self::Ble(light) => light.descriptor(),
        }
    }

    pub fn info(&self) -> AccessoryInfo {
        AccessoryInfo::for_device(self.descriptor())
    }

    pub fn as_ble(&self) -> Option<&CommandExecutor<P>> {
        match self {
            Self::Ble(light) => Some(light),
            Self::Wifi(_) => None,
        }
    }

    pub async fn set_on(&self, on: bool) -> Result<()> {
        match self {
            Self::Wifi(light) => light.set_on(on).await,
            Self::Ble(light) => light.set_on(on).await,
        }
    }

    pub async fn get_on(&self) -> Result<bool> {
        match self {
            Self::Wifi(light) => light.get_on().await,
            Self::Ble(light) => light.get_on().await,
        }
    }

    pub async fn set_brightness(&self, brightness: u16) -> Result<()> {
        match self {
            Self::Wifi(light) => light.set_brightness(brightness).await,
            Self::Ble(light) => light.set_brightness(brightness).await,
        }
    }

    pub async fn get_brightness(&self) -> Result<u16> {
        match self {
            Self::Wifi(light) => light.get_brightness().await,
            Self::Ble(light) => light.get_brightness().await,
        }
    }

    pub async fn set_temperature(&self, temperature: u16) -> Result<()> {
        match self {
            Self::Wifi(light) => light.set_temperature(temperature).await,
            Self::Ble(light) => light.set_temperature(temperature).await,
        }
    }

    pub async fn get_temperature(&self) -> Result<u16> {
        match self {
            Self::Wifi(light) => light.get_temperature().await,
            Self::Ble(light) => light.get_temperature().await,
        }
    }

    /// Dispatches a bridge write to the matching setter.
    pub async fn set(&self, value: LightValue) -> Result<()> {
        match value {
            LightValue::On(v) => self.set_on(v).await,
            LightValue::Brightness(v) => self.set_brightness(v).await,
            LightValue::Temperature(v) => self.set_temperature(v).await,
        }
    }

    /// Applies several values at once, e.g. on and brightness from one scene.
    pub async fn set_all(&self, values: &[LightValue]) -> Result<()> {
        match self {
            Self::Wifi(_) => {
                for value in values {
                    self.set(*value).await?;
                }
                Ok(())
            }
            Self::Ble(light) => light.set_all(values).await,
        }
    }

    /// Dispatches a bridge read to the matching getter.
    pub async fn get(&self, kind: CharacteristicKind) -> Result<LightValue> {
        Ok(match kind {
            CharacteristicKind::IsOn => LightValue::On(self.get_on().await?),
            CharacteristicKind::Brightness => LightValue::Brightness(self.get_brightness().await?),
            CharacteristicKind::Temperature => {
                LightValue::Temperature(self.get_temperature().await?)
            }
        })
    }
}
