//! Defines shared data structures for the Bluetooth module.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::bluetooth::constants::{
    UUID_LISSABON_BRIGHTNESS_CHAR, UUID_LISSABON_IS_ON_CHAR, UUID_LISSABON_TEMPERATURE_CHAR,
};

/// Kind of Lissabon fixture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    /// On/off with optional brightness
    Dimmer,
    /// Has a color temperature channel
    Ledstrip,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dimmer => "dimmer",
            Self::Ledstrip => "ledstrip",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated device, as handed to the bridge for accessory creation.
///
/// `address` is the stable identity of the device: the bridge derives the
/// accessory UUID from it, so it must not change across restarts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDescriptor {
    pub address: String,
    pub name: String,
    #[serde(rename = "type")]
    pub device_type: DeviceType,
    pub has_brightness: bool,
    pub has_temperature: bool,
    pub is_bluetooth: bool,
}

/// The three characteristics a Lissabon light may expose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CharacteristicKind {
    IsOn,
    Brightness,
    Temperature,
}

impl CharacteristicKind {
    pub const ALL: [CharacteristicKind; 3] = [Self::IsOn, Self::Brightness, Self::Temperature];

    /// GATT identifier of this characteristic
    pub fn uuid(&self) -> Uuid {
        match self {
            Self::IsOn => UUID_LISSABON_IS_ON_CHAR,
            Self::Brightness => UUID_LISSABON_BRIGHTNESS_CHAR,
            Self::Temperature => UUID_LISSABON_TEMPERATURE_CHAR,
        }
    }

    pub fn from_uuid(uuid: &Uuid) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.uuid() == *uuid)
    }

    /// Wire width in bytes
    pub fn width(&self) -> usize {
        match self {
            Self::IsOn => 1,
            Self::Brightness | Self::Temperature => 2,
        }
    }

    pub fn wanted_uuids() -> Vec<Uuid> {
        Self::ALL.iter().map(|kind| kind.uuid()).collect()
    }
}

impl fmt::Display for CharacteristicKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::IsOn => "isOn",
            Self::Brightness => "brightness",
            Self::Temperature => "temperature",
        };
        f.write_str(name)
    }
}

/// Characteristic handles discovered on one peripheral.
#[derive(Debug, Clone)]
pub struct CharacteristicSet<H> {
    pub is_on: Option<H>,
    pub brightness: Option<H>,
    pub temperature: Option<H>,
}

impl<H> Default for CharacteristicSet<H> {
    fn default() -> Self {
        Self {
            is_on: None,
            brightness: None,
            temperature: None,
        }
    }
}

impl<H> CharacteristicSet<H> {
    /// Builds the set from `(uuid, handle)` pairs, ignoring unknown identifiers.
    pub fn from_discovered(found: impl IntoIterator<Item = (Uuid, H)>) -> Self {
        let mut set = Self::default();
        for (uuid, handle) in found {
            match CharacteristicKind::from_uuid(&uuid) {
                Some(CharacteristicKind::IsOn) => set.is_on = Some(handle),
                Some(CharacteristicKind::Brightness) => set.brightness = Some(handle),
                Some(CharacteristicKind::Temperature) => set.temperature = Some(handle),
                None => {}
            }
        }
        set
    }

    pub fn get(&self, kind: CharacteristicKind) -> Option<&H> {
        match kind {
            CharacteristicKind::IsOn => self.is_on.as_ref(),
            CharacteristicKind::Brightness => self.brightness.as_ref(),
            CharacteristicKind::Temperature => self.temperature.as_ref(),
        }
    }

    pub fn has(&self, kind: CharacteristicKind) -> bool {
        self.get(kind).is_some()
    }

    /// Classifies the device; `None` when `isOn` is missing and the device must be ignored.
    pub fn device_type(&self) -> Option<DeviceType> {
        if !self.has(CharacteristicKind::IsOn) {
            return None;
        }
        if self.has(CharacteristicKind::Temperature) {
            Some(DeviceType::Ledstrip)
        } else {
            Some(DeviceType::Dimmer)
        }
    }
}

/// Connection state of one DeviceSession
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    DiscoveringCharacteristics,
    Ready,
    Busy,
    Error,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
