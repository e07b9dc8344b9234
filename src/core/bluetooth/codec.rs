//! Characteristic value codec
//! Converts light values to and from the byte layout the Lissabon firmware uses.
//! Values travel unscaled: brightness and temperature are raw u16 little-endian.

use log::warn;

use crate::core::bluetooth::types::CharacteristicKind;

/// A value carried by one characteristic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightValue {
    On(bool),
    Brightness(u16),
    Temperature(u16),
}

impl LightValue {
    pub fn kind(&self) -> CharacteristicKind {
        match self {
            Self::On(_) => CharacteristicKind::IsOn,
            Self::Brightness(_) => CharacteristicKind::Brightness,
            Self::Temperature(_) => CharacteristicKind::Temperature,
        }
    }

    /// Convert the value to its byte representation
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::On(v) => encode_is_on(*v),
            Self::Brightness(v) | Self::Temperature(v) => encode_u16le(*v),
        }
    }

    /// The on/off state; numeric values count as on when non-zero.
    pub fn as_bool(&self) -> bool {
        match self {
            Self::On(v) => *v,
            Self::Brightness(v) | Self::Temperature(v) => *v != 0,
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            Self::On(v) => u16::from(*v),
            Self::Brightness(v) | Self::Temperature(v) => *v,
        }
    }

    /// Decodes a payload read from `kind`. Length mismatches are logged, never fatal.
    pub fn from_bytes(kind: CharacteristicKind, buf: &[u8]) -> Self {
        check_length(kind, buf);
        match kind {
            CharacteristicKind::IsOn => Self::On(decode_is_on(buf)),
            CharacteristicKind::Brightness => Self::Brightness(decode_u16le(buf)),
            CharacteristicKind::Temperature => Self::Temperature(decode_u16le(buf)),
        }
    }
}

pub fn encode_is_on(value: bool) -> Vec<u8> {
    vec![if value { 1 } else { 0 }]
}

/// Missing byte reads as off.
pub fn decode_is_on(buf: &[u8]) -> bool {
    buf.first().is_some_and(|b| *b != 0)
}

pub fn encode_u16le(value: u16) -> Vec<u8> {
    vec![(value & 0xff) as u8, ((value >> 8) & 0xff) as u8]
}

/// Missing bytes are treated as zero high-order bits; extra bytes are ignored.
pub fn decode_u16le(buf: &[u8]) -> u16 {
    let lo = buf.first().copied().unwrap_or(0) as u16;
    let hi = buf.get(1).copied().unwrap_or(0) as u16;
    lo | (hi << 8)
}

/// Returns false (after a warning) when `buf` does not have the width of `kind`.
pub fn check_length(kind: CharacteristicKind, buf: &[u8]) -> bool {
    if buf.len() != kind.width() {
        warn!(
            "Unexpected length {} for BLE read of {} characteristic (expected {})",
            buf.len(),
            kind,
            kind.width()
        );
        return false;
    }
    true
}
