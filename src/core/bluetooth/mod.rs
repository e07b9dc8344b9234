//! Bluetooth functionality for the Lissabon bridge
//! This module handles all bluetooth operations including scanning,
//! capability probing, and reading/writing light state over GATT.

mod codec;
mod commands;
mod constants;
mod manager;
pub mod mock;
mod peripheral;
mod radio;
mod scanner;
mod session;
mod types;

// Re-export types that should be publicly accessible
pub use codec::{
    LightValue, check_length, decode_is_on, decode_u16le, encode_is_on, encode_u16le,
};
pub use commands::{CommandExecutor, LastKnown};
pub use constants::*; // Re-export all constants
pub use manager::BluetoothManager;
pub use peripheral::{BluestPeripheral, GattPeripheral, extract_mac_address};
pub use radio::{RadioCoordinator, RadioPermit, ScanActivity, ScanGate};
pub use scanner::{
    BluetoothScanner, Discovery, accepts_advertisement, build_descriptor, probe, resolve_identity,
};
pub use session::{DeviceSession, with_timeout};
pub use types::{CharacteristicKind, CharacteristicSet, ConnectionState, DeviceDescriptor, DeviceType};
