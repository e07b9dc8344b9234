//! Core functionality for the Lissabon bridge
//! Transports (BLE and WiFi) and the per-device lightbulb handlers built on them.

pub mod bluetooth;
pub mod error;
pub mod lightbulb;
pub mod wifi;

// Re-export commonly used types
pub use bluetooth::BluetoothManager;
pub use error::{HapStatus, LissabonError};
pub use lightbulb::{AccessoryInfo, Lightbulb};
pub use wifi::WifiLight;
