//! Constants used throughout the bluetooth layer
//! This module contains the GATT identifiers of the Lissabon firmware and the
//! default timing values for radio operations.

use uuid::Uuid;

/// The UUID of the Lissabon light service
pub const UUID_LISSABON_SERVICE: Uuid = Uuid::from_u128(0x6b2f0001_38bc_4204_a506_1d3546ad3688);

/// The UUID of the on/off characteristic (1 byte)
pub const UUID_LISSABON_IS_ON_CHAR: Uuid = Uuid::from_u128(0x6b2f0002_38bc_4204_a506_1d3546ad3688);

/// The UUID of the brightness characteristic (u16, little-endian)
pub const UUID_LISSABON_BRIGHTNESS_CHAR: Uuid =
    Uuid::from_u128(0x6b2f0004_38bc_4204_a506_1d3546ad3688);

/// The UUID of the color temperature characteristic (u16, little-endian)
pub const UUID_LISSABON_TEMPERATURE_CHAR: Uuid =
    Uuid::from_u128(0x6b2f0052_38bc_4204_a506_1d3546ad3688);

/// Timeout for a single Bluetooth operation in milliseconds
pub const BLUETOOTH_OPERATION_TIMEOUT_MS: u64 = 10_000;

/// Number of connects allowed in flight on the shared radio
pub const DEFAULT_MAX_CONCURRENT_CONNECTS: usize = 1;

/// Capacity of the scanner's discovery channels
pub const SCAN_CHANNEL_CAPACITY: usize = 32;

/// Timeout for a single WiFi request in milliseconds
pub const WIFI_REQUEST_TIMEOUT_MS: u64 = 5_000;

/// Returns the compact hex form of a UUID, as the firmware documentation writes it.
pub fn compact_uuid(uuid: &Uuid) -> String {
    uuid.simple().to_string()
}
