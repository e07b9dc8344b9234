//! Error types shared by the BLE and WiFi transports.

use crate::core::bluetooth::CharacteristicKind;

/// Result type alias for light operations.
pub type Result<T> = std::result::Result<T, LissabonError>;

/// Status codes surfaced to the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HapStatus {
    Success,
    /// The accessory is shown as "not responding".
    ServiceCommunicationFailure,
}

impl HapStatus {
    /// Numeric HAP status code.
    pub fn code(&self) -> i32 {
        match self {
            Self::Success => 0,
            Self::ServiceCommunicationFailure => -70402,
        }
    }
}

/// Errors that can occur while talking to a Lissabon light.
#[derive(Debug, thiserror::Error)]
pub enum LissabonError {
    /// No live peripheral exists yet for a configured address.
    #[error("BLE peripheral {address} not discovered yet")]
    NotDiscovered { address: String },

    /// Required characteristic absent after discovery.
    #[error("characteristic {kind} not found")]
    CharacteristicNotFound { kind: CharacteristicKind },

    /// A connect/discover/read/write/disconnect step failed or timed out.
    #[error("communication failure: {message}")]
    CommunicationFailure { message: String },

    #[error("configuration error: {message}")]
    Config { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LissabonError {
    pub fn not_discovered(address: impl Into<String>) -> Self {
        Self::NotDiscovered {
            address: address.into(),
        }
    }

    pub fn characteristic_not_found(kind: CharacteristicKind) -> Self {
        Self::CharacteristicNotFound { kind }
    }

    pub fn communication(message: impl Into<String>) -> Self {
        Self::CommunicationFailure {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// True for the errors that make the accessory unreachable.
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            Self::NotDiscovered { .. }
                | Self::CharacteristicNotFound { .. }
                | Self::CommunicationFailure { .. }
        )
    }

    /// The single status the bridge sees for any failed operation.
    pub fn status(&self) -> HapStatus {
        HapStatus::ServiceCommunicationFailure
    }
}

impl From<bluest::Error> for LissabonError {
    fn from(e: bluest::Error) -> Self {
        Self::communication(e.to_string())
    }
}

impl From<reqwest::Error> for LissabonError {
    fn from(e: reqwest::Error) -> Self {
        Self::communication(e.to_string())
    }
}
