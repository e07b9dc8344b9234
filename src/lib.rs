//! Lissabon bridge library
//! Exposes Lissabon smart lights (BLE and WiFi) as bridge accessories.

// Module declarations
pub mod config;
pub mod core;
pub mod logging;
pub mod platform;
pub mod state;
pub mod utils;
