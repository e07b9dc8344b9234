//! WiFi transport
//! Stateless JSON over HTTP: every get reads the whole light state from
//! `http://<address>/api/<type>`, every set `PUT`s one field.

use std::time::Duration;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::core::bluetooth::DeviceDescriptor;
use crate::core::error::{LissabonError, Result};

/// Light state as the firmware reports it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WifiState {
    #[serde(default)]
    pub is_on: Option<bool>,
    /// Brightness as a fraction, 0.0 to 1.0
    #[serde(default)]
    pub level: Option<f64>,
    /// Color temperature in kelvin
    #[serde(default)]
    pub temperature: Option<f64>,
}

/// Percent (0-100) to the firmware's fractional level.
pub fn brightness_to_level(percent: u16) -> f64 {
    percent as f64 / 100.0
}

pub fn level_to_brightness(level: f64) -> u16 {
    (level * 100.0).round().clamp(0.0, u16::MAX as f64) as u16
}

/// Mired and kelvin are reciprocal: `value * other == 1_000_000`.
pub fn mired_to_kelvin(mired: u16) -> f64 {
    1_000_000.0 / mired.max(1) as f64
}

pub fn kelvin_to_mired(kelvin: f64) -> u16 {
    if kelvin <= 0.0 {
        return 0;
    }
    (1_000_000.0 / kelvin).round().clamp(0.0, u16::MAX as f64) as u16
}

/// A light reached over HTTP
pub struct WifiLight {
    descriptor: DeviceDescriptor,
    client: reqwest::Client,
}

impl WifiLight {
    pub fn new(descriptor: DeviceDescriptor, client: reqwest::Client) -> Self {
        Self { descriptor, client }
    }

    /// Builds the shared HTTP client with a per-request timeout.
    pub fn client(timeout: Duration) -> Result<reqwest::Client> {
        Ok(reqwest::Client::builder().timeout(timeout).build()?)
    }

    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    pub fn endpoint(&self) -> String {
        format!(
            "http://{}/api/{}",
            self.descriptor.address, self.descriptor.device_type
        )
    }

    async fn fetch(&self) -> Result<WifiState> {
        let response = self.client.get(self.endpoint()).send().await?;
        let state = response.error_for_status()?.json::<WifiState>().await?;
        debug!("[{}] state {:?}", self.descriptor.name, state);
        Ok(state)
    }

    async fn put(&self, body: serde_json::Value) -> Result<()> {
        self.client
            .put(self.endpoint())
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    fn missing(&self, field: &str) -> LissabonError {
        LissabonError::communication(format!(
            "{} missing from {} response",
            field,
            self.endpoint()
        ))
    }

    pub async fn set_on(&self, on: bool) -> Result<()> {
        info!("Set Characteristic On -> {} to {}", on, self.descriptor.address);
        self.put(serde_json::json!({ "isOn": on })).await
    }

    pub async fn get_on(&self) -> Result<bool> {
        let on = self.fetch().await?.is_on.ok_or_else(|| self.missing("isOn"))?;
        info!("Get Characteristic On -> {} from {}", on, self.descriptor.address);
        Ok(on)
    }

    /// `brightness` is a percentage.
    pub async fn set_brightness(&self, brightness: u16) -> Result<()> {
        info!(
            "Set Characteristic Brightness -> {} to {}",
            brightness, self.descriptor.address
        );
        self.put(serde_json::json!({ "level": brightness_to_level(brightness) }))
            .await
    }

    pub async fn get_brightness(&self) -> Result<u16> {
        let level = self.fetch().await?.level.ok_or_else(|| self.missing("level"))?;
        let brightness = level_to_brightness(level);
        info!(
            "Get Characteristic Brightness -> {} from {}",
            brightness, self.descriptor.address
        );
        Ok(brightness)
    }

    /// `mired` is the bridge's color temperature unit.
    pub async fn set_temperature(&self, mired: u16) -> Result<()> {
        info!(
            "Set Characteristic Temperature -> {} to {}",
            mired, self.descriptor.address
        );
        self.put(serde_json::json!({ "temperature": mired_to_kelvin(mired) }))
            .await
    }

    pub async fn get_temperature(&self) -> Result<u16> {
        let kelvin = self
            .fetch()
            .await?
            .temperature
            .ok_or_else(|| self.missing("temperature"))?;
        let mired = kelvin_to_mired(kelvin);
        info!(
            "Get Characteristic Temperature -> {} from {}",
            mired, self.descriptor.address
        );
        Ok(mired)
    }
}
