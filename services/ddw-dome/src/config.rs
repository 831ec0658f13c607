//! Configuration types for the DDW dome driver

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serial_link::LinkSettings;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub dome: DomeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    pub polling_interval_ms: u64,
    pub timeout_seconds: u64,
}

impl SerialConfig {
    pub fn link_settings(&self) -> LinkSettings {
        LinkSettings {
            port: self.port.clone(),
            baud_rate: self.baud_rate,
            timeout: Duration::from_secs(self.timeout_seconds),
        }
    }

    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.polling_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DomeConfig {
    pub name: String,
    pub unique_id: String,
    pub description: String,
    pub device_number: u32,
    pub enabled: bool,
    /// Azimuth `park` slews to until `set_park` picks another
    pub park_azimuth: f64,
    #[serde(with = "humantime_serde")]
    pub slew_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub shutter_timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 9600,
            polling_interval_ms: 1000,
            timeout_seconds: 3,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 11127 }
    }
}

impl Default for DomeConfig {
    fn default() -> Self {
        Self {
            name: "DDW Dome".to_string(),
            unique_id: "ddw-dome-001".to_string(),
            description: "Digital Dome Works dome controller".to_string(),
            device_number: 0,
            enabled: true,
            park_azimuth: 0.0,
            slew_timeout: Duration::from_secs(300),
            shutter_timeout: Duration::from_secs(180),
        }
    }
}

/// Load configuration from a JSON file
pub fn load_config(path: &PathBuf) -> std::result::Result<Config, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&content)?;
    Ok(config)
}
