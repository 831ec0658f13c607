//! Configuration types for the Lacerta MFOC driver

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serial_link::LinkSettings;

use crate::protocol::TempDirection;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub focuser: FocuserConfig,
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
pub struct FocuserConfig {
    pub name: String,
    pub unique_id: String,
    pub description: String,
    pub device_number: u32,
    pub enabled: bool,
    /// Highest position the driver allows until the controller reports its own
    pub max_step: u32,
    /// Step size in microns, if known
    pub step_size_microns: Option<f64>,
    /// Written to the controller on connect (300 to 250000)
    pub max_position: Option<u32>,
    /// Backlash steps written on connect
    pub backlash: Option<u8>,
    /// Compensation steps per degree used when temperature compensation is on
    pub temp_comp_steps: i32,
    /// Moves the controller compensates, written on connect
    pub temp_direction: Option<TempDirection>,
    /// Whether the controller restores its saved position at power on
    pub start_at_saved_position: Option<bool>,
    /// A move still running after this long is reported as failed
    #[serde(with = "humantime_serde")]
    pub motion_timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 9600,
            polling_interval_ms: 1000,
            timeout_seconds: 1,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 11124 }
    }
}

impl Default for FocuserConfig {
    fn default() -> Self {
        Self {
            name: "Lacerta MFOC".to_string(),
            unique_id: "lacerta-mfoc-001".to_string(),
            description: "Lacerta MFOC Motor Focuser Controller".to_string(),
            device_number: 0,
            enabled: true,
            max_step: 110_000,
            step_size_microns: None,
            max_position: None,
            backlash: None,
            temp_comp_steps: 65,
            temp_direction: None,
            start_at_saved_position: None,
            motion_timeout: Duration::from_secs(300),
        }
    }
}

/// Load configuration from a JSON file
pub fn load_config(path: &PathBuf) -> std::result::Result<Config, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&content)?;
    Ok(config)
}
