//! Configuration types for the NightCrawler driver

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
    pub focuser: FocuserConfig,
    #[serde(default)]
    pub rotator: RotatorConfig,
    #[serde(default)]
    pub controller: ControllerConfig,
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
    pub max_step: u32,
    pub step_size_microns: Option<f64>,
    #[serde(with = "humantime_serde")]
    pub motion_timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RotatorConfig {
    pub name: String,
    pub unique_id: String,
    pub description: String,
    pub device_number: u32,
    pub enabled: bool,
    /// Mirror the rotation direction in the driver
    pub reverse: bool,
    #[serde(with = "humantime_serde")]
    pub motion_timeout: Duration,
}

/// Settings shared by both motors. Unset values keep what the controller has.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ControllerConfig {
    /// Rotator steps per revolution, overriding the reported model
    pub custom_steps_per_revolution: Option<u32>,
    /// Degrees added to the temperature sensor reading
    pub temperature_offset: Option<f64>,
    pub encoders: Option<bool>,
    pub display_brightness: Option<u8>,
    pub sleep_brightness: Option<u8>,
    pub focus_step_delay: Option<u32>,
    pub rotator_step_delay: Option<u32>,
    /// Run both motors to their home switches after connecting
    pub find_home_on_connect: bool,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 57600,
            polling_interval_ms: 500,
            timeout_seconds: 3,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 11126 }
    }
}

impl Default for FocuserConfig {
    fn default() -> Self {
        Self {
            name: "NightCrawler Focuser".to_string(),
            unique_id: "nightcrawler-focuser-001".to_string(),
            description: "MoonLite NightCrawler focus motor".to_string(),
            device_number: 0,
            enabled: true,
            max_step: 100_000,
            step_size_microns: None,
            motion_timeout: Duration::from_secs(300),
        }
    }
}

impl Default for RotatorConfig {
    fn default() -> Self {
        Self {
            name: "NightCrawler Rotator".to_string(),
            unique_id: "nightcrawler-rotator-001".to_string(),
            description: "MoonLite NightCrawler rotator".to_string(),
            device_number: 0,
            enabled: true,
            reverse: false,
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
