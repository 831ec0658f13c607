//! Configuration types for the TeenAstro focuser driver

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
    /// Travel limit used until the controller reports its own
    pub max_step: u32,
    pub step_size_microns: Option<f64>,
    /// Settings written on connect; unset ones keep the controller's values
    pub park_position: Option<u32>,
    pub goto_speed: Option<u32>,
    pub goto_acceleration: Option<u32>,
    pub manual_speed: Option<u32>,
    pub invert: Option<bool>,
    pub microsteps: Option<u32>,
    pub current_ma: Option<u32>,
    #[serde(with = "humantime_serde")]
    pub motion_timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 9600,
            polling_interval_ms: 1500,
            timeout_seconds: 4,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 11125 }
    }
}

impl Default for FocuserConfig {
    fn default() -> Self {
        Self {
            name: "TeenAstro Focuser".to_string(),
            unique_id: "teenastro-focuser-001".to_string(),
            description: "TeenAstro Focuser Controller".to_string(),
            device_number: 0,
            enabled: true,
            max_step: 100_000,
            step_size_microns: None,
            park_position: None,
            goto_speed: None,
            goto_acceleration: None,
            manual_speed: None,
            invert: None,
            microsteps: None,
            current_ma: None,
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
