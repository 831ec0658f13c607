//! Configuration types for the Pyxis rotator driver

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serial_link::LinkSettings;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub rotator: RotatorConfig,
}

/// Serial port configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_polling_interval")]
    pub polling_interval_ms: u64,
    #[serde(default = "default_timeout")]
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

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

/// Rotator device configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RotatorConfig {
    pub name: String,
    pub unique_id: String,
    pub description: String,
    #[serde(default)]
    pub device_number: u32,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Rotation rate 0-99, lower is faster. Defaults to the model's
    /// recommended rate.
    #[serde(default)]
    pub rotation_rate: Option<u8>,
    #[serde(default)]
    pub half_step: Option<bool>,
    #[serde(default)]
    pub reverse: Option<bool>,
    #[serde(default = "default_motion_timeout", with = "humantime_serde")]
    pub motion_timeout: Duration,
}

fn default_baud_rate() -> u32 {
    19_200
}

fn default_polling_interval() -> u64 {
    500
}

fn default_timeout() -> u64 {
    3
}

fn default_true() -> bool {
    true
}

fn default_motion_timeout() -> Duration {
    Duration::from_secs(300)
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: default_baud_rate(),
            polling_interval_ms: default_polling_interval(),
            timeout_seconds: default_timeout(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 11123 }
    }
}

impl Default for RotatorConfig {
    fn default() -> Self {
        Self {
            name: "Pyxis Rotator".to_string(),
            unique_id: "pyxis-rotator-001".to_string(),
            description: "Optec Pyxis camera field rotator".to_string(),
            device_number: 0,
            enabled: true,
            rotation_rate: None,
            half_step: None,
            reverse: None,
            motion_timeout: default_motion_timeout(),
        }
    }
}

/// Load configuration from a JSON file
pub fn load_config(path: &PathBuf) -> std::result::Result<Config, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&content)?;
    Ok(config)
}
