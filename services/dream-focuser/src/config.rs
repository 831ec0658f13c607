//! Configuration types for the Dream Focuser driver

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
    pub focuser: FocuserConfig,
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

/// Focuser device configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FocuserConfig {
    pub name: String,
    pub unique_id: String,
    pub description: String,
    #[serde(default)]
    pub device_number: u32,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Travel limit used until the focuser reports its own
    #[serde(default = "default_max_step")]
    pub max_step: u32,
    #[serde(default)]
    pub step_size_microns: Option<f64>,
    #[serde(default = "default_motion_timeout", with = "humantime_serde")]
    pub motion_timeout: Duration,
}

fn default_baud_rate() -> u32 {
    115_200
}

fn default_polling_interval() -> u64 {
    500
}

fn default_timeout() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

fn default_max_step() -> u32 {
    100_000
}

fn default_motion_timeout() -> Duration {
    Duration::from_secs(300)
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyACM0".to_string(),
            baud_rate: default_baud_rate(),
            polling_interval_ms: default_polling_interval(),
            timeout_seconds: default_timeout(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 11122 }
    }
}

impl Default for FocuserConfig {
    fn default() -> Self {
        Self {
            name: "Dream Focuser".to_string(),
            unique_id: "dream-focuser-001".to_string(),
            description: "Dream Focuser with temperature and humidity sensor".to_string(),
            device_number: 0,
            enabled: true,
            max_step: default_max_step(),
            step_size_microns: None,
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
