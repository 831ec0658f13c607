//! Configuration types for the MoonLite focuser driver

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
    /// Highest position the focuser may be moved to (at most 65535)
    #[serde(default = "default_max_step")]
    pub max_step: u32,
    /// Step size in microns, if known
    #[serde(default)]
    pub step_size_microns: Option<f64>,
    /// Motor speed 1 (fastest) to 5 (slowest), applied on connect
    #[serde(default)]
    pub speed: Option<u8>,
    /// Half (`true`) or full stepping, applied on connect
    #[serde(default)]
    pub half_step: Option<bool>,
    /// Temperature calibration offset in degrees Celsius, applied on connect
    #[serde(default)]
    pub temperature_calibration: Option<f64>,
    /// Temperature compensation coefficient, applied on connect
    #[serde(default)]
    pub temperature_coefficient: Option<f64>,
    /// A move still running after this long is reported as failed
    #[serde(default = "default_motion_timeout", with = "humantime_serde")]
    pub motion_timeout: Duration,
}

fn default_baud_rate() -> u32 {
    9600
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

fn default_max_step() -> u32 {
    65_535
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
        Self { port: 11120 }
    }
}

impl Default for FocuserConfig {
    fn default() -> Self {
        Self {
            name: "MoonLite Focuser".to_string(),
            unique_id: "moonlite-focuser-001".to_string(),
            description: "MoonLite CSL/DRO Stepper Focuser Controller".to_string(),
            device_number: 0,
            enabled: true,
            max_step: default_max_step(),
            step_size_microns: None,
            speed: None,
            half_step: None,
            temperature_calibration: None,
            temperature_coefficient: None,
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
