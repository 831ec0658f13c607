//! Configuration types for the Pegasus focuser driver

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

/// Which Pegasus controller is attached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Model {
    /// Dual Motor Focus Controller, stepper or DC motor
    #[default]
    Dmfc,
    /// FocusCube, stepper only
    FocusCube,
}

/// Motor driven by a DMFC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotorType {
    Stepper,
    Dc,
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
    #[serde(default)]
    pub model: Model,
    /// Motor type to select on connect (DMFC only)
    #[serde(default)]
    pub motor: Option<MotorType>,
    #[serde(default = "default_max_step")]
    pub max_step: u32,
    /// Largest single relative move
    #[serde(default = "default_max_increment")]
    pub max_increment: u32,
    #[serde(default)]
    pub step_size_microns: Option<f64>,
    /// Motor speed limit, 100 to 1000
    #[serde(default)]
    pub max_speed: Option<u16>,
    #[serde(default)]
    pub led: Option<bool>,
    #[serde(default)]
    pub encoders: Option<bool>,
    #[serde(default)]
    pub reverse: Option<bool>,
    /// Backlash compensation steps; 0 disables it
    #[serde(default)]
    pub backlash: Option<u32>,
    #[serde(default = "default_motion_timeout", with = "humantime_serde")]
    pub motion_timeout: Duration,
}

fn default_baud_rate() -> u32 {
    19_200
}

fn default_polling_interval() -> u64 {
    250
}

fn default_timeout() -> u64 {
    3
}

fn default_true() -> bool {
    true
}

fn default_max_step() -> u32 {
    100_000
}

fn default_max_increment() -> u32 {
    50_000
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
        Self { port: 11121 }
    }
}

impl Default for FocuserConfig {
    fn default() -> Self {
        Self {
            name: "Pegasus Focuser".to_string(),
            unique_id: "pegasus-focuser-001".to_string(),
            description: "Pegasus Astro DMFC / FocusCube Focuser".to_string(),
            device_number: 0,
            enabled: true,
            model: Model::default(),
            motor: None,
            max_step: default_max_step(),
            max_increment: default_max_increment(),
            step_size_microns: None,
            max_speed: None,
            led: None,
            encoders: None,
            reverse: None,
            backlash: None,
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
