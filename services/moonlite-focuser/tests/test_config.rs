//! Configuration tests for the MoonLite focuser driver

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use moonlite_focuser::{load_config, Config, FocuserConfig, SerialConfig, ServerConfig};

#[test]
fn default_config_has_expected_values() {
    let config = Config::default();

    assert_eq!(config.focuser.name, "MoonLite Focuser");
    assert!(config.focuser.enabled);
    assert_eq!(config.focuser.max_step, 65_535);
    assert_eq!(config.focuser.speed, None);
    assert_eq!(config.focuser.half_step, None);
    assert_eq!(config.focuser.motion_timeout, Duration::from_secs(300));

    assert_eq!(config.serial.port, "/dev/ttyUSB0");
    assert_eq!(config.serial.baud_rate, 9600);
    assert_eq!(config.serial.polling_interval_ms, 500);
    assert_eq!(config.serial.timeout_seconds, 3);

    assert_eq!(config.server.port, 11120);
}

#[test]
fn focuser_config_default() {
    let config = FocuserConfig::default();

    assert_eq!(config.unique_id, "moonlite-focuser-001");
    assert!(!config.description.is_empty());
    assert_eq!(config.device_number, 0);
    assert_eq!(config.step_size_microns, None);
    assert_eq!(config.temperature_calibration, None);
    assert_eq!(config.temperature_coefficient, None);
}

#[test]
fn serial_config_link_settings() {
    let config = SerialConfig {
        port: "/dev/ttyACM3".to_string(),
        timeout_seconds: 5,
        ..Default::default()
    };

    let settings = config.link_settings();
    assert_eq!(settings.port, "/dev/ttyACM3");
    assert_eq!(settings.baud_rate, 9600);
    assert_eq!(settings.timeout, Duration::from_secs(5));
    assert_eq!(config.polling_interval(), Duration::from_millis(500));
}

#[test]
fn server_config_default() {
    assert_eq!(ServerConfig::default().port, 11120);
}

#[test]
fn config_serialization_roundtrip() {
    let mut config = Config::default();
    config.focuser.speed = Some(3);
    config.focuser.motion_timeout = Duration::from_secs(90);

    let json = serde_json::to_string(&config).unwrap();
    assert!(json.contains("\"motion_timeout\":\"1m 30s\""), "got: {}", json);

    let parsed: Config = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.focuser.speed, Some(3));
    assert_eq!(parsed.focuser.motion_timeout, Duration::from_secs(90));
}

#[test]
fn partial_config_uses_defaults() {
    let json = r#"{
        "serial": { "port": "/dev/ttyUSB1" },
        "server": { "port": 8080 },
        "focuser": {
            "name": "Newtonian",
            "unique_id": "ml-2",
            "description": "MoonLite on the 8 inch",
            "motion_timeout": "2m"
        }
    }"#;

    let config: Config = serde_json::from_str(json).unwrap();
    assert_eq!(config.serial.port, "/dev/ttyUSB1");
    assert_eq!(config.serial.baud_rate, 9600);
    assert_eq!(config.server.port, 8080);
    assert_eq!(config.focuser.name, "Newtonian");
    assert!(config.focuser.enabled);
    assert_eq!(config.focuser.max_step, 65_535);
    assert_eq!(config.focuser.motion_timeout, Duration::from_secs(120));
}

#[test]
fn missing_sections_use_defaults() {
    let config: Config = serde_json::from_str("{}").unwrap();
    assert_eq!(config.server.port, 11120);
    assert_eq!(config.focuser.name, "MoonLite Focuser");
}

#[test]
fn load_config_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{"serial": {{"port": "/dev/moonlite", "polling_interval_ms": 250}}}}"#
    )
    .unwrap();

    let config = load_config(&file.path().to_path_buf()).unwrap();
    assert_eq!(config.serial.port, "/dev/moonlite");
    assert_eq!(config.serial.polling_interval_ms, 250);
}

#[test]
fn load_config_missing_file() {
    let result = load_config(&PathBuf::from("/nonexistent/moonlite.json"));
    assert!(result.is_err());
}

#[test]
fn load_config_invalid_json() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "not json").unwrap();
    assert!(load_config(&file.path().to_path_buf()).is_err());
}

#[test]
fn partial_sections_fall_back_to_defaults() {
    let config: Config = serde_json::from_str(
        r#"{"serial": {"baud_rate": 19200}, "server": {}, "focuser": {"device_number": 2}}"#,
    )
    .unwrap();

    assert_eq!(config.serial.port, "/dev/ttyUSB0");
    assert_eq!(config.serial.baud_rate, 19200);
    assert_eq!(config.server.port, 11120);
    assert_eq!(config.focuser.name, "MoonLite Focuser");
    assert_eq!(config.focuser.unique_id, "moonlite-focuser-001");
    assert!(!config.focuser.description.is_empty());
    assert_eq!(config.focuser.device_number, 2);
    assert!(config.focuser.enabled);
}
