//! Configuration tests for the Pegasus focuser driver

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use pegasus_focuser::{load_config, Config, Model, MotorType};

#[test]
fn default_config_has_expected_values() {
    let config = Config::default();

    assert_eq!(config.focuser.name, "Pegasus Focuser");
    assert_eq!(config.focuser.unique_id, "pegasus-focuser-001");
    assert_eq!(config.focuser.model, Model::Dmfc);
    assert_eq!(config.focuser.motor, None);
    assert_eq!(config.focuser.max_step, 100_000);
    assert_eq!(config.focuser.max_increment, 50_000);
    assert_eq!(config.focuser.motion_timeout, Duration::from_secs(300));

    assert_eq!(config.serial.baud_rate, 19_200);
    assert_eq!(config.serial.polling_interval_ms, 250);
    assert_eq!(config.server.port, 11121);
}

#[test]
fn model_and_motor_use_snake_case() {
    let json = r#"{ "focuser": {
        "name": "Cube",
        "unique_id": "fc-1",
        "description": "FocusCube on the RASA",
        "model": "focus_cube",
        "motor": "dc",
        "max_speed": 600,
        "led": false
    } }"#;

    let config: Config = serde_json::from_str(json).unwrap();
    assert_eq!(config.focuser.model, Model::FocusCube);
    assert_eq!(config.focuser.motor, Some(MotorType::Dc));
    assert_eq!(config.focuser.max_speed, Some(600));
    assert_eq!(config.focuser.led, Some(false));
    assert_eq!(config.focuser.encoders, None);
    assert_eq!(config.serial.baud_rate, 19_200);
}

#[test]
fn unknown_model_is_rejected() {
    let json = r#"{ "focuser": { "name": "x", "unique_id": "y", "description": "z", "model": "ppba" } }"#;
    assert!(serde_json::from_str::<Config>(json).is_err());
}

#[test]
fn config_serialization_roundtrip() {
    let mut config = Config::default();
    config.focuser.backlash = Some(20);
    config.focuser.model = Model::FocusCube;

    let json = serde_json::to_string(&config).unwrap();
    assert!(json.contains("\"model\":\"focus_cube\""));

    let parsed: Config = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.focuser.backlash, Some(20));
    assert_eq!(parsed.focuser.model, Model::FocusCube);
}

#[test]
fn link_settings_follow_serial_config() {
    let config = Config::default();
    let settings = config.serial.link_settings();
    assert_eq!(settings.baud_rate, 19_200);
    assert_eq!(settings.timeout, Duration::from_secs(3));
    assert_eq!(config.serial.polling_interval(), Duration::from_millis(250));
}

#[test]
fn load_config_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{"serial": {{"port": "/dev/dmfc"}}, "server": {{"port": 9000}}}}"#).unwrap();

    let config = load_config(&file.path().to_path_buf()).unwrap();
    assert_eq!(config.serial.port, "/dev/dmfc");
    assert_eq!(config.server.port, 9000);
}

#[test]
fn load_config_missing_file() {
    assert!(load_config(&PathBuf::from("/nonexistent/pegasus.json")).is_err());
}

#[test]
fn partial_sections_fall_back_to_defaults() {
    let config: Config = serde_json::from_str(
        r#"{"serial": {"baud_rate": 9600}, "server": {}, "focuser": {"device_number": 2}}"#,
    )
    .unwrap();

    assert_eq!(config.serial.port, "/dev/ttyUSB0");
    assert_eq!(config.serial.baud_rate, 9600);
    assert_eq!(config.server.port, 11121);
    assert_eq!(config.focuser.name, "Pegasus Focuser");
    assert_eq!(config.focuser.unique_id, "pegasus-focuser-001");
    assert!(!config.focuser.description.is_empty());
    assert_eq!(config.focuser.device_number, 2);
    assert!(config.focuser.enabled);
}
