//! Device tests for the Pegasus focuser against scripted controllers

use std::sync::Arc;

use ascom_alpaca::api::{Device, Focuser};
use ascom_alpaca::ASCOMErrorCode;
use pegasus_focuser::{Config, Model, MotorType, PegasusFocuserDevice, SerialManager};
use serial_link::testing::{FailingPortFactory, ScriptedDevice};
use serial_link::SerialPortFactory;

// ============================================================================
// Helpers
// ============================================================================

fn controller(status: &str) -> ScriptedDevice {
    let device = ScriptedDevice::new();
    let identifier = status.split(':').next().unwrap_or_default().to_string();
    device
        .on("#\n", &[format!("{}\n", identifier).as_bytes()])
        .on("A\n", &[format!("{}\n", status).as_bytes()]);
    device
}

fn stepper() -> ScriptedDevice {
    controller("OK_DMFCN:3.4:1:-3.25:45000:0:1:0:0:0")
}

fn dc_motor() -> ScriptedDevice {
    controller("OK_DMFCN:3.4:0:-127:0:0:1:0:0:0")
}

fn create_device_with(mut config: Config, factory: Arc<dyn SerialPortFactory>) -> PegasusFocuserDevice {
    config.serial.polling_interval_ms = 60_000;
    let manager = Arc::new(SerialManager::new(config.clone(), factory));
    PegasusFocuserDevice::new(config.focuser, manager)
}

async fn connected(scripted: &ScriptedDevice) -> PegasusFocuserDevice {
    let device = create_device_with(Config::default(), scripted.factory());
    device.set_connected(true).await.unwrap();
    device
}

// ============================================================================
// Device trait
// ============================================================================

#[tokio::test]
async fn test_device_metadata() {
    let device = create_device_with(Config::default(), stepper().factory());
    assert_eq!(device.static_name(), "Pegasus Focuser");
    assert_eq!(device.unique_id(), "pegasus-focuser-001");
    assert!(device.driver_info().await.unwrap().contains("Dmfc"));
    assert_eq!(
        device.driver_version().await.unwrap(),
        env!("CARGO_PKG_VERSION")
    );
}

#[tokio::test]
async fn test_device_connect_disconnect() {
    let scripted = stepper();
    let device = connected(&scripted).await;
    assert!(device.connected().await.unwrap());

    device.set_connected(false).await.unwrap();
    assert!(!device.connected().await.unwrap());
}

#[tokio::test]
async fn test_device_connect_failure() {
    let device = create_device_with(Config::default(), Arc::new(FailingPortFactory));
    let err = device.set_connected(true).await.unwrap_err();
    assert_eq!(err.code, ASCOMErrorCode::INVALID_OPERATION);
    assert!(!device.connected().await.unwrap());
}

// ============================================================================
// Stepper focuser
// ============================================================================

#[tokio::test]
async fn test_stepper_capabilities() {
    let scripted = stepper();
    let device = connected(&scripted).await;

    assert!(device.absolute().await.unwrap());
    assert!(!device.temp_comp_available().await.unwrap());
    assert!(!device.temp_comp().await.unwrap());
    assert_eq!(device.max_step().await.unwrap(), 100_000);
    assert_eq!(device.max_increment().await.unwrap(), 50_000);
}

#[tokio::test]
async fn test_stepper_position_and_temperature() {
    let scripted = stepper();
    let device = connected(&scripted).await;

    assert_eq!(device.position().await.unwrap(), 45_000);
    assert_eq!(device.temperature().await.unwrap(), -3.25);
}

#[tokio::test]
async fn test_stepper_move_and_complete() {
    let scripted = stepper();
    let device = connected(&scripted).await;
    scripted.clear_written();

    device.move_(46_000).await.unwrap();
    assert_eq!(scripted.written_text(), vec!["M:46000\n"]);

    scripted.once("A\n", &[b"OK_DMFCN:3.4:1:-3.25:45500:1:1:0:0:0\n"]);
    assert!(device.is_moving().await.unwrap());

    scripted.once("A\n", &[b"OK_DMFCN:3.4:1:-3.25:46000:0:1:0:0:0\n"]);
    assert!(!device.is_moving().await.unwrap());
    assert_eq!(device.position().await.unwrap(), 46_000);
}

#[tokio::test]
async fn test_stepper_move_out_of_range() {
    let scripted = stepper();
    let device = connected(&scripted).await;

    for position in [-1, 100_001] {
        assert_eq!(
            device.move_(position).await.unwrap_err().code,
            ASCOMErrorCode::INVALID_VALUE
        );
    }
}

#[tokio::test]
async fn test_halt() {
    let scripted = stepper();
    let device = connected(&scripted).await;
    device.move_(10).await.unwrap();

    device.halt().await.unwrap();
    assert!(!device.is_moving().await.unwrap());
}

#[tokio::test]
async fn test_requires_connection() {
    let device = create_device_with(Config::default(), stepper().factory());

    for code in [
        device.position().await.unwrap_err().code,
        device.temperature().await.unwrap_err().code,
        device.is_moving().await.unwrap_err().code,
        device.move_(1).await.unwrap_err().code,
        device.halt().await.unwrap_err().code,
    ] {
        assert_eq!(code, ASCOMErrorCode::NOT_CONNECTED);
    }
}

// ============================================================================
// DC motor
// ============================================================================

#[tokio::test]
async fn test_dc_motor_is_relative() {
    let scripted = dc_motor();
    let device = connected(&scripted).await;

    assert!(!device.absolute().await.unwrap());
    assert_eq!(
        device.position().await.unwrap_err().code,
        ASCOMErrorCode::NOT_IMPLEMENTED
    );
}

#[tokio::test]
async fn test_dc_motor_moves_relative() {
    let scripted = dc_motor();
    let device = connected(&scripted).await;
    scripted.clear_written();

    device.move_(-1200).await.unwrap();
    assert_eq!(scripted.written_text(), vec!["G:-1200\n"]);
}

#[tokio::test]
async fn test_dc_motor_move_bounded_by_max_increment() {
    let scripted = dc_motor();
    let device = connected(&scripted).await;

    assert_eq!(
        device.move_(50_001).await.unwrap_err().code,
        ASCOMErrorCode::INVALID_VALUE
    );
    assert_eq!(
        device.move_(-50_001).await.unwrap_err().code,
        ASCOMErrorCode::INVALID_VALUE
    );
    assert!(device.move_(-50_000).await.is_ok());
}

#[tokio::test]
async fn test_configured_dc_motor_is_relative_before_connect() {
    let mut config = Config::default();
    config.focuser.motor = Some(MotorType::Dc);
    let device = create_device_with(config, dc_motor().factory());

    assert!(!device.absolute().await.unwrap());
}

#[tokio::test]
async fn test_no_sensor_temperature() {
    let scripted = dc_motor();
    let device = connected(&scripted).await;

    let err = device.temperature().await.unwrap_err();
    assert_eq!(err.code, ASCOMErrorCode::INVALID_OPERATION);
}

// ============================================================================
// FocusCube
// ============================================================================

#[tokio::test]
async fn test_focuscube_is_absolute() {
    let scripted = controller("OK_FC:1.2:0:10.0:2000:0:1:0:0:0");
    let mut config = Config::default();
    config.focuser.model = Model::FocusCube;
    let device = create_device_with(config, scripted.factory());
    device.set_connected(true).await.unwrap();

    // motor field 0 is not a DC motor on a FocusCube
    assert!(device.absolute().await.unwrap());
    assert_eq!(device.position().await.unwrap(), 2000);
}
