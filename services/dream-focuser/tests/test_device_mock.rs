//! Device tests for the Dream Focuser against scripted hardware

use std::sync::Arc;

use ascom_alpaca::api::{Device, Focuser};
use ascom_alpaca::ASCOMErrorCode;
use dream_focuser::protocol::Command;
use dream_focuser::{Config, DreamFocuserDevice, SerialManager};
use serial_link::testing::{FailingPortFactory, ScriptedDevice};
use serial_link::{sum8, SerialPortFactory};

// ============================================================================
// Helpers
// ============================================================================

fn frame(code: u8, payload: [u8; 4]) -> Vec<u8> {
    let mut frame = vec![b'M', code, payload[0], payload[1], payload[2], payload[3], 0];
    frame.push(sum8(&frame));
    frame
}

fn value_reply(code: u8, value: i32) -> Vec<u8> {
    frame(code, value.to_be_bytes())
}

fn focuser(max_position: i32) -> ScriptedDevice {
    let device = ScriptedDevice::new();
    device
        .on(Command::Status.encode(), &[&frame(b'I', [0; 4])])
        .on(Command::AbsoluteMode.encode(), &[&frame(b'W', [0, 0, 0, 1])])
        .on(Command::Position.encode(), &[&value_reply(b'P', 20_000)])
        .on(Command::MaxPosition.encode(), &[&value_reply(b'A', max_position)])
        .on(Command::Climate.encode(), &[&frame(b'T', [0x01, 0xf4, 0x00, 0x2d])]);
    device
}

fn create_device_with(mut config: Config, factory: Arc<dyn SerialPortFactory>) -> DreamFocuserDevice {
    config.serial.polling_interval_ms = 60_000;
    let manager = Arc::new(SerialManager::new(config.clone(), factory));
    DreamFocuserDevice::new(config.focuser, manager)
}

async fn connected(scripted: &ScriptedDevice) -> DreamFocuserDevice {
    let device = create_device_with(Config::default(), scripted.factory());
    device.set_connected(true).await.unwrap();
    device
}

// ============================================================================
// Device trait
// ============================================================================

#[tokio::test]
async fn test_device_metadata() {
    let device = create_device_with(Config::default(), focuser(50_000).factory());
    assert_eq!(device.static_name(), "Dream Focuser");
    assert_eq!(device.unique_id(), "dream-focuser-001");
    assert!(device.driver_info().await.unwrap().contains("Dream Focuser"));
    assert_eq!(
        device.driver_version().await.unwrap(),
        env!("CARGO_PKG_VERSION")
    );
}

#[tokio::test]
async fn test_device_connect_disconnect() {
    let scripted = focuser(50_000);
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

#[tokio::test]
async fn test_disconnected_device_rejects_queries() {
    let device = create_device_with(Config::default(), focuser(50_000).factory());
    assert_eq!(
        device.position().await.unwrap_err().code,
        ASCOMErrorCode::NOT_CONNECTED
    );
    assert_eq!(
        device.move_(10).await.unwrap_err().code,
        ASCOMErrorCode::NOT_CONNECTED
    );
    assert_eq!(
        device.temperature().await.unwrap_err().code,
        ASCOMErrorCode::NOT_CONNECTED
    );
}

// ============================================================================
// Focuser trait
// ============================================================================

#[tokio::test]
async fn test_focuser_properties() {
    let scripted = focuser(50_000);
    let device = connected(&scripted).await;

    assert!(device.absolute().await.unwrap());
    assert_eq!(device.position().await.unwrap(), 20_000);
    assert_eq!(device.temperature().await.unwrap(), 4.5);
    assert_eq!(device.max_step().await.unwrap(), 50_000);
    assert_eq!(device.max_increment().await.unwrap(), 50_000);
    assert!(!device.temp_comp().await.unwrap());
    assert!(!device.temp_comp_available().await.unwrap());
    assert_eq!(
        device.step_size().await.unwrap_err().code,
        ASCOMErrorCode::NOT_IMPLEMENTED
    );
}

#[tokio::test]
async fn test_max_step_falls_back_to_config() {
    let scripted = focuser(0);
    let device = connected(&scripted).await;
    assert_eq!(device.max_step().await.unwrap(), 100_000);
}

#[tokio::test]
async fn test_move_and_poll_until_stopped() {
    let scripted = focuser(50_000);
    scripted.on(Command::MoveTo(25_000).encode(), &[&value_reply(b'M', 25_000)]);
    let device = connected(&scripted).await;

    device.move_(25_000).await.unwrap();
    scripted
        .on(Command::Status.encode(), &[&frame(b'I', [0, 0, 0, 1])])
        .on(Command::Position.encode(), &[&value_reply(b'P', 22_000)]);
    assert!(device.is_moving().await.unwrap());
    assert_eq!(device.position().await.unwrap(), 22_000);

    scripted
        .on(Command::Status.encode(), &[&frame(b'I', [0; 4])])
        .on(Command::Position.encode(), &[&value_reply(b'P', 25_000)]);
    assert!(!device.is_moving().await.unwrap());
    assert_eq!(device.position().await.unwrap(), 25_000);
}

#[tokio::test]
async fn test_move_out_of_range() {
    let scripted = focuser(50_000);
    let device = connected(&scripted).await;
    scripted.clear_written();

    for target in [-1, 50_001] {
        assert_eq!(
            device.move_(target).await.unwrap_err().code,
            ASCOMErrorCode::INVALID_VALUE
        );
    }
    assert!(scripted.written().is_empty());
}

#[tokio::test]
async fn test_move_on_uncalibrated_focuser() {
    let scripted = focuser(50_000);
    scripted.on(Command::AbsoluteMode.encode(), &[&frame(b'W', [0; 4])]);
    let device = connected(&scripted).await;

    assert_eq!(
        device.move_(100).await.unwrap_err().code,
        ASCOMErrorCode::INVALID_OPERATION
    );
}

#[tokio::test]
async fn test_halt() {
    let scripted = focuser(50_000);
    scripted.on(Command::Halt.encode(), &[&frame(b'H', [0; 4])]);
    let device = connected(&scripted).await;
    scripted.clear_written();

    device.halt().await.unwrap();
    assert_eq!(scripted.written(), vec![Command::Halt.encode().to_vec()]);
    assert!(!device.is_moving().await.unwrap());
}
