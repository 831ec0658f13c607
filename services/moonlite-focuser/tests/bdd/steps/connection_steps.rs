//! Step definitions for connection_lifecycle.feature

use crate::world::MoonliteWorld;
use ascom_alpaca::api::Device;
use ascom_alpaca::ASCOMErrorCode;
use cucumber::{given, then, when};

// ============================================================================
// Given steps
// ============================================================================

#[given("a focuser on a standard MoonLite controller")]
fn focuser_on_standard_controller(world: &mut MoonliteWorld) {
    world.build_device(MoonliteWorld::standard_controller());
}

#[given("a connected focuser on a standard MoonLite controller")]
async fn connected_focuser(world: &mut MoonliteWorld) {
    world.build_device(MoonliteWorld::standard_controller());
    world.device().set_connected(true).await.unwrap();
}

#[given("a focuser on a controller that never answers")]
fn focuser_on_silent_controller(world: &mut MoonliteWorld) {
    world.build_device(serial_link::testing::ScriptedDevice::new());
}

#[given("a focuser whose serial port cannot be opened")]
fn focuser_with_failing_port(world: &mut MoonliteWorld) {
    world.build_device_with_failing_factory();
}

#[given(expr = "the focuser is configured with speed {int}")]
fn configured_speed(world: &mut MoonliteWorld, speed: u8) {
    let mut config = world.config.clone().unwrap_or_default();
    config.focuser.speed = Some(speed);
    world.config = Some(config);
}

// ============================================================================
// When steps
// ============================================================================

#[when("I connect the focuser")]
async fn connect_focuser(world: &mut MoonliteWorld) {
    world.device().set_connected(true).await.unwrap();
}

#[when("I disconnect the focuser")]
async fn disconnect_focuser(world: &mut MoonliteWorld) {
    world.device().set_connected(false).await.unwrap();
}

#[when("I try to connect the focuser")]
async fn try_connect_focuser(world: &mut MoonliteWorld) {
    let result = world.device().set_connected(true).await;
    world.record_error(result);
}

// ============================================================================
// Then steps
// ============================================================================

#[then("the focuser should be connected")]
async fn focuser_connected(world: &mut MoonliteWorld) {
    assert!(world.device().connected().await.unwrap());
}

#[then("the focuser should be disconnected")]
async fn focuser_disconnected(world: &mut MoonliteWorld) {
    assert!(!world.device().connected().await.unwrap());
}

#[then("the connection should fail with an invalid operation error")]
fn connection_failed(world: &mut MoonliteWorld) {
    assert_eq!(
        world.last_error_code,
        Some(ASCOMErrorCode::INVALID_OPERATION.raw())
    );
}

#[then(expr = "the controller should have received {string}")]
fn controller_received(world: &mut MoonliteWorld, command: String) {
    let written = world.controller().written_text();
    assert!(
        written.contains(&command),
        "{} not in {:?}",
        command,
        written
    );
}

#[then(expr = "the controller should have been asked for its position {int} times")]
fn position_queries(world: &mut MoonliteWorld, count: usize) {
    let queries = world
        .controller()
        .written_text()
        .iter()
        .filter(|c| c.as_str() == ":GP#")
        .count();
    assert_eq!(queries, count);
}

#[then(expr = "the serial port should have been opened {int} time(s)")]
fn port_opened(world: &mut MoonliteWorld, count: u32) {
    assert_eq!(world.controller().open_count(), count);
}
