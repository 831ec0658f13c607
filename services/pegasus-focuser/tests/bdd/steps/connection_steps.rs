//! Step definitions for connection_lifecycle.feature

use crate::world::PegasusWorld;
use ascom_alpaca::api::{Device, Focuser};
use ascom_alpaca::ASCOMErrorCode;
use cucumber::{given, then, when};
use pegasus_focuser::{Model, MotorType};

// ============================================================================
// Given steps
// ============================================================================

#[given(expr = "a DMFC reporting {string}")]
fn dmfc_reporting(world: &mut PegasusWorld, status: String) {
    world.script_controller(Model::Dmfc, &status);
    world.build_device();
}

#[given(expr = "a FocusCube reporting {string}")]
fn focuscube_reporting(world: &mut PegasusWorld, status: String) {
    world.script_controller(Model::FocusCube, &status);
    world.build_device();
}

#[given(expr = "a DMFC driver talking to a FocusCube reporting {string}")]
fn dmfc_driver_on_focuscube(world: &mut PegasusWorld, status: String) {
    world.script_controller(Model::FocusCube, &status);
    let mut config = world.config.clone().unwrap_or_default();
    config.focuser.model = Model::Dmfc;
    world.config = Some(config);
    world.build_device();
}

#[given("the driver is configured for a DC motor")]
fn configured_dc_motor(world: &mut PegasusWorld) {
    let mut config = world.config.clone().unwrap_or_default();
    config.focuser.motor = Some(MotorType::Dc);
    world.config = Some(config);
}

// ============================================================================
// When steps
// ============================================================================

#[when("I connect the focuser")]
async fn connect_focuser(world: &mut PegasusWorld) {
    world.device().set_connected(true).await.unwrap();
}

#[when("I try to connect the focuser")]
async fn try_connect_focuser(world: &mut PegasusWorld) {
    let result = world.device().set_connected(true).await;
    world.record_error(result);
}

// ============================================================================
// Then steps
// ============================================================================

#[then("the focuser should be connected")]
async fn focuser_connected(world: &mut PegasusWorld) {
    assert!(world.device().connected().await.unwrap());
}

#[then("the focuser should be disconnected")]
async fn focuser_disconnected(world: &mut PegasusWorld) {
    assert!(!world.device().connected().await.unwrap());
}

#[then("the connection should be refused")]
fn connection_refused(world: &mut PegasusWorld) {
    assert_eq!(
        world.last_error_code,
        Some(ASCOMErrorCode::INVALID_OPERATION.raw())
    );
}

#[then(expr = "the focuser should report position {int}")]
async fn reports_position(world: &mut PegasusWorld, expected: i32) {
    assert_eq!(world.device().position().await.unwrap(), expected);
}

#[then(expr = "the focuser should report temperature {float}")]
async fn reports_temperature(world: &mut PegasusWorld, expected: f64) {
    let actual = world.device().temperature().await.unwrap();
    assert!((actual - expected).abs() < 1e-9, "got {}", actual);
}

#[then("the temperature should be unavailable")]
async fn temperature_unavailable(world: &mut PegasusWorld) {
    assert!(world.device().temperature().await.is_err());
}

#[then("the focuser should be absolute")]
async fn focuser_absolute(world: &mut PegasusWorld) {
    assert!(world.device().absolute().await.unwrap());
}

#[then("the focuser should be relative")]
async fn focuser_relative(world: &mut PegasusWorld) {
    assert!(!world.device().absolute().await.unwrap());
}

#[then(expr = "the controller should have received {string}")]
fn controller_received(world: &mut PegasusWorld, command: String) {
    let expected = format!("{}\n", command);
    let written = world.controller().written_text();
    assert!(written.contains(&expected), "{:?}", written);
}
