//! Step definitions for the Lacerta MFOC features

use crate::world::LacertaWorld;
use ascom_alpaca::api::{Device, Focuser};
use ascom_alpaca::ASCOMErrorCode;
use cucumber::{given, then, when};
use serial_link::MotionState;

// ============================================================================
// Given steps
// ============================================================================

#[given(expr = "the focuser is configured with backlash {int}")]
fn configured_backlash(world: &mut LacertaWorld, backlash: u8) {
    let mut config = world.config.clone().unwrap_or_default();
    config.focuser.backlash = Some(backlash);
    world.config = Some(config);
}

#[given("a focuser on a standard MFOC")]
fn focuser_on_standard_controller(world: &mut LacertaWorld) {
    world.build_device(LacertaWorld::standard_controller());
}

#[given("a connected focuser on a standard MFOC")]
async fn connected_focuser(world: &mut LacertaWorld) {
    world.build_device(LacertaWorld::standard_controller());
    world.device().set_connected(true).await.unwrap();
    world.controller().clear_written();
}

#[given(expr = "the controller reads back backlash {int}")]
fn reads_back_backlash(world: &mut LacertaWorld, backlash: u32) {
    let reply = format!("B {}\r", backlash);
    world.controller().on(": J #", &[reply.as_bytes()]);
}

// ============================================================================
// When steps
// ============================================================================

#[when("I try to connect the focuser")]
async fn try_connect(world: &mut LacertaWorld) {
    let result = world.device().set_connected(true).await;
    world.record_error(result);
}

#[when(expr = "I move the focuser to position {int}")]
async fn move_focuser(world: &mut LacertaWorld, position: i32) {
    world.device().move_(position).await.unwrap();
}

#[when(expr = "I try to move the focuser to position {int}")]
async fn try_move_focuser(world: &mut LacertaWorld, position: i32) {
    let result = world.device().move_(position).await;
    world.record_error(result);
}

#[when(expr = "the controller reports position {int}")]
fn controller_reports(world: &mut LacertaWorld, position: u32) {
    let reply = format!("P {}\r", position);
    world.controller().on(": Q #", &[reply.as_bytes()]);
}

#[when("I ask whether the focuser is moving")]
async fn ask_is_moving(world: &mut LacertaWorld) {
    world.is_moving_result = Some(world.device().is_moving().await.unwrap());
}

#[when("I try to halt the focuser")]
async fn try_halt(world: &mut LacertaWorld) {
    let result = world.device().halt().await;
    world.record_error(result);
}

// ============================================================================
// Then steps
// ============================================================================

#[then("the focuser should be connected")]
async fn focuser_connected(world: &mut LacertaWorld) {
    assert!(world.device().connected().await.unwrap());
}

#[then("the focuser should be disconnected")]
async fn focuser_disconnected(world: &mut LacertaWorld) {
    assert!(!world.device().connected().await.unwrap());
}

#[then(expr = "the controller should have received {string}")]
fn controller_received(world: &mut LacertaWorld, command: String) {
    let written = world.controller().written_text();
    assert!(written.contains(&command), "{} not in {:?}", command, written);
}

#[then(expr = "the focuser should {word} be moving")]
fn moving_is(world: &mut LacertaWorld, polarity: String) {
    assert_eq!(world.is_moving_result, Some(polarity == "still"));
}

#[then(expr = "the motion state should be {word}")]
async fn motion_state_is(world: &mut LacertaWorld, expected: String) {
    let expected = match expected.as_str() {
        "idle" => MotionState::Idle,
        "busy" => MotionState::Busy,
        "ok" => MotionState::Ok,
        "alert" => MotionState::Alert,
        other => panic!("unknown motion state {}", other),
    };
    assert_eq!(world.manager().motion_state().await, expected);
}

#[then(expr = "the request should fail with {word}")]
fn request_failed_with(world: &mut LacertaWorld, code: String) {
    let expected = match code.as_str() {
        "invalid_value" => ASCOMErrorCode::INVALID_VALUE,
        "invalid_operation" => ASCOMErrorCode::INVALID_OPERATION,
        "not_implemented" => ASCOMErrorCode::NOT_IMPLEMENTED,
        other => panic!("unknown error code {}", other),
    };
    assert_eq!(world.last_error_code, Some(expected.raw()));
}
