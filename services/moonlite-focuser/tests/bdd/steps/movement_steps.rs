//! Step definitions for movement_control.feature

use crate::world::MoonliteWorld;
use ascom_alpaca::api::Focuser;
use ascom_alpaca::ASCOMErrorCode;
use cucumber::{given, then, when};
use serial_link::MotionState;

// ============================================================================
// Given steps
// ============================================================================

#[given(expr = "the controller reports it is moving")]
fn controller_moving(world: &mut MoonliteWorld) {
    world.controller().on(":GI#", &[b"01#"]);
}

#[when(expr = "the controller reports it has stopped at position {int}")]
fn controller_stopped_at(world: &mut MoonliteWorld, position: u16) {
    let reply = format!("{:04X}#", position);
    world
        .controller()
        .on(":GI#", &[b"00#"])
        .on(":GP#", &[reply.as_bytes()]);
}

#[given("the controller stops accepting commands")]
fn controller_fails_writes(world: &mut MoonliteWorld) {
    world.controller().fail_writes(true);
}

// ============================================================================
// When steps
// ============================================================================

#[when(expr = "I move the focuser to position {int}")]
async fn move_focuser(world: &mut MoonliteWorld, position: i32) {
    world.controller().clear_written();
    world.device().move_(position).await.unwrap();
}

#[when(expr = "I try to move the focuser to position {int}")]
async fn try_move_focuser(world: &mut MoonliteWorld, position: i32) {
    let result = world.device().move_(position).await;
    world.record_error(result);
}

#[when("I halt the focuser")]
async fn halt_focuser(world: &mut MoonliteWorld) {
    world.device().halt().await.unwrap();
}

#[when("I ask whether the focuser is moving")]
async fn ask_is_moving(world: &mut MoonliteWorld) {
    world.is_moving_result = Some(world.device().is_moving().await.unwrap());
}

#[when("I read the focuser position")]
async fn read_position(world: &mut MoonliteWorld) {
    world.position_result = Some(world.device().position().await.unwrap());
}

// ============================================================================
// Then steps
// ============================================================================

#[then(expr = "the controller should have received {string} then {string}")]
fn controller_received_in_order(world: &mut MoonliteWorld, first: String, second: String) {
    assert_eq!(world.controller().written_text(), vec![first, second]);
}

#[then("the focuser should be moving")]
fn focuser_moving(world: &mut MoonliteWorld) {
    assert_eq!(world.is_moving_result, Some(true));
}

#[then("the focuser should not be moving")]
fn focuser_not_moving(world: &mut MoonliteWorld) {
    assert_eq!(world.is_moving_result, Some(false));
}

#[then(expr = "the position should be {int}")]
fn position_is(world: &mut MoonliteWorld, expected: i32) {
    assert_eq!(world.position_result, Some(expected));
}

#[then(expr = "the motion state should be {word}")]
async fn motion_state_is(world: &mut MoonliteWorld, expected: String) {
    let expected = match expected.as_str() {
        "idle" => MotionState::Idle,
        "busy" => MotionState::Busy,
        "ok" => MotionState::Ok,
        "alert" => MotionState::Alert,
        other => panic!("unknown motion state {}", other),
    };
    assert_eq!(world.manager().motion_state().await, expected);
}

#[then("the move should be rejected as an invalid value")]
fn move_rejected_invalid_value(world: &mut MoonliteWorld) {
    assert_eq!(
        world.last_error_code,
        Some(ASCOMErrorCode::INVALID_VALUE.raw())
    );
}

#[then("the move should fail")]
fn move_failed(world: &mut MoonliteWorld) {
    assert!(world.last_error.is_some());
}
