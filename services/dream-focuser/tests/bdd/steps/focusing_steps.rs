//! Step definitions for focusing.feature

use crate::world::{frame, value_reply, DreamWorld};
use ascom_alpaca::api::{Device, Focuser};
use ascom_alpaca::ASCOMErrorCode;
use cucumber::{given, then, when};
use dream_focuser::protocol::{Command, ParkState};
use serial_link::MotionState;

// ============================================================================
// Given steps
// ============================================================================

#[given(expr = "a connected Dream Focuser at position {int}")]
async fn connected_focuser(world: &mut DreamWorld, position: i32) {
    world.script_focuser(position, true);
    world.build_device();
    world.device().set_connected(true).await.unwrap();
}

#[given(expr = "a connected uncalibrated Dream Focuser at position {int}")]
async fn connected_uncalibrated_focuser(world: &mut DreamWorld, position: i32) {
    world.script_focuser(position, false);
    world.build_device();
    world.device().set_connected(true).await.unwrap();
}

#[given(expr = "the focuser accepts a move to {int}")]
fn accepts_move(world: &mut DreamWorld, target: i32) {
    world
        .focuser()
        .on(Command::MoveTo(target).encode(), &[&value_reply(b'M', target)]);
}

#[given(expr = "the focuser accepts a sync to {int}")]
fn accepts_sync(world: &mut DreamWorld, position: i32) {
    world
        .focuser()
        .on(Command::Sync(position).encode(), &[&value_reply(b'Z', position)])
        .on(Command::AbsoluteMode.encode(), &[&frame(b'W', [0, 0, 0, 1])]);
}

#[given("the focuser accepts a park")]
fn accepts_park(world: &mut DreamWorld) {
    world
        .focuser()
        .on(Command::Park.encode(), &[&frame(b'G', [0; 4])]);
}

// ============================================================================
// When steps
// ============================================================================

#[when(expr = "I move the focuser to {int}")]
async fn move_focuser(world: &mut DreamWorld, target: i32) {
    world.device().move_(target).await.unwrap();
}

#[when(expr = "I try to move the focuser to {int}")]
async fn try_move_focuser(world: &mut DreamWorld, target: i32) {
    let result = world.device().move_(target).await;
    world.record_error(result);
}

#[when(expr = "the focuser reports moving at position {int}")]
fn reports_moving(world: &mut DreamWorld, position: i32) {
    world
        .focuser()
        .on(Command::Status.encode(), &[&frame(b'I', [0, 0, 0, 1])])
        .on(Command::Position.encode(), &[&value_reply(b'P', position)]);
}

#[when(expr = "the focuser reports stopped at position {int}")]
fn reports_stopped(world: &mut DreamWorld, position: i32) {
    world
        .focuser()
        .on(Command::Status.encode(), &[&frame(b'I', [0; 4])])
        .on(Command::Position.encode(), &[&value_reply(b'P', position)]);
}

#[when("the focuser reports it is parked")]
fn reports_parked(world: &mut DreamWorld) {
    world
        .focuser()
        .on(Command::Status.encode(), &[&frame(b'I', [0, 0, 0, 0b0001_0000])])
        .on(Command::Position.encode(), &[&value_reply(b'P', 0)]);
}

#[when("I ask whether the focuser is moving")]
async fn ask_is_moving(world: &mut DreamWorld) {
    world.is_moving_result = Some(world.device().is_moving().await.unwrap());
}

#[when(expr = "I sync the focuser to {int}")]
async fn sync_focuser(world: &mut DreamWorld, position: i32) {
    world.manager().sync(position).await.unwrap();
}

#[when("I park the focuser")]
async fn park_focuser(world: &mut DreamWorld) {
    world.manager().park().await.unwrap();
}

// ============================================================================
// Then steps
// ============================================================================

#[then("the focuser should be moving")]
fn focuser_moving(world: &mut DreamWorld) {
    assert_eq!(world.is_moving_result, Some(true));
}

#[then("the focuser should not be moving")]
fn focuser_not_moving(world: &mut DreamWorld) {
    assert_eq!(world.is_moving_result, Some(false));
}

#[then(expr = "the focuser should report position {int}")]
async fn reports_position(world: &mut DreamWorld, expected: i32) {
    assert_eq!(world.device().position().await.unwrap(), expected);
}

#[then(expr = "the motion state should be {word}")]
async fn motion_state_is(world: &mut DreamWorld, expected: String) {
    let expected = match expected.as_str() {
        "idle" => MotionState::Idle,
        "busy" => MotionState::Busy,
        "ok" => MotionState::Ok,
        "alert" => MotionState::Alert,
        other => panic!("unknown motion state {}", other),
    };
    assert_eq!(world.manager().motion_state().await, expected);
}

#[then("the move should be rejected as an invalid operation")]
fn rejected_invalid_operation(world: &mut DreamWorld) {
    assert_eq!(
        world.last_error_code,
        Some(ASCOMErrorCode::INVALID_OPERATION.raw())
    );
}

#[then("the move should be rejected as an invalid value")]
fn rejected_invalid_value(world: &mut DreamWorld) {
    assert_eq!(
        world.last_error_code,
        Some(ASCOMErrorCode::INVALID_VALUE.raw())
    );
}

#[then("no move command should have been sent")]
fn no_move_sent(world: &mut DreamWorld) {
    assert!(world.focuser().written().iter().all(|w| w[1] != b'M'));
}

#[then(expr = "the focuser should report a temperature of {float} degrees")]
async fn reports_temperature(world: &mut DreamWorld, expected: f64) {
    assert_eq!(world.device().temperature().await.unwrap(), expected);
}

#[then(expr = "the humidity should be {float} percent")]
async fn humidity_is(world: &mut DreamWorld, expected: f64) {
    let state = world.manager().get_cached_state().await;
    assert_eq!(state.humidity, Some(expected));
    assert!(state.dew_point.is_some());
}

#[then("the focuser should be parked")]
async fn focuser_parked(world: &mut DreamWorld) {
    assert_eq!(
        world.manager().get_cached_state().await.park,
        ParkState::Parked
    );
}
