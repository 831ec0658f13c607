//! Step definitions for rotation.feature

use crate::world::PyxisWorld;
use ascom_alpaca::api::{Device, Rotator};
use ascom_alpaca::ASCOMErrorCode;
use cucumber::{given, then, when};
use serial_link::MotionState;

const DEGREE: [u8; 128] = [b'!'; 128];

// ============================================================================
// Given steps
// ============================================================================

#[given(expr = "a connected Pyxis rotator at {int} degrees")]
async fn connected_rotator(world: &mut PyxisWorld, angle: u16) {
    world.script_rotator(angle);
    world.build_device();
    world.device().set_connected(true).await.unwrap();
    world.rotator().clear_written();
}

#[given("the rotator has been put to sleep")]
async fn rotator_asleep(world: &mut PyxisWorld) {
    world.manager().sleep().await.unwrap();
}

// ============================================================================
// When steps
// ============================================================================

#[when(expr = "I rotate to {float} degrees")]
async fn rotate_to(world: &mut PyxisWorld, angle: f64) {
    world.device().move_absolute(angle).await.unwrap();
}

#[when(expr = "I try to rotate to {float} degrees")]
async fn try_rotate_to(world: &mut PyxisWorld, angle: f64) {
    let result = world.device().move_absolute(angle).await;
    world.record_error(result);
}

#[when(expr = "the rotator reports {int} degree(s) of progress")]
async fn reports_progress(world: &mut PyxisWorld, degrees: usize) {
    for _ in 0..degrees {
        world.rotator().push_frames(&[&DEGREE]);
        world.manager().refresh_motion().await.unwrap();
    }
}

#[when(expr = "the rotator finishes at {int} degrees")]
async fn rotator_finishes(world: &mut PyxisWorld, angle: u16) {
    world.report_angle(angle);
    world.rotator().push_frames(&[b"F"]);
    world.manager().refresh_motion().await.unwrap();
}

#[when(expr = "I sync the rotator to {float} degrees")]
async fn sync_rotator(world: &mut PyxisWorld, angle: f64) {
    world.device().sync(angle).await.unwrap();
}

#[when("I wake the rotator")]
async fn wake_rotator(world: &mut PyxisWorld) {
    world.manager().wake().await.unwrap();
}

// ============================================================================
// Then steps
// ============================================================================

#[then(expr = "the motion state should be {word}")]
async fn motion_state_is(world: &mut PyxisWorld, expected: String) {
    let expected = match expected.as_str() {
        "idle" => MotionState::Idle,
        "busy" => MotionState::Busy,
        "ok" => MotionState::Ok,
        "alert" => MotionState::Alert,
        other => panic!("unknown motion state {}", other),
    };
    assert_eq!(world.manager().motion_state().await, expected);
}

#[then(expr = "the command {string} should have been sent")]
fn command_sent(world: &mut PyxisWorld, command: String) {
    assert!(
        world.rotator().written_text().contains(&command),
        "{:?} not in {:?}",
        command,
        world.rotator().written_text()
    );
}

#[then(expr = "the mechanical position should be {float} degrees")]
async fn mechanical_position_is(world: &mut PyxisWorld, expected: f64) {
    assert_eq!(world.device().mechanical_position().await.unwrap(), expected);
}

#[then(expr = "the position should be {float} degrees")]
async fn position_is(world: &mut PyxisWorld, expected: f64) {
    assert_eq!(world.device().position().await.unwrap(), expected);
}

#[then("the rotator should be moving")]
async fn rotator_moving(world: &mut PyxisWorld) {
    assert!(world.device().is_moving().await.unwrap());
}

#[then("the rotator should not be moving")]
async fn rotator_not_moving(world: &mut PyxisWorld) {
    assert!(!world.device().is_moving().await.unwrap());
}

#[then("the move should be rejected as an invalid operation")]
fn rejected_invalid_operation(world: &mut PyxisWorld) {
    assert_eq!(
        world.last_error_code,
        Some(ASCOMErrorCode::INVALID_OPERATION.raw())
    );
}

#[then("no rotation command should have been sent")]
fn no_rotation_sent(world: &mut PyxisWorld) {
    assert!(world
        .rotator()
        .written_text()
        .iter()
        .all(|w| !w.starts_with("CPA")));
}
