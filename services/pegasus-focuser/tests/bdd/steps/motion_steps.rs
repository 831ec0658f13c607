//! Step definitions for motion.feature

use crate::world::PegasusWorld;
use ascom_alpaca::api::Focuser;
use ascom_alpaca::ASCOMErrorCode;
use cucumber::{then, when};
use serial_link::MotionState;

#[when(expr = "I move the focuser to {int}")]
async fn move_focuser(world: &mut PegasusWorld, position: i32) {
    world.controller().clear_written();
    world.device().move_(position).await.unwrap();
}

#[when(expr = "I try to move the focuser to {int}")]
async fn try_move_focuser(world: &mut PegasusWorld, position: i32) {
    let result = world.device().move_(position).await;
    world.record_error(result);
}

#[when(expr = "the controller next reports {string}")]
fn controller_next_reports(world: &mut PegasusWorld, status: String) {
    world
        .controller()
        .once("A\n", &[format!("{}\n", status).as_bytes()]);
}

#[when("I ask whether the focuser is moving")]
async fn ask_is_moving(world: &mut PegasusWorld) {
    world.is_moving_result = Some(world.device().is_moving().await.unwrap());
}

#[when("I halt the focuser")]
async fn halt_focuser(world: &mut PegasusWorld) {
    world.device().halt().await.unwrap();
}

#[then(expr = "the only command sent should be {string}")]
fn only_command(world: &mut PegasusWorld, command: String) {
    assert_eq!(
        world.controller().written_text(),
        vec![format!("{}\n", command)]
    );
}

#[then("the focuser should be moving")]
fn focuser_moving(world: &mut PegasusWorld) {
    assert_eq!(world.is_moving_result, Some(true));
}

#[then("the focuser should not be moving")]
fn focuser_not_moving(world: &mut PegasusWorld) {
    assert_eq!(world.is_moving_result, Some(false));
}

#[then(expr = "the motion state should be {word}")]
async fn motion_state_is(world: &mut PegasusWorld, expected: String) {
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
fn move_rejected(world: &mut PegasusWorld) {
    assert_eq!(
        world.last_error_code,
        Some(ASCOMErrorCode::INVALID_VALUE.raw())
    );
}
