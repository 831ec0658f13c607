//! Step definitions for the TeenAstro focuser features

use crate::world::TeenAstroWorld;
use ascom_alpaca::api::{Device, Focuser};
use ascom_alpaca::ASCOMErrorCode;
use cucumber::{given, then, when};
use serial_link::MotionState;

#[given("a focuser on a standard TeenAstro controller")]
fn focuser_on_standard_controller(world: &mut TeenAstroWorld) {
    world.build_device(TeenAstroWorld::standard_controller());
}

#[given("a connected focuser on a standard TeenAstro controller")]
async fn connected_focuser(world: &mut TeenAstroWorld) {
    world.build_device(TeenAstroWorld::standard_controller());
    world.device().set_connected(true).await.unwrap();
    world.controller().clear_written();
}

#[given(expr = "the controller identifies as {string}")]
fn controller_identifies(world: &mut TeenAstroWorld, version: String) {
    let reply = format!("{}#", version);
    world.controller().on(":FV#", &[reply.as_bytes()]);
}

#[when("I try to connect the focuser")]
async fn try_connect(world: &mut TeenAstroWorld) {
    let result = world.device().set_connected(true).await;
    world.record_error(result);
}

#[when(expr = "I move the focuser to position {int}")]
async fn move_focuser(world: &mut TeenAstroWorld, position: i32) {
    world.device().move_(position).await.unwrap();
}

#[when(expr = "the controller reports position {int} at speed {int}")]
fn controller_reports(world: &mut TeenAstroWorld, position: u32, speed: u32) {
    let reply = format!("?{} {} 18.5#", position, speed);
    world.controller().on(":F?#", &[reply.as_bytes()]);
}

#[when("I ask whether the focuser is moving")]
async fn ask_is_moving(world: &mut TeenAstroWorld) {
    world.is_moving_result = Some(world.device().is_moving().await.unwrap());
}

#[when("I halt the focuser")]
async fn halt_focuser(world: &mut TeenAstroWorld) {
    world.device().halt().await.unwrap();
}

#[then("the focuser should be connected")]
async fn focuser_connected(world: &mut TeenAstroWorld) {
    assert!(world.device().connected().await.unwrap());
}

#[then("the focuser should be disconnected")]
async fn focuser_disconnected(world: &mut TeenAstroWorld) {
    assert!(!world.device().connected().await.unwrap());
}

#[then("the connection should fail with an invalid operation error")]
fn connection_failed(world: &mut TeenAstroWorld) {
    assert_eq!(
        world.last_error_code,
        Some(ASCOMErrorCode::INVALID_OPERATION.raw())
    );
}

#[then(expr = "the controller should have received {string}")]
fn controller_received(world: &mut TeenAstroWorld, command: String) {
    let written = world.controller().written_text();
    assert!(written.contains(&command), "{} not in {:?}", command, written);
}

#[then(expr = "the focuser should {word} be moving")]
fn moving_is(world: &mut TeenAstroWorld, polarity: String) {
    assert_eq!(world.is_moving_result, Some(polarity == "still"));
}

#[then(expr = "the motion state should be {word}")]
async fn motion_state_is(world: &mut TeenAstroWorld, expected: String) {
    let expected = match expected.as_str() {
        "idle" => MotionState::Idle,
        "busy" => MotionState::Busy,
        "ok" => MotionState::Ok,
        "alert" => MotionState::Alert,
        other => panic!("unknown motion state {}", other),
    };
    assert_eq!(world.manager().motion_state().await, expected);
}
