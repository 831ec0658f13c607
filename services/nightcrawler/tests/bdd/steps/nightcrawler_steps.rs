//! Step definitions for the NightCrawler features

use crate::world::NightCrawlerWorld;
use ascom_alpaca::api::{Device, Focuser, Rotator};
use ascom_alpaca::ASCOMErrorCode;
use cucumber::{given, then, when};
use nightcrawler::Motor;
use serial_link::MotionState;

#[given("a NightCrawler that homes on connect")]
fn homes_on_connect(world: &mut NightCrawlerWorld) {
    world.config.controller.find_home_on_connect = true;
}

#[given("a connected NightCrawler")]
async fn connected_nightcrawler(world: &mut NightCrawlerWorld) {
    world.build_devices(NightCrawlerWorld::standard_controller());
    world.focuser().set_connected(true).await.unwrap();
    world.rotator().set_connected(true).await.unwrap();
    world.controller().clear_written();
}

#[given("the rotator is reversed")]
async fn rotator_reversed(world: &mut NightCrawlerWorld) {
    world.rotator().set_reverse(true).await.unwrap();
}

#[when(expr = "I move the focuser to position {int}")]
async fn move_focuser(world: &mut NightCrawlerWorld, position: i32) {
    let target = format!("1SN {}#", position);
    world.controller().on(target, &[b"#"]);
    let result = world.focuser().move_(position).await;
    world.record_error(result);
}

#[when(expr = "I move the rotator to {float} degrees")]
async fn move_rotator(world: &mut NightCrawlerWorld, angle: f64) {
    for ticks in ["111020", "-111020"] {
        world.controller().on(format!("2SN {}#", ticks), &[b"#"]);
    }
    let result = world.rotator().move_absolute(angle).await;
    world.record_error(result);
}

#[when(expr = "the {word} motor reports position {int} and {word}")]
fn motor_reports(world: &mut NightCrawlerWorld, motor: String, position: i32, state: String) {
    let number = if motor == "focus" { 1 } else { 2 };
    let moving: &[u8] = if state == "running" { b"01#" } else { b"00#" };
    let reply = format!("{:07}#", position);
    world
        .controller()
        .on(format!("{}GM#", number), &[moving])
        .on(format!("{}GP#", number), &[reply.as_bytes()]);
}

#[when("the controller reports homing complete")]
fn homing_complete(world: &mut NightCrawlerWorld) {
    world.controller().push_frames(&[b"OK#"]);
}

#[when("I ask whether the focuser is moving")]
async fn ask_focuser_moving(world: &mut NightCrawlerWorld) {
    world.is_moving_result = Some(world.focuser().is_moving().await.unwrap());
}

#[when("I ask whether the rotator is moving")]
async fn ask_rotator_moving(world: &mut NightCrawlerWorld) {
    world.is_moving_result = Some(world.rotator().is_moving().await.unwrap());
}

#[when("I halt the rotator")]
async fn halt_rotator(world: &mut NightCrawlerWorld) {
    world.rotator().halt().await.unwrap();
}

#[then(expr = "the controller should have received {string}")]
fn controller_received(world: &mut NightCrawlerWorld, command: String) {
    let written = world.controller().written_text();
    assert!(written.contains(&command), "{} not in {:?}", command, written);
}

#[then("the controller should have received nothing")]
fn controller_received_nothing(world: &mut NightCrawlerWorld) {
    assert!(world.controller().written().is_empty());
}

#[then(expr = "it should {word} be moving")]
fn moving_is(world: &mut NightCrawlerWorld, polarity: String) {
    assert_eq!(world.is_moving_result, Some(polarity == "still"));
}

#[then("the request should fail with an invalid operation error")]
fn invalid_operation(world: &mut NightCrawlerWorld) {
    assert_eq!(
        world.last_error_code,
        Some(ASCOMErrorCode::INVALID_OPERATION.raw())
    );
}

#[then(expr = "the rotator position should be {float} degrees")]
async fn rotator_position(world: &mut NightCrawlerWorld, expected: f64) {
    let actual = world.rotator().position().await.unwrap();
    assert!((actual - expected).abs() < 1e-6, "rotator at {}", actual);
}

#[then(expr = "the {word} motion state should be {word}")]
async fn motion_state_is(world: &mut NightCrawlerWorld, motor: String, expected: String) {
    let motor = if motor == "focus" {
        Motor::Focus
    } else {
        Motor::Rotator
    };
    let expected = match expected.as_str() {
        "idle" => MotionState::Idle,
        "busy" => MotionState::Busy,
        "ok" => MotionState::Ok,
        "alert" => MotionState::Alert,
        other => panic!("unknown motion state {}", other),
    };
    assert_eq!(world.manager().motion_state(motor).await, expected);
}
