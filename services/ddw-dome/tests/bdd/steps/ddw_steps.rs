//! Step definitions for the DDW dome features

use crate::world::DdwWorld;
use ascom_alpaca::api::{Device, Dome};
use ascom_alpaca::ASCOMErrorCode;
use cucumber::{given, then, when};
use serial_link::MotionState;

#[given(expr = "the park position is {float} degrees")]
fn park_position(world: &mut DdwWorld, azimuth: f64) {
    world.config.dome.park_azimuth = azimuth;
}

#[given("a connected DDW dome")]
async fn connected_dome(world: &mut DdwWorld) {
    world.build_dome(DdwWorld::standard_controller());
    world.dome().set_connected(true).await.unwrap();
    world.controller().clear_written();
}

#[when(expr = "I slew the dome to {float} degrees")]
async fn slew(world: &mut DdwWorld, azimuth: f64) {
    let result = world.dome().slew_to_azimuth(azimuth).await;
    world.record_error(result);
}

#[when("I park the dome")]
async fn park(world: &mut DdwWorld) {
    let result = world.dome().park().await;
    world.record_error(result);
}

#[when("I open the shutter")]
async fn open_shutter(world: &mut DdwWorld) {
    let result = world.dome().open_shutter().await;
    world.record_error(result);
}

#[when("I abort the slew")]
async fn abort(world: &mut DdwWorld) {
    let result = world.dome().abort_slew().await;
    world.record_error(result);
}

#[when(expr = "I sync the dome to {float} degrees")]
async fn sync(world: &mut DdwWorld, azimuth: f64) {
    let result = world.dome().sync_to_azimuth(azimuth).await;
    world.record_error(result);
}

#[when(expr = "the controller streams {string}")]
fn controller_streams(world: &mut DdwWorld, output: String) {
    world.controller().push_frames(&[output.as_bytes()]);
}

#[when(expr = "the controller finishes at {int} ticks with shutter code {int}")]
fn controller_finishes(world: &mut DdwWorld, ticks: u32, shutter: u32) {
    let packet = format!("V1,400,100,2,{},0,{},0,0\r", ticks, shutter);
    world.controller().push_frames(&[packet.as_bytes()]);
}

#[when(expr = "the controller stops at {int} ticks")]
fn controller_stops_at(world: &mut DdwWorld, ticks: u32) {
    let packet = format!("V1,400,100,2,{},0,1,0,0\r", ticks);
    world.controller().once("GINF", &[packet.as_bytes()]);
}

#[when("I ask whether the dome is slewing")]
async fn ask_slewing(world: &mut DdwWorld) {
    world.slewing_result = Some(world.dome().slewing().await.unwrap());
}

#[then(expr = "the controller should have received {string}")]
fn controller_received(world: &mut DdwWorld, command: String) {
    let written = world.controller().written_text();
    assert!(written.contains(&command), "{} not in {:?}", command, written);
}

#[then("the controller should have received nothing")]
fn controller_received_nothing(world: &mut DdwWorld) {
    assert!(world.controller().written().is_empty());
}

#[then(expr = "it should {word} be slewing")]
fn slewing_is(world: &mut DdwWorld, polarity: String) {
    assert_eq!(world.slewing_result, Some(polarity == "still"));
}

#[then(expr = "the dome azimuth should be {float} degrees")]
async fn azimuth_is(world: &mut DdwWorld, expected: f64) {
    let actual = world.dome().azimuth().await.unwrap();
    assert!((actual - expected).abs() < 1e-6, "dome at {}", actual);
}

#[then("the dome should be parked")]
async fn parked(world: &mut DdwWorld) {
    assert!(world.dome().at_park().await.unwrap());
}

#[then(expr = "the shutter should be {word}")]
async fn shutter_is(world: &mut DdwWorld, expected: String) {
    let status = world.dome().shutter_status().await.unwrap();
    assert_eq!(format!("{:?}", status).to_lowercase(), expected);
}

#[then(expr = "the {word} motion state should be {word}")]
async fn motion_state_is(world: &mut DdwWorld, part: String, expected: String) {
    let actual = if part == "shutter" {
        world.manager().shutter_state().await
    } else {
        world.manager().azimuth_state().await
    };
    let expected = match expected.as_str() {
        "idle" => MotionState::Idle,
        "busy" => MotionState::Busy,
        "ok" => MotionState::Ok,
        "alert" => MotionState::Alert,
        other => panic!("unknown motion state {}", other),
    };
    assert_eq!(actual, expected);
}

#[then("the request should fail with a not implemented error")]
fn not_implemented(world: &mut DdwWorld) {
    assert_eq!(
        world.last_error_code,
        Some(ASCOMErrorCode::NOT_IMPLEMENTED.raw())
    );
}

#[then("the request should fail with an invalid operation error")]
fn invalid_operation(world: &mut DdwWorld) {
    assert_eq!(
        world.last_error_code,
        Some(ASCOMErrorCode::INVALID_OPERATION.raw())
    );
}
