//! Step definitions for temperature_and_settings.feature

use crate::world::MoonliteWorld;
use ascom_alpaca::api::Focuser;
use cucumber::{then, when};

#[when("I read the focuser temperature")]
async fn read_temperature(world: &mut MoonliteWorld) {
    world.temperature_result = Some(world.device().temperature().await.unwrap());
}

#[when(expr = "I turn temperature compensation {word}")]
async fn set_temp_comp(world: &mut MoonliteWorld, state: String) {
    world.controller().clear_written();
    world
        .device()
        .set_temp_comp(state == "on")
        .await
        .unwrap();
}

#[when(expr = "I set the motor speed to {int}")]
async fn set_speed(world: &mut MoonliteWorld, speed: u8) {
    world.controller().clear_written();
    let result = world.manager().set_speed(speed).await;
    world.last_error = result.err().map(|e| e.to_string());
}

#[then(expr = "the temperature should be {float}")]
fn temperature_is(world: &mut MoonliteWorld, expected: f64) {
    let actual = world.temperature_result.expect("temperature not read");
    assert!((actual - expected).abs() < 1e-9, "got {}", actual);
}

#[then(expr = "temperature compensation should be {word}")]
async fn temp_comp_is(world: &mut MoonliteWorld, state: String) {
    assert_eq!(world.device().temp_comp().await.unwrap(), state == "on");
}

#[then(expr = "the only command sent should be {string}")]
fn only_command(world: &mut MoonliteWorld, command: String) {
    assert_eq!(world.controller().written_text(), vec![command]);
}

#[then("no command should have been sent")]
fn no_command(world: &mut MoonliteWorld) {
    assert!(world.controller().written().is_empty());
}

#[then("the setting should be rejected")]
fn setting_rejected(world: &mut MoonliteWorld) {
    assert!(world.last_error.is_some());
}
