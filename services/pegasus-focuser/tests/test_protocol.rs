//! Protocol tests for the Pegasus focuser driver

use pegasus_focuser::protocol::{
    parse_status_response, validate_ping_response, PegasusCommand, FRAMING,
};
use pegasus_focuser::{Model, MotorType, PegasusError};
use proptest::prelude::*;

// ============================================================================
// Command encoding
// ============================================================================

#[test]
fn test_command_strings() {
    let cases = [
        (PegasusCommand::Ping, "#\n"),
        (PegasusCommand::Status, "A\n"),
        (PegasusCommand::MoveAbsolute(25_000), "M:25000\n"),
        (PegasusCommand::MoveRelative(-300), "G:-300\n"),
        (PegasusCommand::Sync(0), "W:0\n"),
        (PegasusCommand::Halt, "H\n"),
        (PegasusCommand::SetMaxSpeed(400), "S:400\n"),
        (PegasusCommand::SetReverse(true), "N:1\n"),
        (PegasusCommand::SetReverse(false), "N:0\n"),
        (PegasusCommand::SetLed(true), "L:2\n"),
        (PegasusCommand::SetLed(false), "L:1\n"),
        (PegasusCommand::SetEncoders(true), "E:0\n"),
        (PegasusCommand::SetEncoders(false), "E:1\n"),
        (PegasusCommand::SetBacklash(35), "C:35\n"),
        (PegasusCommand::SetMotorType(MotorType::Stepper), "R:1\n"),
        (PegasusCommand::SetMotorType(MotorType::Dc), "R:2\n"),
    ];
    for (command, expected) in cases {
        assert_eq!(command.to_command_string(), expected, "{:?}", command);
    }
}

#[test]
fn test_replies_are_newline_framed() {
    assert!(FRAMING.is_terminated(b"OK_FC\n"));
    assert_eq!(FRAMING.text(b"OK_FC\r\n"), "OK_FC");
}

// ============================================================================
// Ping
// ============================================================================

#[test]
fn test_ping_accepts_dmfc_identifiers() {
    for id in ["OK_DMFCN", "OK_SMFC", "OK_PRDG"] {
        assert!(validate_ping_response(Model::Dmfc, id).is_ok(), "{}", id);
    }
}

#[test]
fn test_ping_accepts_focuscube() {
    assert!(validate_ping_response(Model::FocusCube, "OK_FC\r").is_ok());
}

#[test]
fn test_ping_rejects_other_model() {
    assert!(matches!(
        validate_ping_response(Model::FocusCube, "OK_DMFCN"),
        Err(PegasusError::WrongDevice(_))
    ));
    assert!(matches!(
        validate_ping_response(Model::Dmfc, "PPBA_OK"),
        Err(PegasusError::WrongDevice(_))
    ));
}

// ============================================================================
// Status
// ============================================================================

#[test]
fn test_parse_dmfc_status() {
    let status =
        parse_status_response(Model::Dmfc, "OK_DMFCN:3.4:1:21.30:12345:0:1:0:1:25").unwrap();
    assert_eq!(status.firmware, "3.4");
    assert_eq!(status.motor, Some(MotorType::Stepper));
    assert_eq!(status.temperature, Some(21.3));
    assert_eq!(status.position, 12345);
    assert!(!status.moving);
    assert!(status.led);
    assert!(!status.reverse);
    assert!(!status.encoders);
    assert_eq!(status.backlash, 25);
}

#[test]
fn test_parse_dc_motor_and_moving() {
    let status = parse_status_response(Model::Dmfc, "OK_SMFC:2.8:0:5.0:-40:1:0:1:0:0").unwrap();
    assert_eq!(status.motor, Some(MotorType::Dc));
    assert_eq!(status.position, -40);
    assert!(status.moving);
    assert!(status.reverse);
    assert!(status.encoders);
}

#[test]
fn test_parse_status_without_sensor() {
    let status = parse_status_response(Model::Dmfc, "OK_DMFCN:3.4:1:-127.00:0:0:1:0:0:0").unwrap();
    assert_eq!(status.temperature, None);
}

#[test]
fn test_parse_status_tolerates_carriage_return() {
    let status =
        parse_status_response(Model::Dmfc, "OK_DMFCN:2.8:1:18.5:100:0:1:0:0:0\r").unwrap();
    assert_eq!(status.backlash, 0);
}

#[test]
fn test_focuscube_ignores_motor_field() {
    let status = parse_status_response(Model::FocusCube, "OK_FC:1.2:0:18.5:100:0:1:0:0:0").unwrap();
    assert_eq!(status.motor, None);
}

#[test]
fn test_parse_status_wrong_prefix() {
    assert!(matches!(
        parse_status_response(Model::FocusCube, "OK_DMFCN:3.4:1:21.3:0:0:1:0:0:0"),
        Err(PegasusError::InvalidResponse(_))
    ));
}

#[test]
fn test_parse_status_too_short() {
    assert!(matches!(
        parse_status_response(Model::Dmfc, "OK_DMFCN:3.4:1:21.3"),
        Err(PegasusError::InvalidResponse(_))
    ));
}

#[test]
fn test_parse_status_bad_number() {
    assert!(matches!(
        parse_status_response(Model::Dmfc, "OK_DMFCN:3.4:1:warm:0:0:1:0:0:0"),
        Err(PegasusError::ParseError(_))
    ));
}

proptest! {
    #[test]
    fn test_status_position_parsed(position in -100_000i32..=100_000) {
        let line = format!("OK_DMFCN:3.4:1:20.0:{}:0:1:0:0:0", position);
        let status = parse_status_response(Model::Dmfc, &line).unwrap();
        prop_assert_eq!(status.position, position);
    }
}
