//! Tests for the Pyxis protocol module

use proptest::prelude::*;
use pyxis_rotator::protocol::*;
use pyxis_rotator::PyxisError;

// ============================================================================
// Command encoding
// ============================================================================

#[test]
fn test_fixed_commands() {
    assert_eq!(Command::Link.encode(), "CCLINK");
    assert_eq!(Command::Version.encode(), "CVxxxx");
    assert_eq!(Command::GetPositionAngle.encode(), "CGETPA");
    assert_eq!(Command::ReverseStatus.encode(), "CMREAD");
    assert_eq!(Command::Sleep.encode(), "CSLEEP");
    assert_eq!(Command::Wake.encode(), "CWAKEUP");
    assert_eq!(Command::Home.encode(), "CHOMES");
}

#[test]
fn test_setting_commands() {
    assert_eq!(Command::SetReverse(true).encode(), "CD1xxx");
    assert_eq!(Command::SetReverse(false).encode(), "CD0xxx");
    assert_eq!(Command::SetHalfStep(true).encode(), "CZ1xxx");
    assert_eq!(Command::SetHalfStep(false).encode(), "CZ0xxx");
    assert_eq!(Command::SetRate(6).encode(), "CTxx06");
    assert_eq!(Command::SetRate(120).encode(), "CTxx99");
}

#[test]
fn test_goto_is_zero_padded() {
    assert_eq!(Command::GotoPositionAngle(0).encode(), "CPA000");
    assert_eq!(Command::GotoPositionAngle(45).encode(), "CPA045");
    assert_eq!(Command::GotoPositionAngle(359).encode(), "CPA359");
}

// ============================================================================
// Replies
// ============================================================================

#[test]
fn test_ack() {
    assert!(check_ack(Command::Link, b"!").is_ok());
    let err = check_ack(Command::Link, b"?").unwrap_err();
    assert!(matches!(err, PyxisError::NotAcknowledged { ref command, .. } if command == "CCLINK"));
}

#[test]
fn test_position_angle() {
    assert_eq!(parse_position_angle(b"000").unwrap(), 0);
    assert_eq!(parse_position_angle(b"271").unwrap(), 271);
    assert!(parse_position_angle(b"!").is_err());
    assert!(parse_position_angle(b"360").is_err());
    assert!(parse_position_angle(b"x1y").is_err());
}

#[test]
fn test_version() {
    assert_eq!(parse_version(b"3.1").as_deref(), Some("3.1"));
    assert_eq!(parse_version(b"!xx"), None);
    assert_eq!(parse_version(b"   "), None);
}

#[test]
fn test_reverse() {
    assert!(parse_reverse(b"1"));
    assert!(!parse_reverse(b"0"));
}

// ============================================================================
// Models
// ============================================================================

#[test]
fn test_model_from_firmware() {
    assert_eq!(Model::from_firmware("3.1"), Model::ThreeInch);
    assert_eq!(Model::from_firmware("301"), Model::ThreeInch);
    assert_eq!(Model::from_firmware("2.4"), Model::TwoInch);
    assert_eq!(Model::from_firmware("1.0"), Model::TwoInch);
    assert_eq!(Model::from_firmware("abc"), Model::TwoInch);
}

#[test]
fn test_model_parameters() {
    assert_eq!(Model::ThreeInch.progress_per_degree(), 128);
    assert_eq!(Model::TwoInch.progress_per_degree(), 14);
    assert_eq!(Model::ThreeInch.default_rate(), 6);
    assert_eq!(Model::TwoInch.default_rate(), 8);
    assert_eq!(
        Model::TwoInch.progress_framing(),
        serial_link::Framing::Delimited {
            delimiter: b'F',
            max_len: 14
        }
    );
}

// ============================================================================
// Progress and direction
// ============================================================================

#[test]
fn test_classify_progress() {
    assert_eq!(classify_progress(&[b'!'; 14], 14), Progress::Degree);
    assert_eq!(classify_progress(b"!!!F", 14), Progress::Finished);
    assert_eq!(classify_progress(b"F", 14), Progress::Finished);
    assert_eq!(classify_progress(b"!!!", 14), Progress::Partial);
}

#[test]
fn test_travel_direction_avoids_cable_wrap() {
    // Both in the lower half: straight there
    assert_eq!(travel_direction(10, 90), 1);
    assert_eq!(travel_direction(90, 10), -1);
    // Lower half to upper half: back through zero
    assert_eq!(travel_direction(10, 350), -1);
    assert_eq!(travel_direction(170, 190), -1);
    // Both in the upper half: straight there
    assert_eq!(travel_direction(200, 300), 1);
    assert_eq!(travel_direction(300, 200), -1);
    // Upper half to lower half: forward through zero
    assert_eq!(travel_direction(190, 170), 1);
    assert_eq!(travel_direction(350, 10), 1);
}

#[test]
fn test_step_angle_wraps() {
    assert_eq!(step_angle(359, 1), 0);
    assert_eq!(step_angle(0, -1), 359);
    assert_eq!(step_angle(100, -1), 99);
}

#[test]
fn test_normalize_degrees() {
    assert_eq!(normalize_degrees(370.0), 10.0);
    assert_eq!(normalize_degrees(-10.0), 350.0);
    assert_eq!(normalize_degrees(0.0), 0.0);
}

proptest! {
    #[test]
    fn prop_normalized_angles_are_in_range(angle in -10_000.0f64..10_000.0) {
        let normalized = normalize_degrees(angle);
        prop_assert!((0.0..360.0).contains(&normalized));
    }

    #[test]
    fn prop_position_angle_parses_what_goto_sends(angle in 0u16..360) {
        let command = Command::GotoPositionAngle(angle).encode();
        prop_assert_eq!(parse_position_angle(command[3..].as_bytes()).unwrap(), angle);
    }

    #[test]
    fn prop_stepping_never_crosses_180(current in 0u16..360, target in 0u16..360) {
        // Walking in the chosen direction reaches the target without passing 180
        let direction = travel_direction(current, target);
        let mut angle = current;
        let mut steps = 0;
        while angle != target {
            angle = step_angle(angle, direction);
            if angle != target {
                prop_assert!(angle != 180, "{} -> {} crossed 180", current, target);
            }
            steps += 1;
            prop_assert!(steps <= 360);
        }
    }
}
