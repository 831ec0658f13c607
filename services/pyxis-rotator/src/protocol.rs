//! Optec Pyxis command protocol
//!
//! Commands are six ASCII characters with no terminator. Replies have no
//! terminator either, so every query knows how many bytes to read. Moves and
//! homing answer with a stream of `!` bytes, one batch per degree travelled,
//! followed by a single `F` once the rotator stops.

use serial_link::Framing;

use crate::error::{PyxisError, Result};

/// Positive acknowledgement, also the progress marker while moving
pub const ACK: u8 = b'!';

/// End of a move or homing run
pub const FINISHED: u8 = b'F';

pub const MAX_ROTATION_RATE: u8 = 99;

/// Framing for single byte replies
pub const BYTE_FRAMING: Framing = Framing::Fixed(1);

/// Framing for the three character version and angle replies
pub const TRIPLET_FRAMING: Framing = Framing::Fixed(3);

/// Rotator model, told apart by its firmware version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Model {
    TwoInch,
    ThreeInch,
}

impl Model {
    /// Firmware 3 and later belongs to the 3-inch rotator
    pub fn from_firmware(firmware: &str) -> Self {
        let numeric: String = firmware
            .trim()
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        let version = numeric.parse::<f64>().unwrap_or_default();
        if version >= 3.0 {
            Model::ThreeInch
        } else {
            Model::TwoInch
        }
    }

    /// Progress bytes sent per degree of travel
    pub fn progress_per_degree(self) -> usize {
        match self {
            Model::TwoInch => 14,
            Model::ThreeInch => 128,
        }
    }

    /// Recommended rotation rate
    pub fn default_rate(self) -> u8 {
        match self {
            Model::TwoInch => 8,
            Model::ThreeInch => 6,
        }
    }

    /// Framing for one degree of progress: a full batch, or anything up to `F`
    pub fn progress_framing(self) -> Framing {
        Framing::Delimited {
            delimiter: FINISHED,
            max_len: self.progress_per_degree(),
        }
    }
}

/// Commands understood by the Pyxis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Answers `!`
    Link,
    /// Answers three version characters
    Version,
    /// Answers the position angle as three digits, or `!` on error
    GetPositionAngle,
    /// Answers `1` when reversed
    ReverseStatus,
    /// No answer
    SetReverse(bool),
    /// No answer
    SetHalfStep(bool),
    /// Answers `!`
    SetRate(u8),
    /// No answer
    Sleep,
    /// Answers `!`
    Wake,
    /// Answers with a progress stream
    Home,
    /// Answers with a progress stream
    GotoPositionAngle(u16),
}

impl Command {
    pub fn encode(&self) -> String {
        match self {
            Command::Link => "CCLINK".to_string(),
            Command::Version => "CVxxxx".to_string(),
            Command::GetPositionAngle => "CGETPA".to_string(),
            Command::ReverseStatus => "CMREAD".to_string(),
            Command::SetReverse(reverse) => format!("CD{}xxx", u8::from(*reverse)),
            Command::SetHalfStep(half) => format!("CZ{}xxx", u8::from(*half)),
            Command::SetRate(rate) => format!("CTxx{:02}", (*rate).min(MAX_ROTATION_RATE)),
            Command::Sleep => "CSLEEP".to_string(),
            Command::Wake => "CWAKEUP".to_string(),
            Command::Home => "CHOMES".to_string(),
            Command::GotoPositionAngle(angle) => format!("CPA{:03}", angle % 360),
        }
    }
}

/// Check a single byte acknowledgement
pub fn check_ack(command: Command, reply: &[u8]) -> Result<()> {
    if reply == [ACK] {
        Ok(())
    } else {
        Err(PyxisError::NotAcknowledged {
            command: command.encode(),
            reply: String::from_utf8_lossy(reply).into_owned(),
        })
    }
}

/// Parse the three digit position angle reply
pub fn parse_position_angle(reply: &[u8]) -> Result<u16> {
    if reply.first() == Some(&ACK) {
        return Err(PyxisError::InvalidResponse(
            "Rotator reported an error reading the position angle".to_string(),
        ));
    }
    let text = std::str::from_utf8(reply)
        .map_err(|_| PyxisError::InvalidResponse(format!("Non-ASCII angle {:02x?}", reply)))?;
    let angle: u16 = text
        .trim()
        .parse()
        .map_err(|_| PyxisError::InvalidResponse(format!("Invalid angle '{}'", text)))?;
    if angle >= 360 {
        return Err(PyxisError::InvalidResponse(format!(
            "Angle {} out of range",
            angle
        )));
    }
    Ok(angle)
}

/// Parse the firmware version reply; `!` means the rotator has none to report
pub fn parse_version(reply: &[u8]) -> Option<String> {
    if reply.first() == Some(&ACK) {
        return None;
    }
    let version = String::from_utf8_lossy(reply).trim().to_string();
    (!version.is_empty()).then_some(version)
}

pub fn parse_reverse(reply: &[u8]) -> bool {
    reply.first() == Some(&b'1')
}

/// What one read of the progress stream means
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// A full batch arrived: one more degree travelled
    Degree,
    /// The rotator stopped
    Finished,
    /// Fewer bytes than a batch, without `F`
    Partial,
}

pub fn classify_progress(frame: &[u8], per_degree: usize) -> Progress {
    if frame.contains(&FINISHED) {
        Progress::Finished
    } else if frame.len() >= per_degree {
        Progress::Degree
    } else {
        Progress::Partial
    }
}

/// Direction of travel from `current` to `target` in whole degrees.
///
/// The rotator never passes through 180 degrees, which keeps the cable from
/// wrapping, so it may take the long way round.
pub fn travel_direction(current: u16, target: u16) -> i16 {
    let towards = if target >= current { 1 } else { -1 };
    match (current <= 180, target < 180) {
        (true, true) => towards,
        (true, false) if target == 180 => towards,
        (true, false) => -1,
        (false, false) => towards,
        (false, true) => 1,
    }
}

/// Step an angle by one degree, wrapping around 0/360
pub fn step_angle(angle: u16, direction: i16) -> u16 {
    (i32::from(angle) + i32::from(direction)).rem_euclid(360) as u16
}

/// Normalise any angle in degrees to `[0, 360)`
pub fn normalize_degrees(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(360.0);
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}
