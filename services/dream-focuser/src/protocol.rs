//! Dream Focuser binary protocol
//!
//! Requests and replies are eight byte frames:
//!
//! ```text
//! 'M' cmd a b c d addr sum
//! ```
//!
//! `sum` is the 8-bit sum of the first seven bytes. Values travel big-endian
//! in `a..d`. A reply carries the command it answers in `cmd`, or `!` for an
//! unknown command and `?` when the focuser saw a bad checksum.

use serial_link::{sum8, verify_sum8, Framing};

use crate::error::{DreamError, Result};

pub const FRAME_LEN: usize = 8;

pub const FRAMING: Framing = Framing::Fixed(FRAME_LEN);

const START: u8 = b'M';

/// Register address holding the maximum position
const MAX_POSITION_ADDR: u8 = 3;

/// Commands understood by the Dream Focuser
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `M`, move to a position; the reply echoes the target
    MoveTo(i32),
    /// `Z`, set the current position; the reply echoes it
    Sync(i32),
    /// `H`, stop
    Halt,
    /// `P`, current position
    Position,
    /// `I`, motion, park and supply flags
    Status,
    /// `W`, whether the position counter is calibrated
    AbsoluteMode,
    /// `T`, temperature and humidity
    Climate,
    /// `G`, drive to the park position
    Park,
    /// `A` on address 3, maximum position
    MaxPosition,
}

impl Command {
    pub fn code(&self) -> u8 {
        match self {
            Command::MoveTo(_) => b'M',
            Command::Sync(_) => b'Z',
            Command::Halt => b'H',
            Command::Position => b'P',
            Command::Status => b'I',
            Command::AbsoluteMode => b'W',
            Command::Climate => b'T',
            Command::Park => b'G',
            Command::MaxPosition => b'A',
        }
    }

    /// Build the request frame
    pub fn encode(&self) -> [u8; FRAME_LEN] {
        let value = match self {
            Command::MoveTo(v) | Command::Sync(v) => *v,
            _ => 0,
        };
        let addr = match self {
            Command::MaxPosition => MAX_POSITION_ADDR,
            _ => 0,
        };
        let [a, b, c, d] = value.to_be_bytes();

        let mut frame = [START, self.code(), a, b, c, d, addr, 0];
        frame[FRAME_LEN - 1] = sum8(&frame[..FRAME_LEN - 1]);
        frame
    }
}

/// A verified reply frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reply {
    pub command: u8,
    pub payload: [u8; 4],
    pub addr: u8,
}

impl Reply {
    /// Payload as a big-endian signed integer
    pub fn value(&self) -> i32 {
        i32::from_be_bytes(self.payload)
    }
}

/// Verify a reply frame and check that it answers `command`
pub fn parse_reply(command: Command, frame: &[u8]) -> Result<Reply> {
    if frame.len() != FRAME_LEN {
        return Err(DreamError::InvalidResponse(format!(
            "Expected {} bytes, got {}",
            FRAME_LEN,
            frame.len()
        )));
    }
    verify_sum8(frame)?;

    let expected = command.code();
    match frame[1] {
        b'!' => Err(DreamError::Rejected {
            command: char::from(expected),
            reason: "unrecognized command",
        }),
        b'?' => Err(DreamError::Rejected {
            command: char::from(expected),
            reason: "bad checksum",
        }),
        actual if actual != expected => Err(DreamError::UnexpectedReply {
            expected: char::from(expected),
            actual: char::from(actual),
        }),
        _ => Ok(Reply {
            command: frame[1],
            payload: [frame[2], frame[3], frame[4], frame[5]],
            addr: frame[6],
        }),
    }
}

/// Park state reported in the status flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParkState {
    #[default]
    Unparked,
    Parking,
    Parked,
}

/// Flags decoded from the status reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceStatus {
    pub moving: bool,
    pub park: ParkState,
    /// Whether the motor supply is at 12V
    pub twelve_volt: bool,
}

impl DeviceStatus {
    pub fn from_reply(reply: &Reply) -> Self {
        let flags = reply.payload[3];
        let park = match (flags >> 3) & 0b11 {
            0 => ParkState::Unparked,
            1 => ParkState::Parking,
            _ => ParkState::Parked,
        };
        Self {
            moving: flags & 0b11 != 0,
            park,
            twelve_volt: (flags >> 5) & 1 == 1,
        }
    }
}

/// Whether the absolute mode reply reports a calibrated position counter
pub fn is_absolute(reply: &Reply) -> bool {
    reply.payload[3] == 1
}

/// Temperature and relative humidity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Climate {
    /// Degrees Celsius
    pub temperature: f64,
    /// Percent
    pub humidity: f64,
}

impl Climate {
    pub fn from_reply(reply: &Reply) -> Self {
        let [a, b, c, d] = reply.payload;
        Self {
            humidity: f64::from(i16::from_be_bytes([a, b])) / 10.0,
            temperature: f64::from(i16::from_be_bytes([c, d])) / 10.0,
        }
    }

    /// Dew point in degrees Celsius
    pub fn dew_point(&self) -> f64 {
        (self.humidity / 100.0).powf(1.0 / 8.0) * (112.0 + 0.9 * self.temperature)
            + 0.1 * self.temperature
            - 112.0
    }
}
