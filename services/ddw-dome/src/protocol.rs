//! Digital Dome Works serial protocol
//!
//! Commands are four bare characters (`GINF`, `GHOM`, `G090`). `GINF` is
//! answered with an info packet: `V` followed by comma separated decimal
//! fields and a carriage return. While the dome moves the controller streams
//! single characters instead: `L`/`R` for the rotation direction, `P` plus
//! four digits for the position in ticks, `O`/`C` for shutter movement. The
//! motion is over when a final info packet arrives.

use serial_link::Framing;

use crate::error::{DdwError, Result};

const MAX_INFO_LEN: usize = 256;

/// Info packets end with a carriage return
pub const INFO_FRAMING: Framing = Framing::Delimited {
    delimiter: b'\r',
    max_len: MAX_INFO_LEN,
};

/// The motion stream is read a byte at a time
pub const STREAM_FRAMING: Framing = Framing::Fixed(1);

/// Fields up to and including the home sensor must be present
const MIN_INFO_FIELDS: usize = 9;
const POSITION_DIGITS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Report status; also stops any movement
    Info,
    /// Rotate to a whole degree azimuth
    GoTo(u16),
    Home,
    OpenShutter,
    CloseShutter,
}

impl Command {
    pub fn encode(&self) -> String {
        match *self {
            Command::Info => "GINF".to_string(),
            Command::GoTo(azimuth) => format!("G{:03}", azimuth),
            Command::Home => "GHOM".to_string(),
            Command::OpenShutter => "GOPN".to_string(),
            Command::CloseShutter => "GCLS".to_string(),
        }
    }
}

/// Shutter state as the driver reports it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutterStatus {
    Open,
    Closed,
    Opening,
    Closing,
    Error,
}

impl ShutterStatus {
    fn from_code(code: u32) -> Self {
        match code {
            1 => ShutterStatus::Closed,
            2 => ShutterStatus::Open,
            _ => ShutterStatus::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    /// Counter-clockwise, seen from below
    Left,
    Right,
}

/// Fields of a `V` info packet this driver uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InfoPacket {
    pub version: u32,
    pub ticks_per_revolution: u32,
    pub home_ticks: u32,
    pub coast: u32,
    pub azimuth_ticks: u32,
    pub slave: bool,
    pub shutter: ShutterStatus,
    pub dsr_status: u32,
    pub home_sensor: u32,
}

impl InfoPacket {
    pub fn azimuth(&self) -> f64 {
        ticks_to_degrees(self.azimuth_ticks, self.ticks_per_revolution)
    }

    pub fn at_home(&self) -> bool {
        self.azimuth_ticks == self.home_ticks
    }
}

/// Parse an info packet, `V` included, carriage return stripped
pub fn parse_info(text: &str) -> Result<InfoPacket> {
    let body = text
        .trim()
        .strip_prefix('V')
        .ok_or_else(|| DdwError::InvalidResponse(format!("Not an info packet: '{}'", text)))?;
    let fields = body
        .split(',')
        .take(MIN_INFO_FIELDS)
        .map(|f| {
            f.trim().parse::<u32>().map_err(|_| {
                DdwError::InvalidResponse(format!("Bad field '{}' in info packet '{}'", f, text))
            })
        })
        .collect::<Result<Vec<u32>>>()?;
    if fields.len() < MIN_INFO_FIELDS {
        return Err(DdwError::InvalidResponse(format!(
            "Info packet has {} fields, expected at least {}: '{}'",
            fields.len(),
            MIN_INFO_FIELDS,
            text
        )));
    }
    if fields[1] == 0 {
        return Err(DdwError::InvalidResponse(
            "Info packet reports zero ticks per revolution".to_string(),
        ));
    }

    Ok(InfoPacket {
        version: fields[0],
        ticks_per_revolution: fields[1],
        home_ticks: fields[2],
        coast: fields[3],
        azimuth_ticks: fields[4],
        slave: fields[5] != 0,
        shutter: ShutterStatus::from_code(fields[6]),
        dsr_status: fields[7],
        home_sensor: fields[8],
    })
}

pub fn ticks_to_degrees(ticks: u32, ticks_per_revolution: u32) -> f64 {
    (f64::from(ticks) * 360.0 / f64::from(ticks_per_revolution)).rem_euclid(360.0)
}

/// Whole degree for a `G` command; 360 becomes 0
pub fn goto_degrees(azimuth: f64) -> Result<u16> {
    if !azimuth.is_finite() || !(0.0..=360.0).contains(&azimuth) {
        return Err(DdwError::InvalidValue(format!(
            "Azimuth {} out of range [0, 360]",
            azimuth
        )));
    }
    Ok((azimuth.round() as u16) % 360)
}

/// Something the controller reported while moving
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Direction(Rotation),
    Position(u32),
    Shutter(ShutterStatus),
    /// The motion is over
    Info(InfoPacket),
    /// An info packet or position that could not be parsed
    Garbled(String),
}

#[derive(Debug, Clone, Default)]
enum ParserState {
    #[default]
    Idle,
    Position(String),
    Info(String),
}

/// Turns the byte stream sent during a motion into [`StreamEvent`]s.
///
/// Bytes may arrive in any chunking; a partial position or info packet is
/// kept until the rest arrives.
#[derive(Debug, Clone, Default)]
pub struct StreamParser {
    state: ParserState,
}

impl StreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, bytes: &[u8]) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        for &byte in bytes {
            if let Some(event) = self.push(byte) {
                events.push(event);
            }
        }
        events
    }

    fn push(&mut self, byte: u8) -> Option<StreamEvent> {
        match &mut self.state {
            ParserState::Idle => match byte {
                b'L' => Some(StreamEvent::Direction(Rotation::Left)),
                b'R' => Some(StreamEvent::Direction(Rotation::Right)),
                b'O' => Some(StreamEvent::Shutter(ShutterStatus::Opening)),
                b'C' => Some(StreamEvent::Shutter(ShutterStatus::Closing)),
                b'P' => {
                    self.state = ParserState::Position(String::new());
                    None
                }
                b'V' => {
                    self.state = ParserState::Info("V".to_string());
                    None
                }
                _ => None,
            },
            ParserState::Position(digits) => {
                digits.push(char::from(byte));
                if digits.len() < POSITION_DIGITS {
                    return None;
                }
                let digits = std::mem::take(digits);
                self.state = ParserState::Idle;
                Some(match digits.parse() {
                    Ok(ticks) => StreamEvent::Position(ticks),
                    Err(_) => StreamEvent::Garbled(format!("P{}", digits)),
                })
            }
            ParserState::Info(packet) => {
                if byte == b'\r' {
                    let packet = std::mem::take(packet);
                    self.state = ParserState::Idle;
                    return Some(match parse_info(&packet) {
                        Ok(info) => StreamEvent::Info(info),
                        Err(_) => StreamEvent::Garbled(packet),
                    });
                }
                if byte != b'\n' {
                    packet.push(char::from(byte));
                }
                if packet.len() > MAX_INFO_LEN {
                    let packet = std::mem::take(packet);
                    self.state = ParserState::Idle;
                    return Some(StreamEvent::Garbled(packet));
                }
                None
            }
        }
    }
}
