//! MoonLite serial command protocol
//!
//! Commands are ASCII strings of the form `:XX...#`. Queries answer with
//! upper-case hex digits terminated by `#`; setters do not answer at all.

use serial_link::Framing;

use crate::error::{MoonliteError, Result};

/// Highest position encodable in the four hex digits of `:SN`/`:SP`
pub const MAX_POSITION: u32 = 0xFFFF;

/// Fastest and slowest motor speed settings
pub const MIN_SPEED: u8 = 1;
pub const MAX_SPEED: u8 = 5;

/// Reply framing for every MoonLite query
pub const FRAMING: Framing = Framing::hash();

/// Commands understood by MoonLite controllers
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// `:GP#`, current position
    GetPosition,
    /// `:C#`, start a temperature conversion
    ConvertTemperature,
    /// `:GT#`, last converted temperature
    GetTemperature,
    /// `:GD#`, motor speed as a power of two
    GetSpeed,
    /// `:GH#`, `FF` for half stepping, `00` for full
    GetStepMode,
    /// `:GI#`, `01` while the motor runs
    IsMoving,
    /// `:SN`, load a new target position
    SetTarget { position: u16 },
    /// `:FG#`, move to the loaded target
    Go,
    /// `:FQ#`, stop immediately
    Stop,
    /// `:SP`, overwrite the current position counter
    Sync { position: u16 },
    /// `:SD`, motor speed 1..=5
    SetSpeed { speed: u8 },
    /// `:SH#` / `:SF#`
    SetStepMode { half_step: bool },
    /// `:+#` / `:-#`
    SetTempComp { enabled: bool },
    /// `:PO`, temperature offset in degrees
    SetTempCalibration { offset: f64 },
    /// `:SC`, temperature compensation coefficient
    SetTempCoefficient { coefficient: f64 },
}

impl Command {
    /// Wire representation of the command
    pub fn encode(&self) -> String {
        match self {
            Command::GetPosition => ":GP#".to_string(),
            Command::ConvertTemperature => ":C#".to_string(),
            Command::GetTemperature => ":GT#".to_string(),
            Command::GetSpeed => ":GD#".to_string(),
            Command::GetStepMode => ":GH#".to_string(),
            Command::IsMoving => ":GI#".to_string(),
            Command::SetTarget { position } => format!(":SN{:04X}#", position),
            Command::Go => ":FG#".to_string(),
            Command::Stop => ":FQ#".to_string(),
            Command::Sync { position } => format!(":SP{:04X}#", position),
            Command::SetSpeed { speed } => format!(":SD{:02X}#", 1u16 << (speed & 0x07)),
            Command::SetStepMode { half_step: true } => ":SH#".to_string(),
            Command::SetStepMode { half_step: false } => ":SF#".to_string(),
            Command::SetTempComp { enabled: true } => ":+#".to_string(),
            Command::SetTempComp { enabled: false } => ":-#".to_string(),
            Command::SetTempCalibration { offset } => {
                format!(":PO{:02X}#", half_units_byte(*offset))
            }
            Command::SetTempCoefficient { coefficient } => {
                format!(":SC{:02X}#", half_units_byte(*coefficient))
            }
        }
    }

    /// Number of hex digits in the reply, or `None` for commands without a reply
    pub fn reply_digits(&self) -> Option<usize> {
        match self {
            Command::GetPosition | Command::GetTemperature => Some(4),
            Command::GetSpeed | Command::GetStepMode | Command::IsMoving => Some(2),
            _ => None,
        }
    }

    /// Whether `frame` has the shape of this command's reply
    pub fn accepts(&self, frame: &[u8]) -> bool {
        self.reply_digits()
            .is_some_and(|digits| frame.len() == digits + 1 && FRAMING.is_terminated(frame))
    }
}

/// Values are sent in half-unit steps as a single two's complement byte
fn half_units_byte(value: f64) -> u8 {
    ((value * 2.0) as i32 & 0xFF) as u8
}

fn parse_hex(payload: &str, what: &str) -> Result<u16> {
    u16::from_str_radix(payload, 16)
        .map_err(|e| MoonliteError::ParseError(format!("Invalid {} '{}': {}", what, payload, e)))
}

/// Parse a `:GP#` reply payload
pub fn parse_position(payload: &str) -> Result<u16> {
    parse_hex(payload, "position")
}

/// Parse a `:GT#` reply payload into degrees Celsius
pub fn parse_temperature(payload: &str) -> Result<f64> {
    let raw = parse_hex(payload, "temperature")? as i16;
    Ok(f64::from(raw) / 2.0)
}

/// Parse a `:GD#` reply payload into a speed setting
pub fn parse_speed(payload: &str) -> Result<u8> {
    let raw = parse_hex(payload, "speed")?;
    if raw == 0 {
        return Err(MoonliteError::InvalidResponse(format!(
            "Speed value '{}' has no bit set",
            payload
        )));
    }
    Ok(raw.ilog2() as u8)
}

/// Parse a `:GH#` reply payload, `true` for half stepping
pub fn parse_step_mode(payload: &str) -> Result<bool> {
    match payload {
        "FF" => Ok(true),
        "00" => Ok(false),
        other => Err(MoonliteError::InvalidResponse(format!(
            "Unknown step mode '{}'",
            other
        ))),
    }
}

/// Parse a `:GI#` reply payload
pub fn parse_moving(payload: &str) -> Result<bool> {
    match payload {
        "01" => Ok(true),
        "00" => Ok(false),
        other => Err(MoonliteError::InvalidResponse(format!(
            "Unknown moving flag '{}'",
            other
        ))),
    }
}
