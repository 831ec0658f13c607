//! Pegasus focuser protocol implementation
//!
//! Handles the serial protocol shared by the Pegasus Astro DMFC and FocusCube.
//!
//! Serial Settings: 19200 baud, 8N1, newline-terminated commands and replies.
//!
//! Every command is answered with one line. Only the ping and status replies
//! carry information; the rest are read and discarded.

use serial_link::Framing;

use crate::config::{Model, MotorType};
use crate::error::{PegasusError, Result};

/// Reply framing for every Pegasus command
pub const FRAMING: Framing = Framing::line();

/// Motor speed limits accepted by `S:n`
pub const MIN_SPEED: u16 = 100;
pub const MAX_SPEED: u16 = 1000;

/// Temperature reported when no sensor is plugged in
const NO_SENSOR: f64 = -127.0;

/// Commands that can be sent to a Pegasus focuser
#[derive(Debug, Clone, PartialEq)]
pub enum PegasusCommand {
    /// Ping, returns the device identifier
    Ping,
    /// Full status line
    Status,
    /// Move to an absolute position
    MoveAbsolute(u32),
    /// Move by a signed number of steps
    MoveRelative(i32),
    /// Overwrite the position counter
    Sync(u32),
    Halt,
    /// Maximum motor speed, 100 to 1000
    SetMaxSpeed(u16),
    SetReverse(bool),
    SetLed(bool),
    SetEncoders(bool),
    /// Backlash steps, 0 disables compensation
    SetBacklash(u32),
    /// Select the motor driven by a DMFC
    SetMotorType(MotorType),
}

impl PegasusCommand {
    /// Serialize the command, including the trailing newline
    pub fn to_command_string(&self) -> String {
        let body = match self {
            PegasusCommand::Ping => "#".to_string(),
            PegasusCommand::Status => "A".to_string(),
            PegasusCommand::MoveAbsolute(position) => format!("M:{}", position),
            PegasusCommand::MoveRelative(steps) => format!("G:{}", steps),
            PegasusCommand::Sync(position) => format!("W:{}", position),
            PegasusCommand::Halt => "H".to_string(),
            PegasusCommand::SetMaxSpeed(speed) => format!("S:{}", speed),
            PegasusCommand::SetReverse(on) => format!("N:{}", if *on { 1 } else { 0 }),
            PegasusCommand::SetLed(on) => format!("L:{}", if *on { 2 } else { 1 }),
            PegasusCommand::SetEncoders(on) => format!("E:{}", if *on { 0 } else { 1 }),
            PegasusCommand::SetBacklash(steps) => format!("C:{}", steps),
            PegasusCommand::SetMotorType(motor) => format!(
                "R:{}",
                match motor {
                    MotorType::Stepper => 1,
                    MotorType::Dc => 2,
                }
            ),
        };
        body + "\n"
    }
}

impl Model {
    /// Identifiers a controller of this model answers a ping with
    pub fn identifiers(&self) -> &'static [&'static str] {
        match self {
            Model::Dmfc => &["OK_DMFCN", "OK_SMFC", "OK_PRDG"],
            Model::FocusCube => &["OK_FC"],
        }
    }

    fn identifies(&self, token: &str) -> bool {
        self.identifiers().iter().any(|id| token.contains(id))
    }
}

/// Parsed status response from the `A` command
///
/// Response format: `ID:version:motor:temp:position:moving:led:reverse:encoders:backlash`
#[derive(Debug, Clone, PartialEq)]
pub struct FocuserStatus {
    pub firmware: String,
    /// Motor type reported by a DMFC; FocusCube always drives a stepper
    pub motor: Option<MotorType>,
    /// Temperature in degrees Celsius, `None` without a sensor
    pub temperature: Option<f64>,
    pub position: i32,
    pub moving: bool,
    pub led: bool,
    pub reverse: bool,
    pub encoders: bool,
    pub backlash: u32,
}

/// Validate a ping response against the configured model
pub fn validate_ping_response(model: Model, response: &str) -> Result<()> {
    let response = response.trim();
    if model.identifies(response) {
        Ok(())
    } else {
        Err(PegasusError::WrongDevice(format!(
            "Expected one of {:?}, got: {}",
            model.identifiers(),
            response
        )))
    }
}

/// Parse a status line
pub fn parse_status_response(model: Model, response: &str) -> Result<FocuserStatus> {
    // firmware 2.8 terminates lines with \r\n
    let response = response.trim();
    let parts: Vec<&str> = response.split(':').collect();

    if !model.identifies(parts[0]) {
        return Err(PegasusError::InvalidResponse(format!(
            "Invalid status response: {}",
            response
        )));
    }
    if parts.len() < 10 {
        return Err(PegasusError::InvalidResponse(format!(
            "Expected 10 fields in status response, got {}: {}",
            parts.len(),
            response
        )));
    }

    let motor = match (model, parts[2]) {
        (Model::FocusCube, _) => None,
        (Model::Dmfc, "1") => Some(MotorType::Stepper),
        (Model::Dmfc, "0") => Some(MotorType::Dc),
        (Model::Dmfc, _) => None,
    };

    let temperature = parse_f64(parts[3], "temperature")?;

    Ok(FocuserStatus {
        firmware: parts[1].to_string(),
        motor,
        temperature: (temperature != NO_SENSOR).then_some(temperature),
        position: parse_i32(parts[4], "position")?,
        moving: parts[5].starts_with('1'),
        led: parse_bool(parts[6], "led")?,
        reverse: parse_bool(parts[7], "reverse")?,
        // 0 means the encoders are enabled
        encoders: !parse_bool(parts[8], "encoders")?,
        backlash: parse_u32(parts[9], "backlash")?,
    })
}

// Helper parsing functions
fn parse_f64(s: &str, field: &str) -> Result<f64> {
    s.parse::<f64>()
        .map_err(|_| PegasusError::ParseError(format!("Invalid {} value: {}", field, s)))
}

fn parse_i32(s: &str, field: &str) -> Result<i32> {
    s.parse::<i32>()
        .map_err(|_| PegasusError::ParseError(format!("Invalid {} value: {}", field, s)))
}

fn parse_u32(s: &str, field: &str) -> Result<u32> {
    s.parse::<u32>()
        .map_err(|_| PegasusError::ParseError(format!("Invalid {} value: {}", field, s)))
}

fn parse_bool(s: &str, field: &str) -> Result<bool> {
    match s {
        "0" => Ok(false),
        "1" => Ok(true),
        _ => Err(PegasusError::ParseError(format!(
            "Invalid {} boolean value: {}",
            field, s
        ))),
    }
}
