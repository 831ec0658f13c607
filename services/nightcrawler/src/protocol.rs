//! NightCrawler serial command protocol
//!
//! One controller drives a focus motor and a rotator. Motor commands carry the motor number as their first character
//! (`1GP#` reads the focus position). Most setters answer with a single `#`;
//! position queries answer with eight unterminated characters.

use serial_link::Framing;

use crate::error::{NightCrawlerError, Result};

/// Framing of `#` terminated replies
pub const FRAMING: Framing = Framing::Delimited {
    delimiter: b'#',
    max_len: 64,
};

/// Single byte acknowledgements
pub const ACK_FRAMING: Framing = Framing::Fixed(1);

/// Position replies are exactly eight characters
pub const POSITION_FRAMING: Framing = Framing::Fixed(8);

/// Step delays accepted by the controller
pub const MIN_STEP_DELAY: u32 = 7;
pub const MAX_STEP_DELAY: u32 = 100;

/// Unsolicited line that ends a homing run
pub const HOMING_DONE: &str = "OK";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Motor {
    Focus,
    Rotator,
}

impl Motor {
    pub fn number(self) -> u8 {
        match self {
            Motor::Focus => 1,
            Motor::Rotator => 2,
        }
    }

    /// Bit of this motor in a find home request
    pub fn home_bit(self) -> u8 {
        match self {
            Motor::Focus => 0x01,
            Motor::Rotator => 0x02,
        }
    }
}

/// Rotator hardware size, which fixes the rotator's steps per revolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Model {
    Nc25,
    Nc30,
    Nc35,
}

impl Model {
    /// Model from the `PF#` reply. Unknown strings are taken as the 3.5".
    pub fn from_type(reply: &str) -> Self {
        match reply.trim() {
            "2.5 NC" => Model::Nc25,
            "3.0 NC" => Model::Nc30,
            _ => Model::Nc35,
        }
    }

    pub fn steps_per_revolution(self) -> u32 {
        match self {
            Model::Nc25 => 374_920,
            Model::Nc30 => 444_080,
            Model::Nc35 => 505_960,
        }
    }
}

/// Limit switch states from `GS#`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LimitSwitches {
    pub rotation_home: bool,
    pub focus_out: bool,
    pub focus_in: bool,
}

impl LimitSwitches {
    pub fn from_bits(bits: u8) -> Self {
        Self {
            rotation_home: bits & 0x01 != 0,
            focus_out: bits & 0x02 != 0,
            focus_in: bits & 0x04 != 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Firmware,
    FocuserType,
    /// Load a target; answered with one byte of any value
    SetTarget(Motor, i32),
    /// Run to the loaded target
    Start(Motor),
    GetPosition(Motor),
    Sync(Motor, i32),
    Stop(Motor),
    IsMoving(Motor),
    GetStepDelay(Motor),
    SetStepDelay(Motor, u32),
    Temperature,
    Voltage,
    LimitSwitches,
    /// Offset in degrees, sent in tenths; no reply
    TemperatureOffset(f64),
    /// Bitmask of [`Motor::home_bit`] values
    FindHome(u8),
    Encoders(bool),
    DisplayBrightness(u8),
    SleepBrightness(u8),
}

impl Command {
    pub fn encode(&self) -> String {
        match *self {
            Command::Firmware => "PV#".to_string(),
            Command::FocuserType => "PF#".to_string(),
            Command::SetTarget(motor, position) => format!("{}SN {}#", motor.number(), position),
            Command::Start(motor) => format!("{}SM#", motor.number()),
            Command::GetPosition(motor) => format!("{}GP#", motor.number()),
            Command::Sync(motor, position) => format!("{}SP {}#", motor.number(), position),
            Command::Stop(motor) => format!("{}SQ#", motor.number()),
            Command::IsMoving(motor) => format!("{}GM#", motor.number()),
            Command::GetStepDelay(motor) => format!("{}SR#", motor.number()),
            Command::SetStepDelay(motor, delay) => format!("{}SR {:03}#", motor.number(), delay),
            Command::Temperature => "GT#".to_string(),
            Command::Voltage => "GV#".to_string(),
            Command::LimitSwitches => "GS#".to_string(),
            Command::TemperatureOffset(offset) => format!("Pt {:03}#", (offset * 10.0) as i32),
            Command::FindHome(motors) => format!("SH {:02}#", motors),
            Command::Encoders(enabled) => format!("PE {}#", if enabled { "01" } else { "00" }),
            Command::DisplayBrightness(value) => format!("PD {:03}#", value),
            Command::SleepBrightness(value) => format!("PL {:03}#", value),
        }
    }
}

/// Leading decimal integer of a reply, like C's `atoi`
pub fn parse_int(reply: &[u8]) -> Result<i32> {
    let text = String::from_utf8_lossy(reply);
    let text = text.trim().trim_end_matches('#').trim();
    let end = text
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+'))))
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    text[..end]
        .parse()
        .map_err(|_| NightCrawlerError::InvalidResponse(format!("Not a number: '{}'", text)))
}

/// Reply in tenths, as used for temperature and voltage
pub fn parse_tenths(reply: &[u8]) -> Result<f64> {
    Ok(f64::from(parse_int(reply)?) / 10.0)
}

/// `GM` reply, `true` while the motor runs
pub fn parse_moving(reply: &str) -> Result<bool> {
    match reply {
        "01" => Ok(true),
        "00" => Ok(false),
        other => Err(NightCrawlerError::InvalidResponse(format!(
            "Unknown moving flag '{}'",
            other
        ))),
    }
}

pub fn is_ack(frame: &[u8]) -> bool {
    frame.first() == Some(&b'#')
}

pub fn validate_step_delay(delay: u32) -> Result<u32> {
    if (MIN_STEP_DELAY..=MAX_STEP_DELAY).contains(&delay) {
        Ok(delay)
    } else {
        Err(NightCrawlerError::InvalidValue(format!(
            "Step delay {} out of range [{}, {}]",
            delay, MIN_STEP_DELAY, MAX_STEP_DELAY
        )))
    }
}

/// Rotator geometry: tick counts centred on zero, half a turn either way
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotatorGeometry {
    pub steps_per_revolution: u32,
}

impl RotatorGeometry {
    pub fn ticks_per_degree(&self) -> f64 {
        f64::from(self.steps_per_revolution) / 360.0
    }

    /// Largest tick count either side of zero
    pub fn half_range(&self) -> i32 {
        (self.steps_per_revolution / 2) as i32
    }

    /// Ticks for a mechanical angle. Angles past 180 degrees go the short
    /// way round through negative ticks; `reverse` mirrors the direction.
    pub fn ticks_for(&self, angle: f64, reverse: bool) -> i32 {
        let mut signed = if angle > 180.0 { angle - 360.0 } else { angle };
        if reverse {
            signed = -signed;
        }
        let half = f64::from(self.half_range());
        (signed * self.ticks_per_degree()).round().clamp(-half, half) as i32
    }

    /// Angle in `[0, 360)` for a tick count
    pub fn angle_for(&self, ticks: i32, reverse: bool) -> f64 {
        let degrees = f64::from(ticks) / self.ticks_per_degree();
        if reverse {
            range360(360.0 - degrees)
        } else {
            range360(degrees)
        }
    }

    /// Whether a reported count has drifted past a full turn
    pub fn out_of_bounds(&self, ticks: i32) -> bool {
        i64::from(ticks).abs() > i64::from(self.steps_per_revolution)
    }

    /// Equivalent count within one turn
    pub fn wrap(&self, ticks: i32) -> i32 {
        (i64::from(ticks) % i64::from(self.steps_per_revolution)) as i32
    }
}

pub fn range360(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(360.0);
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}
