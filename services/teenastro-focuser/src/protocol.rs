//! TeenAstro focuser serial protocol
//!
//! LX200 style commands (`:F?#`). Queries answer with a leading marker
//! character, space separated decimal fields and a closing `#`. Configuration
//! writes (`:F<item>,<value>#`) and sync answer with a single `1` or `0`.

use serial_link::Framing;

use crate::error::{Result, TeenAstroError};

/// Framing of text replies
pub const FRAMING: Framing = Framing::Delimited {
    delimiter: b'#',
    max_len: 128,
};

/// Framing of single byte acknowledgements
pub const ACK_FRAMING: Framing = Framing::Fixed(1);

/// Every version reply starts with this
pub const VERSION_PREFIX: &str = "$ TeenAstro Focuser ";

/// Writable controller settings and their wire identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigItem {
    ParkPosition,
    MaxPosition,
    ManualSpeed,
    GoToSpeed,
    GoToAcceleration,
    ManualAcceleration,
    ManualDeceleration,
    Invert,
    Resolution,
    /// Sent as log2 of the microstep count
    Microsteps,
    /// Sent in units of 10 mA
    CurrentMilliamps,
    StepsPerRevolution,
}

impl ConfigItem {
    pub fn id(self) -> char {
        match self {
            ConfigItem::ParkPosition => '0',
            ConfigItem::MaxPosition => '1',
            ConfigItem::ManualSpeed => '2',
            ConfigItem::GoToSpeed => '3',
            ConfigItem::GoToAcceleration => '4',
            ConfigItem::ManualAcceleration => '5',
            ConfigItem::ManualDeceleration => '6',
            ConfigItem::Invert => '7',
            ConfigItem::Resolution => '8',
            ConfigItem::Microsteps => 'm',
            ConfigItem::CurrentMilliamps => 'c',
            ConfigItem::StepsPerRevolution => 'r',
        }
    }

    /// Accepted range in user units
    pub fn range(self) -> (u32, u32) {
        match self {
            ConfigItem::ParkPosition | ConfigItem::MaxPosition => (0, 100_000),
            ConfigItem::ManualSpeed
            | ConfigItem::GoToSpeed
            | ConfigItem::GoToAcceleration
            | ConfigItem::ManualAcceleration
            | ConfigItem::ManualDeceleration
            | ConfigItem::Resolution => (1, 1000),
            ConfigItem::Invert => (0, 1),
            ConfigItem::Microsteps => (1, 512),
            ConfigItem::CurrentMilliamps => (10, 10_000),
            ConfigItem::StepsPerRevolution => (1, 800),
        }
    }

    /// Check `value` and convert it to what goes on the wire
    pub fn wire_value(self, value: u32) -> Result<u32> {
        let (min, max) = self.range();
        if !(min..=max).contains(&value) {
            return Err(TeenAstroError::InvalidValue(format!(
                "{:?} {} out of range [{}, {}]",
                self, value, min, max
            )));
        }
        Ok(match self {
            ConfigItem::Microsteps => {
                if !value.is_power_of_two() {
                    return Err(TeenAstroError::InvalidValue(format!(
                        "Microsteps {} is not a power of two",
                        value
                    )));
                }
                value.ilog2()
            }
            ConfigItem::CurrentMilliamps => value / 10,
            _ => value,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `:FV#`, firmware identification
    Version,
    /// `:F?#`, position, speed and temperature
    State,
    /// `:F~#`, motion settings
    Settings,
    /// `:FM#`, motor settings
    Motor,
    /// `:F<item>,<value>#`
    Set(ConfigItem, u32),
    /// `:FG,<position>#`, no reply
    GoTo(u32),
    /// `:FP#`, move to the park position, no reply
    Park,
    /// `:FQ#`, no reply
    Stop,
    /// `:FS#`, make the current position zero
    SyncZero,
}

impl Command {
    /// Wire form. `Set` carries the wire value, see [`ConfigItem::wire_value`].
    pub fn encode(&self) -> String {
        match *self {
            Command::Version => ":FV#".to_string(),
            Command::State => ":F?#".to_string(),
            Command::Settings => ":F~#".to_string(),
            Command::Motor => ":FM#".to_string(),
            Command::Set(item, value) => format!(":F{},{}#", item.id(), value),
            Command::GoTo(position) => format!(":FG,{}#", position),
            Command::Park => ":FP#".to_string(),
            Command::Stop => ":FQ#".to_string(),
            Command::SyncZero => ":FS#".to_string(),
        }
    }

    /// Leading character of this query's reply
    pub fn marker(&self) -> Option<char> {
        match self {
            Command::Version => Some('$'),
            Command::State => Some('?'),
            Command::Settings => Some('~'),
            Command::Motor => Some('M'),
            _ => None,
        }
    }

    pub fn accepts(&self, frame: &[u8]) -> bool {
        self.marker().is_some_and(|marker| {
            FRAMING.is_terminated(frame) && frame.first() == Some(&(marker as u8))
        })
    }
}

/// Reply to `:F?#`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FocuserStatus {
    pub position: u32,
    /// Current motor speed, 0 when stopped
    pub speed: u32,
    pub temperature: f64,
}

/// Reply to `:F~#`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionSettings {
    pub park_position: u32,
    pub max_position: u32,
    pub manual_speed: u32,
    pub goto_speed: u32,
    pub goto_acceleration: u32,
    pub manual_acceleration: u32,
    pub manual_deceleration: u32,
}

/// Reply to `:FM#`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotorSettings {
    pub invert: bool,
    pub microsteps: u32,
    pub resolution: u32,
    pub current_ma: u32,
    pub steps_per_revolution: u32,
}

fn fields<'a>(reply: &'a str, marker: char, count: usize) -> Result<Vec<&'a str>> {
    let body = reply
        .strip_prefix(marker)
        .ok_or_else(|| {
            TeenAstroError::InvalidResponse(format!("Expected '{}' reply, got '{}'", marker, reply))
        })?;
    let fields: Vec<&str> = body.split_whitespace().collect();
    if fields.len() != count {
        return Err(TeenAstroError::InvalidResponse(format!(
            "Expected {} fields in '{}'",
            count, reply
        )));
    }
    Ok(fields)
}

fn number<T: std::str::FromStr>(field: &str, reply: &str) -> Result<T> {
    field.parse().map_err(|_| {
        TeenAstroError::InvalidResponse(format!("Bad field '{}' in '{}'", field, reply))
    })
}

/// Firmware version from a `:FV#` reply payload
pub fn parse_version(reply: &str) -> Result<String> {
    // Payloads are trimmed, so restore the separator the prefix ends with
    let padded = format!("{} ", reply);
    padded
        .strip_prefix(VERSION_PREFIX)
        .map(|version| version.trim().to_string())
        .ok_or_else(|| TeenAstroError::NotTeenAstro(reply.to_string()))
}

pub fn parse_status(reply: &str) -> Result<FocuserStatus> {
    let f = fields(reply, '?', 3)?;
    Ok(FocuserStatus {
        position: number(f[0], reply)?,
        speed: number(f[1], reply)?,
        temperature: number(f[2], reply)?,
    })
}

pub fn parse_motion_settings(reply: &str) -> Result<MotionSettings> {
    let f = fields(reply, '~', 7)?;
    Ok(MotionSettings {
        park_position: number(f[0], reply)?,
        max_position: number(f[1], reply)?,
        manual_speed: number(f[2], reply)?,
        goto_speed: number(f[3], reply)?,
        goto_acceleration: number(f[4], reply)?,
        manual_acceleration: number(f[5], reply)?,
        manual_deceleration: number(f[6], reply)?,
    })
}

pub fn parse_motor_settings(reply: &str) -> Result<MotorSettings> {
    let f = fields(reply, 'M', 5)?;
    let log2_microsteps: u32 = number(f[1], reply)?;
    let microsteps = 1u32.checked_shl(log2_microsteps).ok_or_else(|| {
        TeenAstroError::InvalidResponse(format!("Microstep exponent {} too large", log2_microsteps))
    })?;
    Ok(MotorSettings {
        invert: number::<u32>(f[0], reply)? != 0,
        microsteps,
        resolution: number(f[2], reply)?,
        current_ma: number::<u32>(f[3], reply)? * 10,
        steps_per_revolution: number(f[4], reply)?,
    })
}

/// `true` for a `1` acknowledgement
pub fn parse_ack(frame: &[u8]) -> bool {
    frame.first() == Some(&b'1')
}
