//! Lacerta MFOC serial command protocol
//!
//! Commands look like `": M 12000 #"`: a colon, a one letter opcode, an
//! optional decimal argument and a closing `#`, all space separated. Setters
//! are silent. Queries answer with a carriage return terminated line holding
//! a type letter and a decimal value, e.g. `"P 12000\r"`.
//!
//! The controller sometimes emits lines nobody asked for, so readers keep
//! reading until a line of the expected type shows up.

use serde::{Deserialize, Serialize};
use serial_link::Framing;

use crate::error::{LacertaError, Result};

/// Reply framing: carriage return terminated lines
pub const FRAMING: Framing = Framing::Delimited {
    delimiter: b'\r',
    max_len: 32,
};

pub const MAX_BACKLASH: u8 = 255;
pub const MIN_TEMP_COMP: i32 = -5000;
pub const MAX_TEMP_COMP: i32 = 5000;
pub const MIN_MAX_POSITION: u32 = 300;
pub const MAX_MAX_POSITION: u32 = 250_000;

/// Which moves the controller compensates for temperature drift
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TempDirection {
    Both,
    In,
    Out,
}

impl TempDirection {
    fn code(self) -> i32 {
        match self {
            TempDirection::Both => 0,
            TempDirection::In => 1,
            TempDirection::Out => 2,
        }
    }

    pub fn from_code(code: i32) -> Result<Self> {
        match code {
            0 => Ok(TempDirection::Both),
            1 => Ok(TempDirection::In),
            2 => Ok(TempDirection::Out),
            other => Err(LacertaError::InvalidResponse(format!(
                "Unknown temperature direction {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `Q`, current position
    GetPosition,
    /// `M`, move to an absolute position
    MoveTo(u32),
    /// `I`, temperature compensation direction
    SetTempDirection(TempDirection),
    /// `W`, read back the direction
    GetTempDirection,
    /// `F`, start at the position saved on power off
    SetStartAtSaved(bool),
    /// `N`, read back the start mode
    GetStartAtSaved,
    /// `B`, backlash steps
    SetBacklash(u8),
    /// `J`, read back the backlash
    GetBacklash,
    /// `D`, temperature compensation steps per degree, 0 disables
    SetTempComp(i32),
    /// `U`, read back the compensation
    GetTempComp,
    /// `G`, highest reachable position
    SetMaxPosition(u32),
    /// `O`, read back the highest position
    GetMaxPosition,
}

impl Command {
    pub fn encode(&self) -> String {
        match *self {
            Command::GetPosition => ": Q #".to_string(),
            Command::MoveTo(position) => format!(": M {} #", position),
            Command::SetTempDirection(direction) => format!(": I {} #", direction.code()),
            Command::GetTempDirection => ": W #".to_string(),
            Command::SetStartAtSaved(enabled) => format!(": F {} #", u8::from(enabled)),
            Command::GetStartAtSaved => ": N #".to_string(),
            Command::SetBacklash(steps) => format!(": B {} #", steps),
            Command::GetBacklash => ": J #".to_string(),
            Command::SetTempComp(steps) => format!(": D {} #", steps),
            Command::GetTempComp => ": U #".to_string(),
            Command::SetMaxPosition(position) => format!(": G {} #", position),
            Command::GetMaxPosition => ": O #".to_string(),
        }
    }

    /// The query that reads back what this setter wrote
    pub fn read_back(&self) -> Option<Command> {
        match self {
            Command::SetTempDirection(_) => Some(Command::GetTempDirection),
            Command::SetStartAtSaved(_) => Some(Command::GetStartAtSaved),
            Command::SetBacklash(_) => Some(Command::GetBacklash),
            Command::SetTempComp(_) => Some(Command::GetTempComp),
            Command::SetMaxPosition(_) => Some(Command::GetMaxPosition),
            _ => None,
        }
    }

    /// Value a setter writes, as the controller reports it back
    pub fn written_value(&self) -> Option<i32> {
        match *self {
            Command::SetTempDirection(direction) => Some(direction.code()),
            Command::SetStartAtSaved(enabled) => Some(i32::from(enabled)),
            Command::SetBacklash(steps) => Some(i32::from(steps)),
            Command::SetTempComp(steps) => Some(steps),
            Command::SetMaxPosition(position) => i32::try_from(position).ok(),
            _ => None,
        }
    }

    /// Whether `frame` answers this query.
    ///
    /// Position replies must carry the `P` type; read backs take any well
    /// formed line that is not a position report.
    pub fn accepts(&self, frame: &[u8]) -> bool {
        match parse_reply(&FRAMING.text(frame)) {
            Ok(reply) if *self == Command::GetPosition => reply.kind == 'P',
            Ok(reply) => reply.kind != 'P',
            Err(_) => false,
        }
    }
}

/// One `"<type> <value>"` reply line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reply {
    pub kind: char,
    pub value: i32,
}

pub fn parse_reply(line: &str) -> Result<Reply> {
    let mut parts = line.split_whitespace();
    let kind = parts
        .next()
        .and_then(|word| {
            let mut chars = word.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) if c.is_ascii_alphabetic() => Some(c),
                _ => None,
            }
        })
        .ok_or_else(|| LacertaError::InvalidResponse(format!("No reply type in '{}'", line)))?;
    let value = parts
        .next()
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| LacertaError::InvalidResponse(format!("No value in '{}'", line)))?;
    Ok(Reply { kind, value })
}

/// Parse a position reply; negative counts are rejected
pub fn parse_position(line: &str) -> Result<u32> {
    let reply = parse_reply(line)?;
    if reply.kind != 'P' {
        return Err(LacertaError::InvalidResponse(format!(
            "Expected a position reply, got '{}'",
            line
        )));
    }
    u32::try_from(reply.value)
        .map_err(|_| LacertaError::InvalidResponse(format!("Negative position in '{}'", line)))
}

pub fn validate_temp_comp(steps: i32) -> Result<i32> {
    if (MIN_TEMP_COMP..=MAX_TEMP_COMP).contains(&steps) {
        Ok(steps)
    } else {
        Err(LacertaError::InvalidValue(format!(
            "Temperature compensation {} out of range [{}, {}]",
            steps, MIN_TEMP_COMP, MAX_TEMP_COMP
        )))
    }
}

pub fn validate_max_position(position: u32) -> Result<u32> {
    if (MIN_MAX_POSITION..=MAX_MAX_POSITION).contains(&position) {
        Ok(position)
    } else {
        Err(LacertaError::InvalidValue(format!(
            "Max position {} out of range [{}, {}]",
            position, MIN_MAX_POSITION, MAX_MAX_POSITION
        )))
    }
}
