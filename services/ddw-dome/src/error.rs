//! Error types for the DDW dome driver

use ascom_alpaca::{ASCOMError, ASCOMErrorCode};
use serial_link::LinkError;

#[derive(Debug, thiserror::Error)]
pub enum DdwError {
    #[error("Not connected to dome controller")]
    NotConnected,

    #[error("Serial link error: {0}")]
    Link(#[from] LinkError),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Dome is already moving")]
    Busy,
}

impl DdwError {
    pub fn to_ascom_error(self) -> ASCOMError {
        match self {
            DdwError::NotConnected | DdwError::Link(LinkError::NotConnected) => {
                ASCOMError::new(ASCOMErrorCode::NOT_CONNECTED, self.to_string())
            }
            DdwError::InvalidValue(_) => {
                ASCOMError::new(ASCOMErrorCode::INVALID_VALUE, self.to_string())
            }
            _ => ASCOMError::invalid_operation(self.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, DdwError>;
