//! Error types for the Pegasus focuser driver

use ascom_alpaca::{ASCOMError, ASCOMErrorCode};
use serial_link::LinkError;

/// Errors that can occur when interacting with a Pegasus controller
#[derive(Debug, thiserror::Error)]
pub enum PegasusError {
    #[error("Not connected to Pegasus focuser")]
    NotConnected,

    #[error("Serial link error: {0}")]
    Link(#[from] LinkError),

    #[error("Unexpected device: {0}")]
    WrongDevice(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Not supported by this controller: {0}")]
    Unsupported(String),
}

impl PegasusError {
    /// Convert this error to an ASCOM error
    pub fn to_ascom_error(self) -> ASCOMError {
        match self {
            PegasusError::NotConnected | PegasusError::Link(LinkError::NotConnected) => {
                ASCOMError::new(ASCOMErrorCode::NOT_CONNECTED, self.to_string())
            }
            PegasusError::InvalidValue(_) => {
                ASCOMError::new(ASCOMErrorCode::INVALID_VALUE, self.to_string())
            }
            PegasusError::Unsupported(_) => {
                ASCOMError::new(ASCOMErrorCode::NOT_IMPLEMENTED, self.to_string())
            }
            _ => ASCOMError::invalid_operation(self.to_string()),
        }
    }
}

/// Result type alias for Pegasus operations
pub type Result<T> = std::result::Result<T, PegasusError>;
