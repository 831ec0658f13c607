//! Error types for the Dream Focuser driver

use ascom_alpaca::{ASCOMError, ASCOMErrorCode};
use serial_link::LinkError;

/// Errors that can occur when interacting with a Dream Focuser
#[derive(Debug, thiserror::Error)]
pub enum DreamError {
    #[error("Not connected to Dream Focuser")]
    NotConnected,

    #[error("Serial link error: {0}")]
    Link(#[from] LinkError),

    #[error("Focuser rejected command '{command}': {reason}")]
    Rejected { command: char, reason: &'static str },

    #[error("Expected reply to '{expected}', got '{actual}'")]
    UnexpectedReply { expected: char, actual: char },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Focuser is not in absolute mode; sync it first")]
    NotAbsolute,

    #[error("Focuser is parked")]
    Parked,

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

impl DreamError {
    /// Convert this error to an ASCOM error
    pub fn to_ascom_error(self) -> ASCOMError {
        match self {
            DreamError::NotConnected | DreamError::Link(LinkError::NotConnected) => {
                ASCOMError::new(ASCOMErrorCode::NOT_CONNECTED, self.to_string())
            }
            DreamError::InvalidValue(_) => {
                ASCOMError::new(ASCOMErrorCode::INVALID_VALUE, self.to_string())
            }
            _ => ASCOMError::invalid_operation(self.to_string()),
        }
    }
}

/// Result type alias for Dream Focuser operations
pub type Result<T> = std::result::Result<T, DreamError>;
