//! Error types for the MoonLite focuser driver

use ascom_alpaca::{ASCOMError, ASCOMErrorCode};
use serial_link::LinkError;

/// Errors that can occur when interacting with a MoonLite controller
#[derive(Debug, thiserror::Error)]
pub enum MoonliteError {
    #[error("Not connected to MoonLite focuser")]
    NotConnected,

    #[error("Serial link error: {0}")]
    Link(#[from] LinkError),

    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

impl MoonliteError {
    /// Convert this error to an ASCOM error
    pub fn to_ascom_error(self) -> ASCOMError {
        match self {
            MoonliteError::NotConnected | MoonliteError::Link(LinkError::NotConnected) => {
                ASCOMError::new(ASCOMErrorCode::NOT_CONNECTED, self.to_string())
            }
            MoonliteError::InvalidValue(_) => {
                ASCOMError::new(ASCOMErrorCode::INVALID_VALUE, self.to_string())
            }
            _ => ASCOMError::invalid_operation(self.to_string()),
        }
    }
}

/// Result type alias for MoonLite operations
pub type Result<T> = std::result::Result<T, MoonliteError>;
