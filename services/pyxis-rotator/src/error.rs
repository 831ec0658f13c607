//! Error types for the Pyxis rotator driver

use ascom_alpaca::{ASCOMError, ASCOMErrorCode};
use serial_link::LinkError;

/// Errors that can occur when interacting with a Pyxis rotator
#[derive(Debug, thiserror::Error)]
pub enum PyxisError {
    #[error("Not connected to Pyxis rotator")]
    NotConnected,

    #[error("Serial link error: {0}")]
    Link(#[from] LinkError),

    #[error("Rotator did not acknowledge {command}: got {reply:?}")]
    NotAcknowledged { command: String, reply: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Rotator is asleep; wake it before moving")]
    Asleep,

    #[error("Rotator is already moving")]
    Moving,

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

impl PyxisError {
    /// Convert this error to an ASCOM error
    pub fn to_ascom_error(self) -> ASCOMError {
        match self {
            PyxisError::NotConnected | PyxisError::Link(LinkError::NotConnected) => {
                ASCOMError::new(ASCOMErrorCode::NOT_CONNECTED, self.to_string())
            }
            PyxisError::InvalidValue(_) => {
                ASCOMError::new(ASCOMErrorCode::INVALID_VALUE, self.to_string())
            }
            _ => ASCOMError::invalid_operation(self.to_string()),
        }
    }
}

/// Result type alias for Pyxis operations
pub type Result<T> = std::result::Result<T, PyxisError>;
