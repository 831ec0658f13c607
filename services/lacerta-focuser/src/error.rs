//! Error types for the Lacerta MFOC driver

use ascom_alpaca::{ASCOMError, ASCOMErrorCode};
use serial_link::LinkError;

#[derive(Debug, thiserror::Error)]
pub enum LacertaError {
    #[error("Not connected to Lacerta MFOC")]
    NotConnected,

    #[error("Serial link error: {0}")]
    Link(#[from] LinkError),

    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Setting not confirmed: sent {sent}, controller reports {reported}")]
    NotConfirmed { sent: i32, reported: i32 },
}

impl LacertaError {
    pub fn to_ascom_error(self) -> ASCOMError {
        match self {
            LacertaError::NotConnected | LacertaError::Link(LinkError::NotConnected) => {
                ASCOMError::new(ASCOMErrorCode::NOT_CONNECTED, self.to_string())
            }
            LacertaError::InvalidValue(_) => {
                ASCOMError::new(ASCOMErrorCode::INVALID_VALUE, self.to_string())
            }
            _ => ASCOMError::invalid_operation(self.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, LacertaError>;
