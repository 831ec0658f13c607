//! Error types for the TeenAstro focuser driver

use ascom_alpaca::{ASCOMError, ASCOMErrorCode};
use serial_link::LinkError;

#[derive(Debug, thiserror::Error)]
pub enum TeenAstroError {
    #[error("Not connected to TeenAstro focuser")]
    NotConnected,

    #[error("Serial link error: {0}")]
    Link(#[from] LinkError),

    #[error("Unexpected version reply: {0}")]
    NotTeenAstro(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Controller refused: {0}")]
    Refused(String),
}

impl TeenAstroError {
    pub fn to_ascom_error(self) -> ASCOMError {
        match self {
            TeenAstroError::NotConnected | TeenAstroError::Link(LinkError::NotConnected) => {
                ASCOMError::new(ASCOMErrorCode::NOT_CONNECTED, self.to_string())
            }
            TeenAstroError::InvalidValue(_) => {
                ASCOMError::new(ASCOMErrorCode::INVALID_VALUE, self.to_string())
            }
            _ => ASCOMError::invalid_operation(self.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, TeenAstroError>;
