//! Error types for the NightCrawler driver

use ascom_alpaca::{ASCOMError, ASCOMErrorCode};
use serial_link::LinkError;

#[derive(Debug, thiserror::Error)]
pub enum NightCrawlerError {
    #[error("Not connected to NightCrawler")]
    NotConnected,

    #[error("Serial link error: {0}")]
    Link(#[from] LinkError),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Controller refused: {0}")]
    Refused(String),

    #[error("Motors are homing")]
    Homing,
}

impl NightCrawlerError {
    pub fn to_ascom_error(self) -> ASCOMError {
        match self {
            NightCrawlerError::NotConnected | NightCrawlerError::Link(LinkError::NotConnected) => {
                ASCOMError::new(ASCOMErrorCode::NOT_CONNECTED, self.to_string())
            }
            NightCrawlerError::InvalidValue(_) => {
                ASCOMError::new(ASCOMErrorCode::INVALID_VALUE, self.to_string())
            }
            _ => ASCOMError::invalid_operation(self.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, NightCrawlerError>;
