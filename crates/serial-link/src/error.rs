//! Error types for the serial link

use thiserror::Error;

/// Result type alias for link operations
pub type Result<T> = std::result::Result<T, LinkError>;

/// Errors raised while talking to a device over a serial line
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("Not connected to device")]
    NotConnected,

    #[error("Serial port error: {0}")]
    SerialPort(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection closed by device")]
    Closed,

    #[error("Communication error: {0}")]
    Communication(String),

    #[error("Checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    Checksum { expected: u8, actual: u8 },

    #[error("No matching response after {attempts} reads")]
    NoMatchingResponse { attempts: usize },
}

impl LinkError {
    /// Whether the error is a read timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, LinkError::Timeout(_))
    }
}
