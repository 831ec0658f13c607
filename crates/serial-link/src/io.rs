//! I/O traits for serial communication
//!
//! Drivers never touch a serial port directly. They talk to these traits so
//! tests can substitute scripted or mockall-generated transports.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::framing::Framing;

/// Pair of reader and writer for a serial connection
pub struct SerialPair {
    /// Reader for receiving data
    pub reader: Box<dyn SerialReader>,
    /// Writer for sending data
    pub writer: Box<dyn SerialWriter>,
}

/// Trait for reading framed responses from a serial port
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SerialReader: Send {
    /// Read one frame from the serial port
    ///
    /// Returns `Ok(Some(frame))` if a frame was read (including its delimiter),
    /// `Ok(None)` if the port was closed,
    /// or an error if reading failed or timed out.
    async fn read_frame(&mut self, framing: &Framing) -> Result<Option<Vec<u8>>>;

    /// Drop everything received but not yet read, including a partially
    /// read frame. Returns the number of bytes dropped.
    async fn discard_input(&mut self) -> Result<usize>;
}

/// Trait for writing raw command bytes to a serial port
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SerialWriter: Send {
    /// Write the bytes verbatim and flush
    async fn write_bytes(&mut self, bytes: &[u8]) -> Result<()>;
}

/// Trait for creating serial port connections
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SerialPortFactory: Send + Sync {
    /// Open a serial port connection
    ///
    /// Returns a pair of reader and writer on success. Reads on the returned
    /// reader fail with a timeout error after `timeout`.
    async fn open(&self, port: &str, baud_rate: u32, timeout: Duration) -> Result<SerialPair>;

    /// Check if a serial port exists and can be opened
    async fn port_exists(&self, port: &str) -> bool;
}
