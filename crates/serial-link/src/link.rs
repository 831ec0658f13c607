//! Shared, reference-counted connection to one serial device
//!
//! A [`DeviceLink`] owns the serial port of a single device. Several ASCOM
//! clients may connect to the same device; the port is opened (and the device
//! handshake run) on the first connect and closed on the last disconnect.
//! All traffic goes through one lock so a command and its reply are never
//! interleaved with another command.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{LinkError, Result};
use crate::framing::Framing;
use crate::io::{SerialPair, SerialPortFactory};

/// Maximum number of stale responses to discard before giving up
pub const MAX_STALE_RESPONSES: usize = 5;

/// Where and how to open the serial port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSettings {
    pub port: String,
    pub baud_rate: u32,
    /// Per-read timeout
    pub timeout: Duration,
}

/// Reference-counted serial connection with exclusive command access
pub struct DeviceLink {
    settings: LinkSettings,
    factory: Arc<dyn SerialPortFactory>,
    connections: Mutex<u32>,
    available: AtomicBool,
    port: Mutex<Option<SerialPair>>,
}

impl DeviceLink {
    pub fn new(settings: LinkSettings, factory: Arc<dyn SerialPortFactory>) -> Self {
        Self {
            settings,
            factory,
            connections: Mutex::new(0),
            available: AtomicBool::new(false),
            port: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &LinkSettings {
        &self.settings
    }

    /// Whether the port is open and the device handshake succeeded
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Number of clients currently holding the connection
    pub async fn connection_count(&self) -> u32 {
        *self.connections.lock().await
    }

    /// Register a client connection.
    ///
    /// The first connection opens the port and runs `handshake`. If the
    /// handshake fails the port is closed again and the error is returned
    /// without counting the connection. Returns `true` if this call opened
    /// the port.
    pub async fn connect_with<F, Fut, E>(&self, handshake: F) -> std::result::Result<bool, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<(), E>>,
        E: From<LinkError>,
    {
        let mut connections = self.connections.lock().await;

        if *connections > 0 {
            *connections += 1;
            debug!(
                "Additional client connecting (connection count: {})",
                *connections
            );
            return Ok(false);
        }

        debug!("First client connecting, opening {}", self.settings.port);
        let pair = self
            .factory
            .open(
                &self.settings.port,
                self.settings.baud_rate,
                self.settings.timeout,
            )
            .await?;
        *self.port.lock().await = Some(pair);

        if let Err(e) = handshake().await {
            *self.port.lock().await = None;
            debug!("Handshake failed, closed {}", self.settings.port);
            return Err(e);
        }

        self.available.store(true, Ordering::SeqCst);
        *connections = 1;
        info!(
            "Serial port opened on {} (connection count: 1)",
            self.settings.port
        );
        Ok(true)
    }

    /// Release a client connection. Returns `true` if this closed the port.
    pub async fn disconnect(&self) -> bool {
        let mut connections = self.connections.lock().await;

        match *connections {
            0 => {
                debug!("disconnect() called with connection count already at 0");
                false
            }
            1 => {
                *connections = 0;
                self.available.store(false, Ordering::SeqCst);
                *self.port.lock().await = None;
                info!("Serial port closed (connection count: 0)");
                true
            }
            n => {
                *connections = n - 1;
                debug!("Client disconnecting (connection count: {})", n - 1);
                false
            }
        }
    }

    /// Write a command that produces no reply
    pub async fn send(&self, command: &[u8]) -> Result<()> {
        let mut port = self.port.lock().await;
        let pair = port.as_mut().ok_or(LinkError::NotConnected)?;
        debug!("Sending command: {}", command.escape_ascii());
        pair.writer.write_bytes(command).await
    }

    /// Write a command whose effects arrive later as unsolicited output.
    ///
    /// Unread input is dropped first, so what is read afterwards was sent
    /// in response to this command.
    pub async fn send_fresh(&self, command: &[u8]) -> Result<()> {
        let mut port = self.port.lock().await;
        let pair = port.as_mut().ok_or(LinkError::NotConnected)?;
        Self::write_fresh(pair, command).await
    }

    /// Write a command and read one reply frame.
    ///
    /// Unread input is dropped before the command goes out, so a reply that
    /// arrived after an earlier read timed out cannot be taken for this one.
    pub async fn transact(&self, command: &[u8], framing: &Framing) -> Result<Vec<u8>> {
        let mut port = self.port.lock().await;
        let pair = port.as_mut().ok_or(LinkError::NotConnected)?;
        Self::write_fresh(pair, command).await?;
        Self::read_one(pair, framing).await
    }

    /// Write a command, then read frames until one satisfies `accept`.
    ///
    /// Devices sometimes leave unsolicited or late replies in the buffer; up to
    /// [`MAX_STALE_RESPONSES`] rejected frames are discarded.
    pub async fn transact_matching<P>(
        &self,
        command: &[u8],
        framing: &Framing,
        accept: P,
    ) -> Result<Vec<u8>>
    where
        P: Fn(&[u8]) -> bool + Send,
    {
        let mut port = self.port.lock().await;
        let pair = port.as_mut().ok_or(LinkError::NotConnected)?;
        Self::write_fresh(pair, command).await?;

        for attempt in 0..MAX_STALE_RESPONSES {
            let frame = Self::read_one(pair, framing).await?;
            if accept(frame.as_slice()) {
                return Ok(frame);
            }
            debug!(
                "Discarding stale response (attempt {}): {}",
                attempt + 1,
                frame.escape_ascii()
            );
        }

        Err(LinkError::NoMatchingResponse {
            attempts: MAX_STALE_RESPONSES,
        })
    }

    /// Read one frame without sending anything first
    pub async fn read(&self, framing: &Framing) -> Result<Vec<u8>> {
        let mut port = self.port.lock().await;
        let pair = port.as_mut().ok_or(LinkError::NotConnected)?;
        Self::read_one(pair, framing).await
    }

    /// Read one frame, giving up after `wait` instead of the link timeout.
    ///
    /// Meant for draining streamed output: an expired wait keeps any partial
    /// frame for the next read and reports [`LinkError::Timeout`].
    pub async fn read_within(&self, framing: &Framing, wait: Duration) -> Result<Vec<u8>> {
        let mut port = self.port.lock().await;
        let pair = port.as_mut().ok_or(LinkError::NotConnected)?;
        tokio::time::timeout(wait, Self::read_one(pair, framing))
            .await
            .map_err(|_| LinkError::Timeout(format!("No frame within {:?}", wait)))?
    }

    async fn write_fresh(pair: &mut SerialPair, command: &[u8]) -> Result<()> {
        let dropped = pair.reader.discard_input().await?;
        if dropped > 0 {
            debug!("Dropped {} stale bytes before command", dropped);
        }
        debug!("Sending command: {}", command.escape_ascii());
        pair.writer.write_bytes(command).await
    }

    async fn read_one(pair: &mut SerialPair, framing: &Framing) -> Result<Vec<u8>> {
        let frame = pair
            .reader
            .read_frame(framing)
            .await?
            .ok_or(LinkError::Closed)?;
        debug!("Received response: {}", frame.escape_ascii());
        Ok(frame)
    }
}

impl std::fmt::Debug for DeviceLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceLink")
            .field("settings", &self.settings)
            .field("available", &self.available)
            .finish_non_exhaustive()
    }
}
