//! Serial port implementation using tokio-serial
//!
//! Concrete implementations of the I/O traits for real hardware.

use std::io::ErrorKind;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::debug;

use crate::error::{LinkError, Result};
use crate::framing::{read_framed_into, Framing};
use crate::io::{SerialPair, SerialPortFactory, SerialReader, SerialWriter};

/// How long the line must stay quiet before a discard considers it drained
const DISCARD_QUIET_PERIOD: Duration = Duration::from_millis(10);

/// Upper bound on bytes dropped by one discard, for devices that never stop talking
const DISCARD_LIMIT: usize = 64 * 1024;

/// Serial reader using tokio-serial
pub struct TokioSerialReader {
    reader: BufReader<ReadHalf<SerialStream>>,
    timeout: Duration,
    /// Bytes of a frame whose read timed out before it was complete
    partial: Vec<u8>,
}

impl TokioSerialReader {
    /// Create a new serial reader whose reads give up after `timeout`
    pub fn new(reader: ReadHalf<SerialStream>, timeout: Duration) -> Self {
        Self {
            reader: BufReader::new(reader),
            timeout,
            partial: Vec::new(),
        }
    }
}

#[async_trait]
impl SerialReader for TokioSerialReader {
    async fn read_frame(&mut self, framing: &Framing) -> Result<Option<Vec<u8>>> {
        let read = read_framed_into(&mut self.reader, framing, &mut self.partial);
        match tokio::time::timeout(self.timeout, read).await {
            Ok(Ok(_)) if self.partial.is_empty() => Ok(None),
            Ok(Ok(_)) => Ok(Some(std::mem::take(&mut self.partial))),
            Ok(Err(e)) if e.kind() == ErrorKind::TimedOut => Err(LinkError::Timeout(format!(
                "Serial read timed out after {:?}",
                self.timeout
            ))),
            Ok(Err(e)) => {
                self.partial.clear();
                Err(LinkError::Io(e))
            }
            Err(_) => Err(LinkError::Timeout(format!(
                "No response within {:?}",
                self.timeout
            ))),
        }
    }

    async fn discard_input(&mut self) -> Result<usize> {
        let mut discarded = std::mem::take(&mut self.partial).len();

        loop {
            let buffered = self.reader.buffer().len();
            self.reader.consume(buffered);
            discarded += buffered;
            if discarded >= DISCARD_LIMIT {
                break;
            }

            match tokio::time::timeout(DISCARD_QUIET_PERIOD, self.reader.fill_buf()).await {
                Ok(Ok(bytes)) if !bytes.is_empty() => continue,
                Ok(Ok(_)) => break,
                Ok(Err(e)) if e.kind() == ErrorKind::TimedOut => break,
                Ok(Err(e)) => return Err(LinkError::Io(e)),
                Err(_) => break,
            }
        }

        if discarded > 0 {
            debug!("Discarded {} unread bytes", discarded);
        }
        Ok(discarded)
    }
}

/// Serial writer using tokio-serial
pub struct TokioSerialWriter {
    writer: WriteHalf<SerialStream>,
}

impl TokioSerialWriter {
    /// Create a new serial writer from a write half of a serial stream
    pub fn new(writer: WriteHalf<SerialStream>) -> Self {
        Self { writer }
    }
}

#[async_trait]
impl SerialWriter for TokioSerialWriter {
    async fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer
            .write_all(bytes)
            .await
            .map_err(|e| LinkError::Communication(format!("Failed to write: {}", e)))?;
        self.writer
            .flush()
            .await
            .map_err(|e| LinkError::Communication(format!("Failed to flush: {}", e)))?;
        Ok(())
    }
}

/// Serial port factory using tokio-serial
#[derive(Default, Clone)]
pub struct TokioSerialPortFactory;

impl TokioSerialPortFactory {
    /// Create a new serial port factory
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SerialPortFactory for TokioSerialPortFactory {
    async fn open(&self, port: &str, baud_rate: u32, timeout: Duration) -> Result<SerialPair> {
        debug!(
            "Opening serial port {} at {} baud with {:?} timeout",
            port, baud_rate, timeout
        );

        let stream = tokio_serial::new(port, baud_rate)
            .timeout(timeout)
            .open_native_async()
            .map_err(|e| LinkError::SerialPort(format!("Failed to open {}: {}", port, e)))?;

        debug!("Serial port {} opened successfully", port);

        let (reader, writer) = tokio::io::split(stream);

        Ok(SerialPair {
            reader: Box::new(TokioSerialReader::new(reader, timeout)),
            writer: Box::new(TokioSerialWriter::new(writer)),
        })
    }

    async fn port_exists(&self, port: &str) -> bool {
        std::path::Path::new(port).exists()
    }
}
