//! Simulated MoonLite controller
//!
//! Implements the serial I/O traits with an in-memory controller that speaks
//! the MoonLite protocol, so the driver can run without hardware.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serial_link::{
    Framing, LinkError, Result, SerialPair, SerialPortFactory, SerialReader, SerialWriter,
};
use tokio::sync::Mutex;
use tracing::debug;

/// Steps the simulated motor advances per status query
const STEPS_PER_QUERY: u16 = 250;

#[derive(Debug)]
struct MockState {
    responses: VecDeque<Vec<u8>>,
    device: SimulatedController,
}

#[derive(Debug, Clone)]
struct SimulatedController {
    position: u16,
    target: u16,
    moving: bool,
    /// Temperature in half degrees
    temperature_raw: i16,
    speed_raw: u8,
    half_step: bool,
    temp_comp: bool,
}

impl Default for SimulatedController {
    fn default() -> Self {
        Self {
            position: 10_000,
            target: 10_000,
            moving: false,
            temperature_raw: 42, // 21.0°C
            speed_raw: 0x02,
            half_step: false,
            temp_comp: false,
        }
    }
}

impl SimulatedController {
    fn advance(&mut self) {
        if !self.moving {
            return;
        }
        let distance = self.target.abs_diff(self.position);
        if distance <= STEPS_PER_QUERY {
            self.position = self.target;
            self.moving = false;
        } else if self.target > self.position {
            self.position += STEPS_PER_QUERY;
        } else {
            self.position -= STEPS_PER_QUERY;
        }
    }
}

impl MockState {
    /// Process a command and queue the reply, if the command has one
    fn process_command(&mut self, command: &str) {
        debug!("Mock processing command: '{}'", command);
        let body = command.trim_start_matches(':').trim_end_matches('#');
        let device = &mut self.device;

        let reply = match body {
            "GP" => {
                device.advance();
                Some(format!("{:04X}#", device.position))
            }
            "GT" => Some(format!("{:04X}#", device.temperature_raw as u16)),
            "GD" => Some(format!("{:02X}#", device.speed_raw)),
            "GH" => Some(if device.half_step { "FF#" } else { "00#" }.to_string()),
            "GI" => {
                device.advance();
                Some(if device.moving { "01#" } else { "00#" }.to_string())
            }
            "C" => None,
            "FG" => {
                device.moving = device.target != device.position;
                None
            }
            "FQ" => {
                device.moving = false;
                None
            }
            "SH" | "SF" => {
                device.half_step = body == "SH";
                None
            }
            "+" | "-" => {
                device.temp_comp = body == "+";
                None
            }
            _ => {
                let name = body.get(..2).unwrap_or(body);
                let value = body.get(2..).unwrap_or_default();
                match (name, u16::from_str_radix(value, 16)) {
                    ("SN", Ok(v)) => device.target = v,
                    ("SP", Ok(v)) => {
                        device.position = v;
                        device.target = v;
                    }
                    ("SD", Ok(v)) => device.speed_raw = v as u8,
                    ("PO", Ok(_)) | ("SC", Ok(_)) => {}
                    _ => debug!("Mock: unknown command '{}'", command),
                }
                None
            }
        };

        if let Some(reply) = reply {
            self.responses.push_back(reply.into_bytes());
        }
    }
}

/// Reader half of the simulated controller
pub struct MockSerialReader {
    state: Arc<Mutex<MockState>>,
}

#[async_trait]
impl SerialReader for MockSerialReader {
    async fn read_frame(&mut self, _framing: &Framing) -> Result<Option<Vec<u8>>> {
        let mut state = self.state.lock().await;
        match state.responses.pop_front() {
            Some(frame) => Ok(Some(frame)),
            None => Err(LinkError::Timeout("Simulated controller sent nothing".to_string())),
        }
    }

    async fn discard_input(&mut self) -> Result<usize> {
        let mut state = self.state.lock().await;
        Ok(state.responses.drain(..).map(|frame| frame.len()).sum())
    }
}

/// Writer half of the simulated controller
pub struct MockSerialWriter {
    state: Arc<Mutex<MockState>>,
}

#[async_trait]
impl SerialWriter for MockSerialWriter {
    async fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let command = String::from_utf8_lossy(bytes);
        self.state.lock().await.process_command(&command);
        Ok(())
    }
}

/// Factory handing out connections to one simulated controller.
///
/// The controller keeps its state across reconnects.
#[derive(Clone)]
pub struct MockSerialPortFactory {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockSerialPortFactory {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                responses: VecDeque::new(),
                device: SimulatedController::default(),
            })),
        }
    }
}

#[async_trait]
impl SerialPortFactory for MockSerialPortFactory {
    async fn open(&self, port: &str, _baud_rate: u32, _timeout: Duration) -> Result<SerialPair> {
        debug!("Opening simulated MoonLite controller on {}", port);
        self.state.lock().await.responses.clear();
        Ok(SerialPair {
            reader: Box::new(MockSerialReader {
                state: Arc::clone(&self.state),
            }),
            writer: Box::new(MockSerialWriter {
                state: Arc::clone(&self.state),
            }),
        })
    }

    async fn port_exists(&self, _port: &str) -> bool {
        true
    }
}
