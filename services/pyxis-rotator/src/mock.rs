//! Simulated Pyxis rotator
//!
//! Answers the six character command set of a 3-inch Pyxis and produces a
//! progress stream while rotating. The simulated rotator travels one degree
//! every [`DEGREE_PERIOD`] whether or not anyone reads the stream, so unread
//! batches pile up the way they do on real hardware.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serial_link::{
    Framing, LinkError, Result, SerialPair, SerialPortFactory, SerialReader, SerialWriter,
};
use tokio::sync::Mutex;
use tracing::debug;

use crate::protocol::{step_angle, travel_direction, Model, ACK, FINISHED};

/// Simulated time to travel one degree
pub const DEGREE_PERIOD: Duration = Duration::from_millis(10);

#[derive(Debug)]
struct MockState {
    output: VecDeque<u8>,
    device: SimulatedRotator,
}

#[derive(Debug, Clone)]
struct SimulatedRotator {
    firmware: &'static str,
    position: u16,
    target: u16,
    direction: i16,
    moving: bool,
    /// When the current rotation started
    started: Option<Instant>,
    /// Degree batches already streamed for the current rotation
    streamed: u32,
    reverse: bool,
    asleep: bool,
}

impl Default for SimulatedRotator {
    fn default() -> Self {
        Self {
            firmware: "3.1",
            position: 90,
            target: 90,
            direction: 1,
            moving: false,
            started: None,
            streamed: 0,
            reverse: false,
            asleep: false,
        }
    }
}

impl SimulatedRotator {
    fn model(&self) -> Model {
        Model::from_firmware(self.firmware)
    }

    fn start_rotation(&mut self, target: u16) {
        if self.asleep {
            debug!("Mock: asleep, ignoring rotation to {}", target);
            return;
        }
        self.target = target % 360;
        self.direction = travel_direction(self.position, self.target);
        self.moving = true;
        self.started = Some(Instant::now());
        self.streamed = 0;
    }

    /// Next chunk of the progress stream, if the rotator has produced one yet
    fn progress(&mut self) -> Option<Vec<u8>> {
        if self.position == self.target {
            self.moving = false;
            self.started = None;
            return Some(vec![FINISHED]);
        }
        let elapsed = self.started.map(|t| t.elapsed()).unwrap_or_default();
        let travelled = (elapsed.as_millis() / DEGREE_PERIOD.as_millis()) as u32;
        if travelled <= self.streamed {
            return None;
        }
        self.streamed += 1;
        self.position = step_angle(self.position, self.direction);
        Some(vec![ACK; self.model().progress_per_degree()])
    }

    /// Handle one command, returning the bytes the rotator answers with
    fn process(&mut self, command: &str) -> Vec<u8> {
        debug!("Mock processing command: '{}'", command);
        match command {
            "CCLINK" => vec![ACK],
            "CVxxxx" => self.firmware.as_bytes().to_vec(),
            "CGETPA" => format!("{:03}", self.position).into_bytes(),
            "CMREAD" => vec![if self.reverse { b'1' } else { b'0' }],
            "CSLEEP" => {
                self.asleep = true;
                Vec::new()
            }
            "CWAKEUP" => {
                self.asleep = false;
                vec![ACK]
            }
            "CHOMES" => {
                self.start_rotation(0);
                Vec::new()
            }
            _ => {
                let prefix = command.get(..3).unwrap_or(command);
                let argument = command.get(3..).unwrap_or_default();
                match prefix {
                    "CPA" => match argument.parse::<u16>() {
                        Ok(angle) => self.start_rotation(angle),
                        Err(_) => debug!("Mock: bad angle in '{}'", command),
                    },
                    "CD0" | "CD1" => self.reverse = prefix == "CD1",
                    "CZ0" | "CZ1" => {}
                    "CTx" if command.get(4..).is_some_and(|r| r.parse::<u8>().is_ok()) => {
                        return vec![ACK];
                    }
                    _ => debug!("Mock: unknown command '{}'", command),
                }
                Vec::new()
            }
        }
    }
}

/// Reader half of the simulated rotator
pub struct MockSerialReader {
    state: Arc<Mutex<MockState>>,
}

#[async_trait]
impl SerialReader for MockSerialReader {
    async fn read_frame(&mut self, framing: &Framing) -> Result<Option<Vec<u8>>> {
        let mut state = self.state.lock().await;
        let frame = match framing {
            Framing::Delimited { .. } if state.device.moving => state.device.progress(),
            Framing::Fixed(len) if state.output.len() >= *len => {
                Some(state.output.drain(..*len).collect())
            }
            _ => None,
        };
        frame
            .map(Some)
            .ok_or_else(|| LinkError::Timeout("Simulated rotator sent nothing".to_string()))
    }

    async fn discard_input(&mut self) -> Result<usize> {
        let mut state = self.state.lock().await;
        let dropped = state.output.len();
        state.output.clear();
        Ok(dropped)
    }
}

/// Writer half of the simulated rotator
pub struct MockSerialWriter {
    state: Arc<Mutex<MockState>>,
}

#[async_trait]
impl SerialWriter for MockSerialWriter {
    async fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let command = String::from_utf8_lossy(bytes);
        let mut state = self.state.lock().await;
        let reply = state.device.process(command.trim());
        state.output.extend(reply);
        Ok(())
    }
}

/// Factory handing out connections to one simulated rotator
#[derive(Clone)]
pub struct MockSerialPortFactory {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockSerialPortFactory {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                output: VecDeque::new(),
                device: SimulatedRotator::default(),
            })),
        }
    }
}

#[async_trait]
impl SerialPortFactory for MockSerialPortFactory {
    async fn open(&self, port: &str, _baud_rate: u32, _timeout: Duration) -> Result<SerialPair> {
        debug!("Opening simulated Pyxis rotator on {}", port);
        self.state.lock().await.output.clear();
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
