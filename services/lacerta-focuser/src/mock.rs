//! Simulated Lacerta MFOC controller

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serial_link::{
    Framing, LinkError, Result, SerialPair, SerialPortFactory, SerialReader, SerialWriter,
};
use tokio::sync::Mutex;
use tracing::debug;

/// Steps the simulated motor advances per position query
const STEPS_PER_QUERY: u32 = 500;

#[derive(Debug)]
struct MockState {
    responses: VecDeque<Vec<u8>>,
    device: SimulatedMfoc,
}

#[derive(Debug, Clone)]
struct SimulatedMfoc {
    position: u32,
    target: u32,
    max_position: u32,
    backlash: i32,
    temp_comp: i32,
    temp_direction: i32,
    start_at_saved: i32,
}

impl Default for SimulatedMfoc {
    fn default() -> Self {
        Self {
            position: 20_000,
            target: 20_000,
            max_position: 110_000,
            backlash: 12,
            temp_comp: 65,
            temp_direction: 0,
            start_at_saved: 1,
        }
    }
}

impl SimulatedMfoc {
    fn advance(&mut self) {
        let distance = self.target.abs_diff(self.position);
        if distance <= STEPS_PER_QUERY {
            self.position = self.target;
        } else if self.target > self.position {
            self.position += STEPS_PER_QUERY;
        } else {
            self.position -= STEPS_PER_QUERY;
        }
    }
}

impl MockState {
    fn process_command(&mut self, command: &str) {
        debug!("Mock processing command: '{}'", command);
        let mut words = command
            .trim()
            .trim_start_matches(':')
            .trim_end_matches('#')
            .split_whitespace();
        let opcode = words.next().unwrap_or_default();
        let argument: Option<i64> = words.next().and_then(|w| w.parse().ok());
        let device = &mut self.device;

        let reply = match (opcode, argument) {
            ("Q", _) => {
                device.advance();
                Some(format!("P {}", device.position))
            }
            ("M", Some(target)) => {
                device.target = (target.max(0) as u32).min(device.max_position);
                None
            }
            ("I", Some(v)) => {
                device.temp_direction = v as i32;
                None
            }
            ("F", Some(v)) => {
                device.start_at_saved = v as i32;
                None
            }
            ("B", Some(v)) => {
                device.backlash = v as i32;
                None
            }
            ("D", Some(v)) => {
                device.temp_comp = v as i32;
                None
            }
            ("G", Some(v)) => {
                device.max_position = v as u32;
                None
            }
            ("W", _) => Some(format!("I {}", device.temp_direction)),
            ("N", _) => Some(format!("F {}", device.start_at_saved)),
            ("J", _) => Some(format!("B {}", device.backlash)),
            ("U", _) => Some(format!("D {}", device.temp_comp)),
            ("O", _) => Some(format!("G {}", device.max_position)),
            _ => {
                debug!("Mock: unknown command '{}'", command);
                None
            }
        };

        if let Some(reply) = reply {
            self.responses.push_back(format!("{}\r", reply).into_bytes());
        }
    }
}

pub struct MockSerialReader {
    state: Arc<Mutex<MockState>>,
}

#[async_trait]
impl SerialReader for MockSerialReader {
    async fn read_frame(&mut self, _framing: &Framing) -> Result<Option<Vec<u8>>> {
        let mut state = self.state.lock().await;
        match state.responses.pop_front() {
            Some(frame) => Ok(Some(frame)),
            None => Err(LinkError::Timeout("Simulated MFOC sent nothing".to_string())),
        }
    }

    async fn discard_input(&mut self) -> Result<usize> {
        let mut state = self.state.lock().await;
        Ok(state.responses.drain(..).map(|frame| frame.len()).sum())
    }
}

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

/// Factory handing out connections to one simulated MFOC
#[derive(Clone)]
pub struct MockSerialPortFactory {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockSerialPortFactory {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                responses: VecDeque::new(),
                device: SimulatedMfoc::default(),
            })),
        }
    }
}

#[async_trait]
impl SerialPortFactory for MockSerialPortFactory {
    async fn open(&self, port: &str, _baud_rate: u32, _timeout: Duration) -> Result<SerialPair> {
        debug!("Opening simulated Lacerta MFOC on {}", port);
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
