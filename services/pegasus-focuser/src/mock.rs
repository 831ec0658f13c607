//! Simulated Pegasus controller
//!
//! Speaks the DMFC / FocusCube line protocol from memory so the driver can
//! run without hardware.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serial_link::{
    Framing, LinkError, Result, SerialPair, SerialPortFactory, SerialReader, SerialWriter,
};
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::Model;

/// Steps the simulated motor advances per status query
const STEPS_PER_QUERY: i32 = 500;

#[derive(Debug)]
struct MockState {
    responses: VecDeque<Vec<u8>>,
    device: SimulatedController,
}

#[derive(Debug, Clone)]
struct SimulatedController {
    model: Model,
    position: i32,
    target: i32,
    moving: bool,
    temperature: f64,
    /// 1 stepper, 0 DC
    motor: u8,
    led: bool,
    reverse: bool,
    encoders: bool,
    backlash: u32,
}

impl SimulatedController {
    fn new(model: Model) -> Self {
        Self {
            model,
            position: 25_000,
            target: 25_000,
            moving: false,
            temperature: 12.4,
            motor: 1,
            led: true,
            reverse: false,
            encoders: true,
            backlash: 0,
        }
    }

    fn identifier(&self) -> &'static str {
        match self.model {
            Model::Dmfc => "OK_DMFCN",
            Model::FocusCube => "OK_FC",
        }
    }

    fn advance(&mut self) {
        if !self.moving {
            return;
        }
        let distance = self.target - self.position;
        if distance.abs() <= STEPS_PER_QUERY {
            self.position = self.target;
            self.moving = false;
        } else {
            self.position += STEPS_PER_QUERY * distance.signum();
        }
    }

    fn status(&mut self) -> String {
        self.advance();
        format!(
            "{}:2.9:{}:{:.1}:{}:{}:{}:{}:{}:{}",
            self.identifier(),
            self.motor,
            self.temperature,
            self.position,
            u8::from(self.moving),
            u8::from(self.led),
            u8::from(self.reverse),
            // 0 means enabled
            u8::from(!self.encoders),
            self.backlash
        )
    }

    fn start_move(&mut self, target: i32) {
        self.target = target;
        self.moving = self.target != self.position;
    }
}

impl MockState {
    /// Process a command line and queue the one-line reply
    fn process_command(&mut self, line: &str) {
        debug!("Mock processing command: '{}'", line);
        let device = &mut self.device;

        let reply = match line {
            "#" => device.identifier().to_string(),
            "A" => device.status(),
            "H" => {
                device.moving = false;
                device.target = device.position;
                "H".to_string()
            }
            _ => {
                let (name, value) = line.split_once(':').unwrap_or((line, ""));
                match (name, value.parse::<i64>()) {
                    ("M", Ok(v)) => device.start_move(v as i32),
                    ("G", Ok(v)) => device.start_move(device.position + v as i32),
                    ("W", Ok(v)) => {
                        device.position = v as i32;
                        device.target = v as i32;
                    }
                    ("N", Ok(v)) => device.reverse = v == 1,
                    ("L", Ok(v)) => device.led = v == 2,
                    ("E", Ok(v)) => device.encoders = v == 0,
                    ("C", Ok(v)) => device.backlash = v as u32,
                    ("R", Ok(v)) => device.motor = if v == 2 { 0 } else { 1 },
                    ("S", Ok(_)) => {}
                    _ => debug!("Mock: unknown command '{}'", line),
                }
                line.to_string()
            }
        };

        self.responses.push_back(format!("{}\n", reply).into_bytes());
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
        self.state.lock().await.process_command(command.trim());
        Ok(())
    }
}

/// Factory handing out connections to one simulated controller
#[derive(Clone)]
pub struct MockSerialPortFactory {
    state: Arc<Mutex<MockState>>,
}

impl MockSerialPortFactory {
    pub fn new(model: Model) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                responses: VecDeque::new(),
                device: SimulatedController::new(model),
            })),
        }
    }
}

impl Default for MockSerialPortFactory {
    fn default() -> Self {
        Self::new(Model::default())
    }
}

#[async_trait]
impl SerialPortFactory for MockSerialPortFactory {
    async fn open(&self, port: &str, _baud_rate: u32, _timeout: Duration) -> Result<SerialPair> {
        debug!("Opening simulated Pegasus controller on {}", port);
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
