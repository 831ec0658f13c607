//! Simulated DDW controller
//!
//! Every read while the dome turns reports the next ten ticks of rotation;
//! the shutter takes a few silent reads. Either ends with an info packet,
//! and any command stops what is moving, as on the real controller.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serial_link::{
    Framing, LinkError, Result, SerialPair, SerialPortFactory, SerialReader, SerialWriter,
};
use tokio::sync::Mutex;
use tracing::debug;

const TICKS_PER_REVOLUTION: u32 = 400;
const HOME_TICKS: u32 = 100;
const TICKS_PER_READ: u32 = 10;
/// Reads that pass in silence while the shutter moves
const SHUTTER_READS: u32 = 3;

const SHUTTER_CLOSED: u32 = 1;
const SHUTTER_OPEN: u32 = 2;

#[derive(Debug, Clone, Copy)]
struct ShutterMove {
    opening: bool,
    announced: bool,
    reads_left: u32,
}

#[derive(Debug)]
struct SimulatedDome {
    azimuth: u32,
    target: Option<u32>,
    announced: bool,
    shutter: u32,
    shutter_move: Option<ShutterMove>,
}

impl Default for SimulatedDome {
    fn default() -> Self {
        Self {
            azimuth: 0,
            target: None,
            announced: false,
            shutter: SHUTTER_CLOSED,
            shutter_move: None,
        }
    }
}

impl SimulatedDome {
    fn info(&self) -> String {
        format!(
            "V1,{},{},2,{},0,{},0,{}\r",
            TICKS_PER_REVOLUTION,
            HOME_TICKS,
            self.azimuth,
            self.shutter,
            u32::from(self.azimuth == HOME_TICKS)
        )
    }

    fn stop(&mut self) {
        self.target = None;
        self.shutter_move = None;
    }

    fn turns_right(&self, target: u32) -> bool {
        (target + TICKS_PER_REVOLUTION - self.azimuth) % TICKS_PER_REVOLUTION
            <= TICKS_PER_REVOLUTION / 2
    }

    /// Advance whatever is moving by one read; `None` is a silent read
    fn step(&mut self) -> Option<String> {
        if let Some(target) = self.target {
            if !self.announced {
                self.announced = true;
                return Some(if self.turns_right(target) { "R" } else { "L" }.to_string());
            }
            let right = self.turns_right(target);
            let distance = if right {
                (target + TICKS_PER_REVOLUTION - self.azimuth) % TICKS_PER_REVOLUTION
            } else {
                (self.azimuth + TICKS_PER_REVOLUTION - target) % TICKS_PER_REVOLUTION
            };
            let step = distance.min(TICKS_PER_READ);
            self.azimuth = if right {
                (self.azimuth + step) % TICKS_PER_REVOLUTION
            } else {
                (self.azimuth + TICKS_PER_REVOLUTION - step) % TICKS_PER_REVOLUTION
            };
            let mut chunk = format!("P{:04}", self.azimuth);
            if self.azimuth == target {
                self.target = None;
                chunk.push_str(&self.info());
            }
            return Some(chunk);
        }

        let shutter = self.shutter_move.as_mut()?;
        if !shutter.announced {
            shutter.announced = true;
            return Some(if shutter.opening { "O" } else { "C" }.to_string());
        }
        if shutter.reads_left > 0 {
            shutter.reads_left -= 1;
            return None;
        }
        self.shutter = if shutter.opening {
            SHUTTER_OPEN
        } else {
            SHUTTER_CLOSED
        };
        self.shutter_move = None;
        Some(self.info())
    }

    fn start_rotation(&mut self, target: u32) {
        self.target = Some(target % TICKS_PER_REVOLUTION);
        self.announced = false;
    }

    fn start_shutter(&mut self, opening: bool) {
        self.shutter_move = Some(ShutterMove {
            opening,
            announced: false,
            reads_left: SHUTTER_READS,
        });
    }
}

#[derive(Debug)]
struct MockState {
    responses: VecDeque<Vec<u8>>,
    device: SimulatedDome,
}

impl MockState {
    fn process_command(&mut self, command: &str) {
        debug!("Mock processing command: '{}'", command);
        self.device.stop();

        match command {
            "GINF" => {
                let info = self.device.info();
                self.responses.push_back(info.into_bytes());
            }
            "GHOM" => self.device.start_rotation(HOME_TICKS),
            "GOPN" => self.device.start_shutter(true),
            "GCLS" => self.device.start_shutter(false),
            _ => match command.strip_prefix('G').and_then(|d| d.parse::<u32>().ok()) {
                Some(degrees) => {
                    let ticks = (f64::from(degrees) * f64::from(TICKS_PER_REVOLUTION) / 360.0)
                        .round() as u32;
                    self.device.start_rotation(ticks);
                }
                None => debug!("Mock: ignoring '{}'", command),
            },
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
        if let Some(frame) = state.responses.pop_front() {
            return Ok(Some(frame));
        }
        match state.device.step() {
            Some(chunk) => Ok(Some(chunk.into_bytes())),
            None => Err(LinkError::Timeout(
                "Simulated dome sent nothing".to_string(),
            )),
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

/// Factory handing out connections to one simulated dome
#[derive(Clone)]
pub struct MockSerialPortFactory {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockSerialPortFactory {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                responses: VecDeque::new(),
                device: SimulatedDome::default(),
            })),
        }
    }
}

#[async_trait]
impl SerialPortFactory for MockSerialPortFactory {
    async fn open(&self, port: &str, _baud_rate: u32, _timeout: Duration) -> Result<SerialPair> {
        debug!("Opening simulated dome on {}", port);
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
