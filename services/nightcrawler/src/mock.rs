//! Simulated NightCrawler controller
//!
//! Motors advance a fixed number of steps each time their position is read.
//! Homing ends after a few silent reads with an unsolicited `OK#`.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serial_link::{
    Framing, LinkError, Result, SerialPair, SerialPortFactory, SerialReader, SerialWriter,
};
use tokio::sync::Mutex;
use tracing::debug;

const FOCUS_STEPS_PER_QUERY: i32 = 500;
const ROTATOR_STEPS_PER_QUERY: i32 = 20_000;
/// Reads that pass in silence before homing reports completion
const HOMING_READS: u32 = 3;

#[derive(Debug, Clone, Copy, Default)]
struct SimulatedMotor {
    position: i32,
    target: i32,
    loaded: i32,
    step_delay: u32,
}

impl SimulatedMotor {
    fn moving(&self) -> bool {
        self.position != self.target
    }

    fn advance(&mut self, step: i32) {
        let distance = self.target - self.position;
        if distance.abs() <= step {
            self.position = self.target;
        } else {
            self.position += step * distance.signum();
        }
    }
}

#[derive(Debug)]
struct SimulatedNightCrawler {
    focus: SimulatedMotor,
    rotator: SimulatedMotor,
    homing_reads_left: Option<u32>,
}

impl Default for SimulatedNightCrawler {
    fn default() -> Self {
        Self {
            focus: SimulatedMotor {
                position: 10_000,
                target: 10_000,
                loaded: 10_000,
                step_delay: 10,
            },
            rotator: SimulatedMotor {
                step_delay: 20,
                ..SimulatedMotor::default()
            },
            homing_reads_left: None,
        }
    }
}

#[derive(Debug)]
struct MockState {
    responses: VecDeque<Vec<u8>>,
    device: SimulatedNightCrawler,
}

impl MockState {
    fn motor_command(&mut self, motor: char, body: &str) -> Option<String> {
        let (m, step) = match motor {
            '1' => (&mut self.device.focus, FOCUS_STEPS_PER_QUERY),
            '2' => (&mut self.device.rotator, ROTATOR_STEPS_PER_QUERY),
            _ => return None,
        };
        let (op, arg) = match body.split_once(' ') {
            Some((op, arg)) => (op, arg.trim().parse::<i32>().ok()),
            None => (body, None),
        };
        match (op, arg) {
            ("SN", Some(target)) => {
                m.loaded = target;
                Some("#".to_string())
            }
            ("SM", None) => {
                m.target = m.loaded;
                Some("#".to_string())
            }
            ("GP", None) => {
                let reply = format!("{:07}#", m.position);
                m.advance(step);
                Some(reply)
            }
            ("GM", None) => Some(if m.moving() { "01#" } else { "00#" }.to_string()),
            ("SP", Some(position)) => {
                m.position = position;
                m.target = position;
                Some("#".to_string())
            }
            ("SQ", None) => {
                m.target = m.position;
                Some("#".to_string())
            }
            ("SR", None) => Some(format!("{:03}#", m.step_delay)),
            ("SR", Some(delay)) => {
                m.step_delay = u32::try_from(delay).unwrap_or(m.step_delay);
                Some("#".to_string())
            }
            _ => None,
        }
    }

    fn process_command(&mut self, command: &str) {
        debug!("Mock processing command: '{}'", command);
        let body = command.trim_end_matches('#');

        let reply = match body {
            "PV" => Some("5.05#".to_string()),
            "PF" => Some("3.5 NC#".to_string()),
            "GT" => Some("215#".to_string()),
            "GV" => Some("121#".to_string()),
            "GS" => Some("00#".to_string()),
            _ if body.starts_with("Pt ") => None,
            _ if body.starts_with("SH ") => {
                self.device.homing_reads_left = Some(HOMING_READS);
                Some("#".to_string())
            }
            _ if body.starts_with("PE ") => Some(format!("{}#", &body[3..])),
            _ if body.starts_with("PD ") || body.starts_with("PL ") => Some("#".to_string()),
            _ => {
                let mut chars = body.chars();
                match chars.next() {
                    Some(motor) => self.motor_command(motor, chars.as_str()),
                    None => None,
                }
            }
        };

        match reply {
            Some(reply) => self.responses.push_back(reply.into_bytes()),
            None => debug!("Mock: no reply to '{}'", command),
        }
    }

    /// Count down a homing run; `true` when it just finished
    fn homing_finished(&mut self) -> bool {
        match self.device.homing_reads_left {
            Some(0) => {
                self.device.homing_reads_left = None;
                for motor in [&mut self.device.focus, &mut self.device.rotator] {
                    motor.position = 0;
                    motor.target = 0;
                }
                true
            }
            Some(left) => {
                self.device.homing_reads_left = Some(left - 1);
                false
            }
            None => false,
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
        if state.homing_finished() {
            return Ok(Some(b"OK#".to_vec()));
        }
        Err(LinkError::Timeout(
            "Simulated NightCrawler sent nothing".to_string(),
        ))
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

/// Factory handing out connections to one simulated NightCrawler
#[derive(Clone)]
pub struct MockSerialPortFactory {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockSerialPortFactory {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                responses: VecDeque::new(),
                device: SimulatedNightCrawler::default(),
            })),
        }
    }
}

#[async_trait]
impl SerialPortFactory for MockSerialPortFactory {
    async fn open(&self, port: &str, _baud_rate: u32, _timeout: Duration) -> Result<SerialPair> {
        debug!("Opening simulated NightCrawler on {}", port);
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
