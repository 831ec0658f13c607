//! Simulated Dream Focuser
//!
//! Answers the eight byte frame protocol from memory so the driver can run
//! without hardware.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serial_link::{
    sum8, verify_sum8, Framing, LinkError, Result, SerialPair, SerialPortFactory, SerialReader,
    SerialWriter,
};
use tokio::sync::Mutex;
use tracing::debug;

use crate::protocol::FRAME_LEN;

/// Steps the simulated motor advances per status query
const STEPS_PER_QUERY: i32 = 1_000;

const PARK_POSITION: i32 = 0;

#[derive(Debug)]
struct MockState {
    responses: VecDeque<Vec<u8>>,
    device: SimulatedFocuser,
}

#[derive(Debug, Clone)]
struct SimulatedFocuser {
    position: i32,
    target: i32,
    max_position: i32,
    moving: bool,
    parking: bool,
    parked: bool,
    absolute: bool,
    /// Tenths of a degree Celsius
    temperature: i16,
    /// Tenths of a percent
    humidity: i16,
}

impl Default for SimulatedFocuser {
    fn default() -> Self {
        Self {
            position: 40_000,
            target: 40_000,
            max_position: 80_000,
            moving: false,
            parking: false,
            parked: false,
            absolute: true,
            temperature: 85,
            humidity: 620,
        }
    }
}

impl SimulatedFocuser {
    fn advance(&mut self) {
        if !self.moving {
            return;
        }
        let distance = self.target - self.position;
        if distance.abs() <= STEPS_PER_QUERY {
            self.position = self.target;
            self.moving = false;
            if self.parking {
                self.parking = false;
                self.parked = true;
            }
        } else {
            self.position += STEPS_PER_QUERY * distance.signum();
        }
    }

    fn start_move(&mut self, target: i32) {
        self.target = target;
        self.moving = target != self.position;
        self.parked = false;
    }

    fn status_flags(&self) -> u8 {
        let park = if self.parked {
            2
        } else if self.parking {
            1
        } else {
            0
        };
        u8::from(self.moving) | (park << 3) | (1 << 5)
    }

    /// Answer one request, returning the reply command byte and payload
    fn answer(&mut self, code: u8, value: i32, addr: u8) -> (u8, [u8; 4]) {
        match code {
            b'M' => {
                self.start_move(value);
                (code, value.to_be_bytes())
            }
            b'Z' => {
                self.position = value;
                self.target = value;
                self.absolute = true;
                (code, value.to_be_bytes())
            }
            b'H' => {
                self.moving = false;
                self.parking = false;
                self.target = self.position;
                (code, [0; 4])
            }
            b'P' => (code, self.position.to_be_bytes()),
            b'I' => {
                self.advance();
                (code, [0, 0, 0, self.status_flags()])
            }
            b'W' => (code, [0, 0, 0, u8::from(self.absolute)]),
            b'T' => {
                let [a, b] = self.humidity.to_be_bytes();
                let [c, d] = self.temperature.to_be_bytes();
                (code, [a, b, c, d])
            }
            b'G' => {
                self.start_move(PARK_POSITION);
                self.parking = self.moving;
                self.parked = !self.moving;
                (code, [0; 4])
            }
            b'A' if addr == 3 => (code, self.max_position.to_be_bytes()),
            _ => (b'!', [0; 4]),
        }
    }
}

impl MockState {
    fn process_frame(&mut self, frame: &[u8]) {
        let (code, payload) = if frame.len() != FRAME_LEN || verify_sum8(frame).is_err() {
            debug!("Mock received corrupt frame {:02x?}", frame);
            (b'?', [0; 4])
        } else {
            let value = i32::from_be_bytes([frame[2], frame[3], frame[4], frame[5]]);
            debug!("Mock processing '{}' value {}", char::from(frame[1]), value);
            self.device.answer(frame[1], value, frame[6])
        };

        let mut reply = vec![b'M', code, payload[0], payload[1], payload[2], payload[3], 0];
        reply.push(sum8(&reply));
        self.responses.push_back(reply);
    }
}

/// Reader half of the simulated focuser
pub struct MockSerialReader {
    state: Arc<Mutex<MockState>>,
}

#[async_trait]
impl SerialReader for MockSerialReader {
    async fn read_frame(&mut self, _framing: &Framing) -> Result<Option<Vec<u8>>> {
        let mut state = self.state.lock().await;
        match state.responses.pop_front() {
            Some(frame) => Ok(Some(frame)),
            None => Err(LinkError::Timeout("Simulated focuser sent nothing".to_string())),
        }
    }

    async fn discard_input(&mut self) -> Result<usize> {
        let mut state = self.state.lock().await;
        Ok(state.responses.drain(..).map(|frame| frame.len()).sum())
    }
}

/// Writer half of the simulated focuser
pub struct MockSerialWriter {
    state: Arc<Mutex<MockState>>,
}

#[async_trait]
impl SerialWriter for MockSerialWriter {
    async fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.state.lock().await.process_frame(bytes);
        Ok(())
    }
}

/// Factory handing out connections to one simulated focuser
#[derive(Clone)]
pub struct MockSerialPortFactory {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockSerialPortFactory {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                responses: VecDeque::new(),
                device: SimulatedFocuser::default(),
            })),
        }
    }
}

#[async_trait]
impl SerialPortFactory for MockSerialPortFactory {
    async fn open(&self, port: &str, _baud_rate: u32, _timeout: Duration) -> Result<SerialPair> {
        debug!("Opening simulated Dream Focuser on {}", port);
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
