//! Simulated TeenAstro focuser

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serial_link::{
    Framing, LinkError, Result, SerialPair, SerialPortFactory, SerialReader, SerialWriter,
};
use tokio::sync::Mutex;
use tracing::debug;

/// Steps the simulated motor covers between status queries
const STEPS_PER_QUERY: u32 = 400;
const RUN_SPEED: u32 = 100;

#[derive(Debug)]
struct MockState {
    responses: VecDeque<Vec<u8>>,
    device: SimulatedTeenAstro,
}

#[derive(Debug, Clone)]
struct SimulatedTeenAstro {
    position: u32,
    target: u32,
    /// Indexed like the wire items `0`..`8`
    items: [u32; 9],
    log2_microsteps: u32,
    current_tens: u32,
    steps_per_revolution: u32,
}

impl Default for SimulatedTeenAstro {
    fn default() -> Self {
        Self {
            position: 5_000,
            target: 5_000,
            // park, max, manual speed, goto speed, goto acc, manual acc, manual dec, invert, resolution
            items: [0, 65_000, 20, 100, 10, 10, 10, 0, 16],
            log2_microsteps: 4,
            current_tens: 50,
            steps_per_revolution: 200,
        }
    }
}

impl SimulatedTeenAstro {
    fn moving(&self) -> bool {
        self.position != self.target
    }

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

    /// Apply `:F<item>,<value>`; `false` for unknown items
    fn set(&mut self, item: char, value: u32) -> bool {
        match item {
            '0'..='8' => {
                let index = item as usize - '0' as usize;
                self.items[index] = value;
                true
            }
            'm' => {
                self.log2_microsteps = value;
                true
            }
            'c' => {
                self.current_tens = value;
                true
            }
            'r' => {
                self.steps_per_revolution = value;
                true
            }
            _ => false,
        }
    }
}

impl MockState {
    fn process_command(&mut self, command: &str) {
        debug!("Mock processing command: '{}'", command);
        let body = command.trim_start_matches(":F").trim_end_matches('#');
        let device = &mut self.device;

        let reply = match body {
            "V" => Some("$ TeenAstro Focuser 1.3#".to_string()),
            "?" => {
                let speed = if device.moving() { RUN_SPEED } else { 0 };
                let reply = format!("?{} {} 18.5#", device.position, speed);
                device.advance();
                Some(reply)
            }
            "~" => {
                let i = &device.items;
                Some(format!(
                    "~{} {} {} {} {} {} {}#",
                    i[0], i[1], i[2], i[3], i[4], i[5], i[6]
                ))
            }
            "M" => Some(format!(
                "M{} {} {} {} {}#",
                device.items[7],
                device.log2_microsteps,
                device.items[8],
                device.current_tens,
                device.steps_per_revolution
            )),
            "P" => {
                device.target = device.items[0];
                None
            }
            "Q" => {
                device.target = device.position;
                None
            }
            "S" => {
                device.position = 0;
                device.target = 0;
                Some("1".to_string())
            }
            _ => {
                if let Some(target) = body.strip_prefix("G,").and_then(|v| v.parse().ok()) {
                    device.target = target;
                    None
                } else {
                    let mut chars = body.chars();
                    let item = chars.next();
                    let value = chars
                        .as_str()
                        .strip_prefix(',')
                        .and_then(|v| v.parse::<u32>().ok());
                    let accepted = match (item, value) {
                        (Some(item), Some(value)) => device.set(item, value),
                        _ => false,
                    };
                    if !accepted {
                        debug!("Mock: unknown command '{}'", command);
                    }
                    Some(if accepted { "1" } else { "0" }.to_string())
                }
            }
        };

        if let Some(reply) = reply {
            self.responses.push_back(reply.into_bytes());
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
            None => Err(LinkError::Timeout(
                "Simulated TeenAstro sent nothing".to_string(),
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

/// Factory handing out connections to one simulated TeenAstro focuser
#[derive(Clone)]
pub struct MockSerialPortFactory {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockSerialPortFactory {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                responses: VecDeque::new(),
                device: SimulatedTeenAstro::default(),
            })),
        }
    }
}

#[async_trait]
impl SerialPortFactory for MockSerialPortFactory {
    async fn open(&self, port: &str, _baud_rate: u32, _timeout: Duration) -> Result<SerialPair> {
        debug!("Opening simulated TeenAstro focuser on {}", port);
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

#[cfg(test)]
mod tests {
    use super::*;

    async fn exchange(pair: &mut SerialPair, command: &str) -> Option<String> {
        pair.writer.write_bytes(command.as_bytes()).await.unwrap();
        pair.reader
            .read_frame(&crate::protocol::FRAMING)
            .await
            .ok()
            .flatten()
            .map(|f| String::from_utf8(f).unwrap())
    }

    #[tokio::test]
    async fn test_simulated_goto_reports_speed_until_done() {
        let factory = MockSerialPortFactory::default();
        let mut pair = factory
            .open("/dev/mock", 9600, Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(exchange(&mut pair, ":FG,5600#").await, None);
        assert_eq!(exchange(&mut pair, ":F?#").await.as_deref(), Some("?5000 100 18.5#"));
        assert_eq!(exchange(&mut pair, ":F?#").await.as_deref(), Some("?5400 100 18.5#"));
        assert_eq!(exchange(&mut pair, ":F?#").await.as_deref(), Some("?5600 0 18.5#"));
    }

    #[tokio::test]
    async fn test_simulated_config_items() {
        let factory = MockSerialPortFactory::default();
        let mut pair = factory
            .open("/dev/mock", 9600, Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(exchange(&mut pair, ":F3,250#").await.as_deref(), Some("1"));
        assert_eq!(
            exchange(&mut pair, ":F~#").await.as_deref(),
            Some("~0 65000 20 250 10 10 10#")
        );
        assert_eq!(exchange(&mut pair, ":Fz,1#").await.as_deref(), Some("0"));
    }
}
