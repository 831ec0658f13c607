//! Scripted serial ports for driver tests
//!
//! A [`ScriptedDevice`] answers written commands with canned reply frames and
//! records everything written to it. Reads with nothing queued fail with a
//! timeout, which is what real hardware does when it has nothing to say.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{LinkError, Result};
use crate::framing::Framing;
use crate::io::{SerialPair, SerialPortFactory, SerialReader, SerialWriter};

#[derive(Default)]
struct Script {
    always: HashMap<Vec<u8>, Vec<Vec<u8>>>,
    once: HashMap<Vec<u8>, VecDeque<Vec<Vec<u8>>>>,
    queued: VecDeque<Vec<u8>>,
    written: Vec<Vec<u8>>,
    opens: u32,
    discarded: usize,
    fail_writes: bool,
}

/// Scripted serial device shared between a test and the driver under test
#[derive(Clone, Default)]
pub struct ScriptedDevice {
    script: Arc<Mutex<Script>>,
}

impl ScriptedDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply to every write of `command` with `frames`
    pub fn on(&self, command: impl AsRef<[u8]>, frames: &[&[u8]]) -> &Self {
        self.lock()
            .always
            .insert(command.as_ref().to_vec(), to_frames(frames));
        self
    }

    /// Reply to the next write of `command` with `frames`, ahead of any `on` reply
    pub fn once(&self, command: impl AsRef<[u8]>, frames: &[&[u8]]) -> &Self {
        self.lock()
            .once
            .entry(command.as_ref().to_vec())
            .or_default()
            .push_back(to_frames(frames));
        self
    }

    /// Queue frames that will be read without any command being written
    pub fn push_frames(&self, frames: &[&[u8]]) -> &Self {
        self.lock().queued.extend(to_frames(frames));
        self
    }

    /// Make every subsequent write fail
    pub fn fail_writes(&self, fail: bool) -> &Self {
        self.lock().fail_writes = fail;
        self
    }

    /// Everything written so far, one entry per write
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.lock().written.clone()
    }

    /// Written commands as lossy text
    pub fn written_text(&self) -> Vec<String> {
        self.lock()
            .written
            .iter()
            .map(|w| String::from_utf8_lossy(w).into_owned())
            .collect()
    }

    pub fn clear_written(&self) {
        self.lock().written.clear();
    }

    /// Total bytes dropped by input discards
    pub fn discarded_bytes(&self) -> usize {
        self.lock().discarded
    }

    /// Frames received but not yet read
    pub fn pending_frames(&self) -> usize {
        self.lock().queued.len()
    }

    /// How many times the port was opened
    pub fn open_count(&self) -> u32 {
        self.lock().opens
    }

    /// A factory handing out readers and writers bound to this device
    pub fn factory(&self) -> Arc<dyn SerialPortFactory> {
        Arc::new(self.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        // A panicking test thread must not hide the script from the others
        self.script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for ScriptedDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let script = self.lock();
        f.debug_struct("ScriptedDevice")
            .field("commands", &script.always.len())
            .field("queued", &script.queued.len())
            .field("written", &script.written.len())
            .field("opens", &script.opens)
            .finish()
    }
}

fn to_frames(frames: &[&[u8]]) -> Vec<Vec<u8>> {
    frames.iter().map(|f| f.to_vec()).collect()
}

#[async_trait]
impl SerialPortFactory for ScriptedDevice {
    async fn open(&self, _port: &str, _baud_rate: u32, _timeout: Duration) -> Result<SerialPair> {
        self.lock().opens += 1;
        Ok(SerialPair {
            reader: Box::new(ScriptedReader {
                device: self.clone(),
            }),
            writer: Box::new(ScriptedWriter {
                device: self.clone(),
            }),
        })
    }

    async fn port_exists(&self, _port: &str) -> bool {
        true
    }
}

struct ScriptedReader {
    device: ScriptedDevice,
}

#[async_trait]
impl SerialReader for ScriptedReader {
    async fn read_frame(&mut self, _framing: &Framing) -> Result<Option<Vec<u8>>> {
        match self.device.lock().queued.pop_front() {
            Some(frame) => Ok(Some(frame)),
            None => Err(LinkError::Timeout("no scripted reply".to_string())),
        }
    }

    async fn discard_input(&mut self) -> Result<usize> {
        let mut script = self.device.lock();
        let dropped: usize = script.queued.drain(..).map(|frame| frame.len()).sum();
        script.discarded += dropped;
        Ok(dropped)
    }
}

struct ScriptedWriter {
    device: ScriptedDevice,
}

#[async_trait]
impl SerialWriter for ScriptedWriter {
    async fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let mut script = self.device.lock();
        if script.fail_writes {
            return Err(LinkError::Communication("scripted write failure".to_string()));
        }
        script.written.push(bytes.to_vec());

        let replies = match script.once.get_mut(bytes).and_then(|q| q.pop_front()) {
            Some(frames) => frames,
            None => script.always.get(bytes).cloned().unwrap_or_default(),
        };
        script.queued.extend(replies);
        Ok(())
    }
}

/// Factory whose ports can never be opened
#[derive(Debug, Default, Clone)]
pub struct FailingPortFactory;

#[async_trait]
impl SerialPortFactory for FailingPortFactory {
    async fn open(&self, port: &str, _baud_rate: u32, _timeout: Duration) -> Result<SerialPair> {
        Err(LinkError::SerialPort(format!("Failed to open {}", port)))
    }

    async fn port_exists(&self, _port: &str) -> bool {
        false
    }
}
