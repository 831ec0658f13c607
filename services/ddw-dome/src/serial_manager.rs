//! Shared serial port manager for DDW dome controllers
//!
//! While idle the poller asks for an info packet. Once a slew, homing or
//! shutter operation starts the controller streams progress on its own, so
//! the poller stops sending and only drains that stream until the closing
//! info packet arrives. Sending anything mid-motion would stop the dome.

use std::sync::Arc;
use std::time::Duration;

use serial_link::{
    DeviceLink, LinkError, MotionState, MotionTracker, MotionUpdate, Poller, SerialPortFactory,
};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::config::{Config, DomeConfig};
use crate::error::{DdwError, Result};
use crate::protocol::{
    goto_degrees, parse_info, ticks_to_degrees, Command, InfoPacket, Rotation, ShutterStatus,
    StreamEvent, StreamParser, INFO_FRAMING, STREAM_FRAMING,
};

/// How long one read of the motion stream waits for the next byte
const STREAM_WAIT: Duration = Duration::from_millis(50);
/// Upper bound on stream reads per poll
const MAX_STREAM_READS: usize = 512;

#[derive(Debug, Clone)]
pub struct CachedState {
    pub info: Option<InfoPacket>,
    pub azimuth_ticks: Option<u32>,
    pub rotation: Option<Rotation>,
    pub shutter: ShutterStatus,
    pub park_azimuth: f64,
    pub at_park: bool,
    parking: bool,
    parser: StreamParser,
    pub azimuth_motion: MotionTracker,
    pub shutter_motion: MotionTracker,
}

impl CachedState {
    fn new(dome: &DomeConfig) -> Self {
        Self {
            info: None,
            azimuth_ticks: None,
            rotation: None,
            shutter: ShutterStatus::Error,
            park_azimuth: dome.park_azimuth,
            at_park: false,
            parking: false,
            parser: StreamParser::new(),
            azimuth_motion: MotionTracker::new(dome.slew_timeout),
            shutter_motion: MotionTracker::new(dome.shutter_timeout),
        }
    }

    pub fn azimuth(&self) -> Option<f64> {
        let info = self.info?;
        Some(ticks_to_degrees(self.azimuth_ticks?, info.ticks_per_revolution))
    }

    pub fn at_home(&self) -> bool {
        match (self.info, self.azimuth_ticks) {
            (Some(info), Some(ticks)) => !self.azimuth_motion.is_moving() && ticks == info.home_ticks,
            _ => false,
        }
    }

    pub fn is_moving(&self) -> bool {
        self.azimuth_motion.is_moving() || self.shutter_motion.is_moving()
    }

    fn apply_info(&mut self, packet: InfoPacket) -> [MotionUpdate; 2] {
        self.info = Some(packet);
        self.azimuth_ticks = Some(packet.azimuth_ticks);
        self.shutter = packet.shutter;
        self.rotation = None;

        let updates = [
            self.azimuth_motion.observe_moving(false),
            self.shutter_motion.observe_moving(false),
        ];
        if self.parking && updates[0] == MotionUpdate::Completed {
            self.at_park = true;
            info!("Dome parked");
        }
        self.parking = false;
        updates
    }

    /// Apply one stream event; returns the updates if it ended the motion
    fn apply_event(&mut self, event: StreamEvent) -> Option<[MotionUpdate; 2]> {
        match event {
            StreamEvent::Direction(rotation) => self.rotation = Some(rotation),
            StreamEvent::Position(ticks) => self.azimuth_ticks = Some(ticks),
            StreamEvent::Shutter(status) => self.shutter = status,
            StreamEvent::Info(packet) => return Some(self.apply_info(packet)),
            StreamEvent::Garbled(text) => warn!("Ignoring garbled dome output '{}'", text),
        }
        None
    }
}

pub struct SerialManager {
    polling_interval: Duration,
    link: Arc<DeviceLink>,
    cached_state: Arc<RwLock<CachedState>>,
    poller: Poller,
}

impl SerialManager {
    pub fn new(config: Config, serial_factory: Arc<dyn SerialPortFactory>) -> Self {
        Self {
            polling_interval: config.serial.polling_interval(),
            link: Arc::new(DeviceLink::new(
                config.serial.link_settings(),
                serial_factory,
            )),
            cached_state: Arc::new(RwLock::new(CachedState::new(&config.dome))),
            poller: Poller::new("DDW"),
        }
    }

    pub async fn connect(&self) -> Result<()> {
        let opened = self
            .link
            .connect_with(|| self.perform_handshake())
            .await?;
        if opened {
            self.start_polling().await;
        }
        Ok(())
    }

    pub async fn disconnect(&self) {
        if self.link.disconnect().await {
            self.poller.stop().await;
        }
    }

    pub fn is_available(&self) -> bool {
        self.link.is_available()
    }

    pub async fn get_cached_state(&self) -> CachedState {
        self.cached_state.read().await.clone()
    }

    pub async fn azimuth_state(&self) -> MotionState {
        self.cached_state.read().await.azimuth_motion.state()
    }

    pub async fn shutter_state(&self) -> MotionState {
        self.cached_state.read().await.shutter_motion.state()
    }

    pub async fn slew_to_azimuth(&self, azimuth: f64) -> Result<()> {
        let degrees = goto_degrees(azimuth)?;
        self.start_slew(Command::GoTo(degrees), Some(i64::from(degrees)), false)
            .await
    }

    pub async fn find_home(&self) -> Result<()> {
        self.start_slew(Command::Home, None, false).await
    }

    pub async fn park(&self) -> Result<()> {
        let park_azimuth = self.cached_state.read().await.park_azimuth;
        let degrees = goto_degrees(park_azimuth)?;
        self.start_slew(Command::GoTo(degrees), Some(i64::from(degrees)), true)
            .await
    }

    /// Make the current azimuth the park position
    pub async fn set_park(&self) -> Result<()> {
        self.ensure_available()?;
        let mut cached = self.cached_state.write().await;
        let azimuth = cached
            .azimuth()
            .ok_or_else(|| DdwError::InvalidResponse("Azimuth not yet known".to_string()))?;
        cached.park_azimuth = azimuth;
        cached.at_park = true;
        info!("Park position set to {:.1} degrees", azimuth);
        Ok(())
    }

    pub async fn open_shutter(&self) -> Result<()> {
        self.start_shutter(Command::OpenShutter, ShutterStatus::Opening)
            .await
    }

    pub async fn close_shutter(&self) -> Result<()> {
        self.start_shutter(Command::CloseShutter, ShutterStatus::Closing)
            .await
    }

    /// Stop all movement. Any command stops the controller; an info request
    /// is the one with no side effects, and its reply is where the dome stopped.
    pub async fn abort(&self) -> Result<()> {
        self.ensure_available()?;
        let packet = read_info(&self.link).await;
        let mut cached = self.cached_state.write().await;
        cached.azimuth_motion.abort();
        cached.shutter_motion.abort();
        cached.parking = false;
        cached.parser = StreamParser::new();
        info!("Dome movement aborted");
        cached.apply_info(packet?);
        Ok(())
    }

    /// Poll the controller now instead of waiting for the poller
    pub async fn refresh_motion(&self) -> Result<()> {
        self.ensure_available()?;
        update_state(&self.link, &self.cached_state).await
    }

    fn ensure_available(&self) -> Result<()> {
        if self.link.is_available() {
            Ok(())
        } else {
            Err(DdwError::NotConnected)
        }
    }

    async fn ensure_still(&self) -> Result<()> {
        if self.cached_state.read().await.is_moving() {
            Err(DdwError::Busy)
        } else {
            Ok(())
        }
    }

    async fn start_slew(&self, command: Command, target: Option<i64>, parking: bool) -> Result<()> {
        self.ensure_available()?;
        self.ensure_still().await?;
        {
            let mut cached = self.cached_state.write().await;
            cached.parser = StreamParser::new();
            cached.azimuth_motion.begin(target);
            cached.at_park = false;
            cached.parking = parking;
        }

        if let Err(e) = self.link.send_fresh(command.encode().as_bytes()).await {
            error!("Failed to send {:?}: {}", command, e);
            let mut cached = self.cached_state.write().await;
            cached.azimuth_motion.reject();
            cached.parking = false;
            return Err(e.into());
        }
        debug!("{:?} sent", command);
        Ok(())
    }

    async fn start_shutter(&self, command: Command, status: ShutterStatus) -> Result<()> {
        self.ensure_available()?;
        self.ensure_still().await?;
        {
            let mut cached = self.cached_state.write().await;
            cached.parser = StreamParser::new();
            cached.shutter_motion.begin(None);
            cached.shutter = status;
        }

        if let Err(e) = self.link.send_fresh(command.encode().as_bytes()).await {
            error!("Failed to send {:?}: {}", command, e);
            let mut cached = self.cached_state.write().await;
            cached.shutter_motion.reject();
            cached.shutter = ShutterStatus::Error;
            return Err(e.into());
        }
        debug!("{:?} sent", command);
        Ok(())
    }

    async fn perform_handshake(&self) -> Result<()> {
        let packet = read_info(&self.link).await?;
        info!(
            "DDW firmware {}: {} ticks per revolution, home at {} ticks",
            packet.version, packet.ticks_per_revolution, packet.home_ticks
        );
        let mut cached = self.cached_state.write().await;
        cached.parser = StreamParser::new();
        cached.apply_info(packet);
        Ok(())
    }

    async fn start_polling(&self) {
        let link = Arc::clone(&self.link);
        let cached_state = Arc::clone(&self.cached_state);

        self.poller
            .start(self.polling_interval, move || {
                let link = Arc::clone(&link);
                let cached_state = Arc::clone(&cached_state);
                async move {
                    if link.is_available() {
                        poll_device(&link, &cached_state).await;
                    }
                }
            })
            .await;
    }
}

async fn read_info(link: &DeviceLink) -> Result<InfoPacket> {
    let frame = link
        .transact_matching(Command::Info.encode().as_bytes(), &INFO_FRAMING, |frame| {
            frame.first() == Some(&b'V')
        })
        .await?;
    parse_info(&INFO_FRAMING.text(&frame))
}

/// Feed whatever the controller streamed since the last poll to the parser
async fn drain_stream(link: &DeviceLink, cached_state: &RwLock<CachedState>) -> Result<()> {
    for _ in 0..MAX_STREAM_READS {
        let bytes = match link.read_within(&STREAM_FRAMING, STREAM_WAIT).await {
            Ok(bytes) => bytes,
            Err(LinkError::Timeout(_)) => break,
            Err(e) => return Err(e.into()),
        };

        let mut cached = cached_state.write().await;
        let events = cached.parser.feed(&bytes);
        for event in events {
            if let Some(updates) = cached.apply_event(event) {
                log_updates(updates);
            }
        }
        if !cached.is_moving() {
            return Ok(());
        }
    }

    let mut cached = cached_state.write().await;
    let updates = [
        cached.azimuth_motion.observe_moving(true),
        cached.shutter_motion.observe_moving(true),
    ];
    if updates[0] == MotionUpdate::TimedOut {
        cached.parking = false;
    }
    if updates[1] == MotionUpdate::TimedOut {
        cached.shutter = ShutterStatus::Error;
    }
    log_updates(updates);
    Ok(())
}

fn log_updates(updates: [MotionUpdate; 2]) {
    for (part, update) in ["Dome rotation", "Shutter"].into_iter().zip(updates) {
        match update {
            MotionUpdate::Completed => debug!("{} finished", part),
            MotionUpdate::TimedOut => error!("{} did not finish in time", part),
            _ => {}
        }
    }
}

async fn update_state(link: &DeviceLink, cached_state: &RwLock<CachedState>) -> Result<()> {
    if cached_state.read().await.is_moving() {
        return drain_stream(link, cached_state).await;
    }
    let packet = read_info(link).await?;
    cached_state.write().await.apply_info(packet);
    Ok(())
}

async fn poll_device(link: &DeviceLink, cached_state: &RwLock<CachedState>) {
    if let Err(e) = update_state(link, cached_state).await {
        warn!("Failed to poll dome: {}", e);
        let mut cached = cached_state.write().await;
        let updates = [cached.azimuth_motion.fail(), cached.shutter_motion.fail()];
        log_updates(updates);
    }
}

impl std::fmt::Debug for SerialManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialManager")
            .field("link", &self.link)
            .field("polling_interval", &self.polling_interval)
            .finish_non_exhaustive()
    }
}
