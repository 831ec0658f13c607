//! Shared serial port manager for the Dream Focuser
//!
//! Owns the device link, exchanges checksummed frames with the focuser,
//! polls status, climate and position in the background and tracks motion.

use std::sync::Arc;
use std::time::Duration;

use serial_link::{DeviceLink, MotionState, MotionTracker, MotionUpdate, Poller, SerialPortFactory};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{DreamError, Result};
use crate::protocol::{
    is_absolute, parse_reply, Climate, Command, DeviceStatus, ParkState, Reply, FRAMING,
};

/// Cached state of the Dream Focuser
#[derive(Debug, Clone)]
pub struct CachedState {
    pub position: Option<i32>,
    /// Maximum position reported by the focuser
    pub max_position: Option<i32>,
    /// Whether the position counter has been calibrated by a sync
    pub absolute: bool,
    pub park: ParkState,
    pub twelve_volt: bool,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub dew_point: Option<f64>,
    pub motion: MotionTracker,
}

impl CachedState {
    fn new(motion_timeout: Duration) -> Self {
        Self {
            position: None,
            max_position: None,
            absolute: false,
            park: ParkState::Unparked,
            twelve_volt: false,
            temperature: None,
            humidity: None,
            dew_point: None,
            motion: MotionTracker::new(motion_timeout),
        }
    }

    fn apply_status(&mut self, status: DeviceStatus, absolute: bool) -> MotionUpdate {
        self.park = status.park;
        self.twelve_volt = status.twelve_volt;
        self.absolute = absolute;
        self.motion.observe_moving(status.moving)
    }

    fn apply_climate(&mut self, climate: Climate) {
        self.temperature = Some(climate.temperature);
        self.humidity = Some(climate.humidity);
        self.dew_point = Some(climate.dew_point());
    }
}

/// Shared serial port manager for a Dream Focuser
pub struct SerialManager {
    polling_interval: Duration,
    link: Arc<DeviceLink>,
    cached_state: Arc<RwLock<CachedState>>,
    poller: Poller,
}

impl SerialManager {
    /// Create a new serial port manager
    pub fn new(config: Config, serial_factory: Arc<dyn SerialPortFactory>) -> Self {
        Self {
            polling_interval: config.serial.polling_interval(),
            link: Arc::new(DeviceLink::new(
                config.serial.link_settings(),
                serial_factory,
            )),
            cached_state: Arc::new(RwLock::new(CachedState::new(
                config.focuser.motion_timeout,
            ))),
            poller: Poller::new("Dream Focuser"),
        }
    }

    /// Connect to the focuser.
    ///
    /// The first connection opens the serial port, reads the focuser state
    /// and starts polling; later connections only add a reference.
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

    /// Disconnect; the last disconnect stops polling and closes the port
    pub async fn disconnect(&self) {
        if self.link.disconnect().await {
            self.poller.stop().await;
        }
    }

    pub fn is_available(&self) -> bool {
        self.link.is_available()
    }

    /// Get a copy of the current cached state
    pub async fn get_cached_state(&self) -> CachedState {
        self.cached_state.read().await.clone()
    }

    pub async fn motion_state(&self) -> MotionState {
        self.cached_state.read().await.motion.state()
    }

    /// Start a move to `position`.
    ///
    /// The focuser must be calibrated and unparked, and must echo the target.
    pub async fn move_to(&self, position: i32) -> Result<()> {
        self.ensure_available()?;
        {
            let cached = self.cached_state.read().await;
            if !cached.absolute {
                return Err(DreamError::NotAbsolute);
            }
            if cached.park != ParkState::Unparked {
                return Err(DreamError::Parked);
            }
        }

        self.cached_state
            .write()
            .await
            .motion
            .begin(Some(i64::from(position)));

        let result = dispatch(&self.link, Command::MoveTo(position))
            .await
            .and_then(|reply| expect_echo(&reply, position));

        if let Err(e) = result {
            error!("Failed to start move to {}: {}", position, e);
            self.cached_state.write().await.motion.reject();
            return Err(e);
        }

        debug!("Moving to {}", position);
        Ok(())
    }

    /// Stop the motor
    pub async fn halt(&self) -> Result<()> {
        self.ensure_available()?;
        dispatch(&self.link, Command::Halt).await?;
        self.cached_state.write().await.motion.abort();
        info!("Focusing aborted");
        Ok(())
    }

    /// Set the position counter, which also calibrates the focuser
    pub async fn sync(&self, position: i32) -> Result<()> {
        self.ensure_available()?;
        let reply = dispatch(&self.link, Command::Sync(position)).await?;
        expect_echo(&reply, position)?;

        let absolute = is_absolute(&dispatch(&self.link, Command::AbsoluteMode).await?);
        let mut cached = self.cached_state.write().await;
        cached.position = Some(position);
        cached.absolute = absolute;
        info!("Position synced to {}", position);
        Ok(())
    }

    /// Drive to the park position
    pub async fn park(&self) -> Result<()> {
        self.ensure_available()?;
        if !self.cached_state.read().await.absolute {
            return Err(DreamError::NotAbsolute);
        }

        self.cached_state.write().await.motion.begin(None);
        if let Err(e) = dispatch(&self.link, Command::Park).await {
            error!("Park failed: {}", e);
            self.cached_state.write().await.motion.reject();
            return Err(e);
        }
        self.cached_state.write().await.park = ParkState::Parking;
        info!("Focuser parking");
        Ok(())
    }

    /// Read status and position now instead of waiting for the poller
    pub async fn refresh_motion(&self) -> Result<()> {
        self.ensure_available()?;
        let (status, absolute) = read_status(&self.link).await?;
        let position = dispatch(&self.link, Command::Position).await?.value();

        let mut cached = self.cached_state.write().await;
        cached.position = Some(position);
        if cached.apply_status(status, absolute) == MotionUpdate::TimedOut {
            error!("Focuser did not reach its target in time");
        }
        Ok(())
    }

    fn ensure_available(&self) -> Result<()> {
        if self.link.is_available() {
            Ok(())
        } else {
            Err(DreamError::NotConnected)
        }
    }

    /// Read status, limits, position and climate
    async fn perform_handshake(&self) -> Result<()> {
        let (status, absolute) = read_status(&self.link).await?;
        let position = dispatch(&self.link, Command::Position).await?.value();

        let max_position = match dispatch(&self.link, Command::MaxPosition).await {
            Ok(reply) => Some(reply.value()),
            Err(e) => {
                warn!("Could not read maximum position: {}", e);
                None
            }
        };
        let climate = match dispatch(&self.link, Command::Climate).await {
            Ok(reply) => Some(Climate::from_reply(&reply)),
            Err(e) => {
                warn!("Could not read climate sensor: {}", e);
                None
            }
        };

        let mut cached = self.cached_state.write().await;
        cached.apply_status(status, absolute);
        cached.position = Some(position);
        cached.max_position = max_position;
        if let Some(climate) = climate {
            cached.apply_climate(climate);
        }

        if !absolute {
            warn!("Focuser is not calibrated; sync it before moving");
        }
        info!(
            "Dream Focuser ready at position {} (max {:?}, park {:?})",
            position, max_position, status.park
        );
        Ok(())
    }

    /// Start background polling for status, climate and position
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

/// Send a command frame and return its verified reply
async fn dispatch(link: &DeviceLink, command: Command) -> Result<Reply> {
    let frame = link.transact(&command.encode(), &FRAMING).await?;
    parse_reply(command, &frame)
}

fn expect_echo(reply: &Reply, value: i32) -> Result<()> {
    if reply.value() == value {
        Ok(())
    } else {
        Err(DreamError::InvalidResponse(format!(
            "Expected echo of {}, got {}",
            value,
            reply.value()
        )))
    }
}

async fn read_status(link: &DeviceLink) -> Result<(DeviceStatus, bool)> {
    let status = DeviceStatus::from_reply(&dispatch(link, Command::Status).await?);
    let absolute = is_absolute(&dispatch(link, Command::AbsoluteMode).await?);
    Ok((status, absolute))
}

/// One polling pass. Each reading is independent; a failed one marks
/// pending motion as alerted without discarding the others. Climate and the
/// maximum position are informational and never affect motion.
async fn poll_device(link: &DeviceLink, cached_state: &RwLock<CachedState>) {
    let status = read_status(link).await;
    let climate = dispatch(link, Command::Climate).await;
    let position = dispatch(link, Command::Position).await;
    let max_position = dispatch(link, Command::MaxPosition).await;

    let mut cached = cached_state.write().await;

    match climate {
        Ok(reply) => cached.apply_climate(Climate::from_reply(&reply)),
        Err(e) => warn!("Failed to read climate: {}", e),
    }
    match max_position {
        Ok(reply) => cached.max_position = Some(reply.value()),
        Err(e) => debug!("Failed to read maximum position: {}", e),
    }

    let mut failed = false;
    match position {
        Ok(reply) => cached.position = Some(reply.value()),
        Err(e) => {
            warn!("Failed to read position: {}", e);
            failed = true;
        }
    }

    let update = match status {
        Ok((status, absolute)) if !failed => cached.apply_status(status, absolute),
        Ok(_) => cached.motion.fail(),
        Err(e) => {
            warn!("Failed to read status: {}", e);
            cached.motion.fail()
        }
    };
    if update == MotionUpdate::TimedOut {
        error!("Focuser did not reach its target in time");
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
