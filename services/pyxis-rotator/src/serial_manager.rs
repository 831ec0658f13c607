//! Shared serial port manager for the Pyxis rotator
//!
//! Owns the device link and the rotator state. While a move or homing run is
//! in progress the poller consumes the rotator's progress stream; otherwise
//! it reads the position angle.

use std::sync::Arc;
use std::time::Duration;

use serial_link::{DeviceLink, MotionState, MotionTracker, MotionUpdate, Poller, SerialPortFactory};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::config::{Config, RotatorConfig};
use crate::error::{PyxisError, Result};
use crate::protocol::{
    check_ack, classify_progress, normalize_degrees, parse_position_angle, parse_reverse,
    parse_version, step_angle, travel_direction, Command, Model, Progress, BYTE_FRAMING,
    MAX_ROTATION_RATE, TRIPLET_FRAMING,
};

/// How long a polling pass waits for the next progress batch
const PROGRESS_WAIT: Duration = Duration::from_millis(100);

/// Cap on progress batches consumed by one polling pass; a full turn
const MAX_BATCHES_PER_POLL: usize = 360;

/// Cached state of the Pyxis rotator
#[derive(Debug, Clone)]
pub struct CachedState {
    pub firmware: Option<String>,
    pub model: Model,
    /// Mechanical position angle in whole degrees
    pub mechanical_position: Option<u16>,
    pub reverse: Option<bool>,
    pub rotation_rate: Option<u8>,
    pub asleep: bool,
    /// Degrees added to the mechanical angle to get the sky angle
    pub sync_offset: f64,
    /// Sky angle of the last requested move
    pub target_position: Option<f64>,
    /// +1 or -1 while moving
    pub direction: i16,
    pub motion: MotionTracker,
}

impl CachedState {
    fn new(motion_timeout: Duration) -> Self {
        Self {
            firmware: None,
            model: Model::TwoInch,
            mechanical_position: None,
            reverse: None,
            rotation_rate: None,
            asleep: false,
            sync_offset: 0.0,
            target_position: None,
            direction: 1,
            motion: MotionTracker::new(motion_timeout),
        }
    }

    /// Sky position angle in `[0, 360)`
    pub fn position(&self) -> Option<f64> {
        self.mechanical_position
            .map(|mechanical| normalize_degrees(f64::from(mechanical) + self.sync_offset))
    }
}

/// Shared serial port manager for a Pyxis rotator
pub struct SerialManager {
    rotator: RotatorConfig,
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
                config.rotator.motion_timeout,
            ))),
            poller: Poller::new("Pyxis"),
            rotator: config.rotator,
        }
    }

    /// Connect to the rotator.
    ///
    /// The first connection opens the serial port, identifies the model,
    /// applies configured settings and starts polling.
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

    /// Rotate to a mechanical position angle
    pub async fn move_mechanical(&self, angle: f64) -> Result<()> {
        let target = whole_degrees(angle)?;
        let sky = {
            let cached = self.cached_state.read().await;
            normalize_degrees(f64::from(target) + cached.sync_offset)
        };
        self.start_motion(Command::GotoPositionAngle(target), Some(target), sky)
            .await
    }

    /// Rotate to a sky position angle
    pub async fn move_absolute(&self, sky: f64) -> Result<()> {
        check_angle(sky)?;
        let offset = self.cached_state.read().await.sync_offset;
        let target = whole_degrees(normalize_degrees(sky - offset))?;
        self.start_motion(
            Command::GotoPositionAngle(target),
            Some(target),
            normalize_degrees(sky),
        )
        .await
    }

    /// Rotate to the home position (mechanical 0)
    pub async fn home(&self) -> Result<()> {
        let sky = normalize_degrees(self.cached_state.read().await.sync_offset);
        self.start_motion(Command::Home, None, sky).await
    }

    /// Make the current mechanical angle read as `sky`
    pub async fn sync(&self, sky: f64) -> Result<()> {
        self.ensure_available()?;
        check_angle(sky)?;
        let mut cached = self.cached_state.write().await;
        let mechanical = cached.mechanical_position.ok_or_else(|| {
            PyxisError::InvalidResponse("Position angle not yet known".to_string())
        })?;
        cached.sync_offset = normalize_degrees(sky - f64::from(mechanical));
        info!(
            "Synced mechanical angle {} to sky angle {} (offset {})",
            mechanical, sky, cached.sync_offset
        );
        Ok(())
    }

    pub async fn set_reverse(&self, reverse: bool) -> Result<()> {
        self.ensure_available()?;
        self.link
            .send(Command::SetReverse(reverse).encode().as_bytes())
            .await?;
        self.cached_state.write().await.reverse = Some(reverse);
        debug!("Reverse set to {}", reverse);
        Ok(())
    }

    pub async fn set_rotation_rate(&self, rate: u8) -> Result<()> {
        self.ensure_available()?;
        if rate > MAX_ROTATION_RATE {
            return Err(PyxisError::InvalidValue(format!(
                "Rotation rate {} out of range [0, {}]",
                rate, MAX_ROTATION_RATE
            )));
        }
        apply_rate(&self.link, rate).await?;
        self.cached_state.write().await.rotation_rate = Some(rate);
        Ok(())
    }

    /// Put the rotator to sleep; it ignores motion commands until woken
    pub async fn sleep(&self) -> Result<()> {
        self.ensure_available()?;
        if self.cached_state.read().await.motion.is_moving() {
            return Err(PyxisError::Moving);
        }
        self.link.send(Command::Sleep.encode().as_bytes()).await?;
        self.cached_state.write().await.asleep = true;
        info!("Rotator asleep");
        Ok(())
    }

    pub async fn wake(&self) -> Result<()> {
        self.ensure_available()?;
        let reply = self
            .link
            .transact(Command::Wake.encode().as_bytes(), &BYTE_FRAMING)
            .await?;
        check_ack(Command::Wake, &reply)?;
        self.cached_state.write().await.asleep = false;
        info!("Rotator awake");
        Ok(())
    }

    /// One polling pass, as the background poller would run it
    pub async fn refresh_motion(&self) -> Result<()> {
        self.ensure_available()?;
        poll_device(&self.link, &self.cached_state).await;
        Ok(())
    }

    fn ensure_available(&self) -> Result<()> {
        if self.link.is_available() {
            Ok(())
        } else {
            Err(PyxisError::NotConnected)
        }
    }

    async fn start_motion(&self, command: Command, target: Option<u16>, sky: f64) -> Result<()> {
        self.ensure_available()?;
        {
            let mut cached = self.cached_state.write().await;
            if cached.asleep {
                return Err(PyxisError::Asleep);
            }
            if cached.motion.is_moving() {
                return Err(PyxisError::Moving);
            }
            let current = cached.mechanical_position.unwrap_or_default();
            cached.direction = travel_direction(current, target.unwrap_or(0));
            cached.target_position = Some(sky);
            cached.motion.begin(target.map(i64::from));
        }

        if let Err(e) = self.link.send(command.encode().as_bytes()).await {
            error!("Failed to start {:?}: {}", command, e);
            self.cached_state.write().await.motion.reject();
            return Err(e.into());
        }

        debug!("Started {:?}", command);
        Ok(())
    }

    /// Link, read reverse state and firmware, then apply configured settings
    async fn perform_handshake(&self) -> Result<()> {
        let reply = self
            .link
            .transact(Command::Link.encode().as_bytes(), &BYTE_FRAMING)
            .await?;
        check_ack(Command::Link, &reply)?;

        let reply = self
            .link
            .transact(Command::ReverseStatus.encode().as_bytes(), &BYTE_FRAMING)
            .await?;
        let mut reverse = parse_reverse(&reply);

        let reply = self
            .link
            .transact(Command::Version.encode().as_bytes(), &TRIPLET_FRAMING)
            .await?;
        let firmware = parse_version(&reply);
        let model = match &firmware {
            Some(version) => Model::from_firmware(version),
            None => {
                warn!("Rotator did not report a firmware version, assuming the 2 inch model");
                Model::TwoInch
            }
        };

        let rate = self
            .rotator
            .rotation_rate
            .unwrap_or_else(|| model.default_rate())
            .min(MAX_ROTATION_RATE);
        apply_rate(&self.link, rate).await?;

        if let Some(half_step) = self.rotator.half_step {
            self.link
                .send(Command::SetHalfStep(half_step).encode().as_bytes())
                .await?;
        }
        if let Some(configured) = self.rotator.reverse {
            if configured != reverse {
                self.link
                    .send(Command::SetReverse(configured).encode().as_bytes())
                    .await?;
                reverse = configured;
            }
        }

        let angle = read_position_angle(&self.link).await?;

        let mut cached = self.cached_state.write().await;
        cached.firmware = firmware;
        cached.model = model;
        cached.reverse = Some(reverse);
        cached.rotation_rate = Some(rate);
        cached.mechanical_position = Some(angle);
        cached.asleep = false;

        info!(
            "Pyxis {:?} ready (firmware {:?}) at {} degrees",
            model, cached.firmware, angle
        );
        Ok(())
    }

    /// Start background polling for progress and position angle
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

fn check_angle(angle: f64) -> Result<()> {
    if angle.is_finite() && (0.0..360.0).contains(&angle) {
        Ok(())
    } else {
        Err(PyxisError::InvalidValue(format!(
            "Angle {} out of range [0, 360)",
            angle
        )))
    }
}

fn whole_degrees(angle: f64) -> Result<u16> {
    check_angle(angle)?;
    Ok((angle.round() as u16) % 360)
}

async fn apply_rate(link: &DeviceLink, rate: u8) -> Result<()> {
    let command = Command::SetRate(rate);
    let reply = link
        .transact(command.encode().as_bytes(), &BYTE_FRAMING)
        .await?;
    check_ack(command, &reply)?;
    debug!("Rotation rate set to {}", rate);
    Ok(())
}

async fn read_position_angle(link: &DeviceLink) -> Result<u16> {
    let reply = link
        .transact(Command::GetPositionAngle.encode().as_bytes(), &TRIPLET_FRAMING)
        .await?;
    parse_position_angle(&reply)
}

/// One polling pass. Asleep rotators are left alone; a pending motion drains
/// the progress stream, otherwise the position angle is refreshed.
async fn poll_device(link: &DeviceLink, cached_state: &RwLock<CachedState>) {
    let (asleep, moving, model) = {
        let cached = cached_state.read().await;
        (cached.asleep, cached.motion.is_moving(), cached.model)
    };
    if asleep {
        return;
    }

    if !moving {
        match read_position_angle(link).await {
            Ok(angle) => cached_state.write().await.mechanical_position = Some(angle),
            Err(e) => warn!("Failed to read position angle: {}", e),
        }
        return;
    }

    let update = drain_progress(link, cached_state, model).await;
    match update {
        MotionUpdate::Completed => {
            info!("Rotation complete");
            match read_position_angle(link).await {
                Ok(angle) => cached_state.write().await.mechanical_position = Some(angle),
                Err(e) => warn!("Failed to read position angle after rotation: {}", e),
            }
        }
        MotionUpdate::TimedOut => error!("Rotator did not finish in time"),
        _ => {}
    }
}

/// Consume every progress batch that has arrived since the last pass.
///
/// The rotator streams one batch per degree no matter how often it is
/// polled, so reading a single batch per pass would fall behind. Stops at
/// `F`, once the stream goes quiet for [`PROGRESS_WAIT`], or after
/// [`MAX_BATCHES_PER_POLL`] batches.
async fn drain_progress(
    link: &DeviceLink,
    cached_state: &RwLock<CachedState>,
    model: Model,
) -> MotionUpdate {
    let framing = model.progress_framing();
    let mut update = MotionUpdate::InProgress;

    for _ in 0..MAX_BATCHES_PER_POLL {
        let progress = link.read_within(&framing, PROGRESS_WAIT).await;
        let mut cached = cached_state.write().await;
        let more = match progress {
            Ok(frame) => match classify_progress(&frame, model.progress_per_degree()) {
                Progress::Finished => {
                    update = cached.motion.observe_moving(false);
                    false
                }
                Progress::Degree => {
                    let current = cached.mechanical_position.unwrap_or_default();
                    cached.mechanical_position = Some(step_angle(current, cached.direction));
                    update = cached.motion.observe_moving(true);
                    true
                }
                Progress::Partial => {
                    update = cached.motion.observe_moving(true);
                    false
                }
            },
            Err(e) if e.is_timeout() => {
                update = cached.motion.observe_moving(true);
                false
            }
            Err(e) => {
                warn!("Failed to read rotation progress: {}", e);
                update = cached.motion.fail();
                false
            }
        };
        if !more || update != MotionUpdate::InProgress {
            break;
        }
    }

    update
}

impl std::fmt::Debug for SerialManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialManager")
            .field("rotator", &self.rotator)
            .field("link", &self.link)
            .field("polling_interval", &self.polling_interval)
            .finish_non_exhaustive()
    }
}
