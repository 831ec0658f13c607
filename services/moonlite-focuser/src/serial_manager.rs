//! Shared serial port manager for MoonLite controllers
//!
//! Owns the device link, performs the connect handshake, polls position and
//! temperature in the background and tracks motion started by `move_absolute`.

use std::sync::Arc;
use std::time::Duration;

use serial_link::{DeviceLink, MotionState, MotionTracker, MotionUpdate, Poller, SerialPortFactory};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::config::{Config, FocuserConfig};
use crate::error::{MoonliteError, Result};
use crate::protocol::{
    parse_moving, parse_position, parse_speed, parse_step_mode, parse_temperature, Command,
    FRAMING, MAX_POSITION, MAX_SPEED, MIN_SPEED,
};

/// Connection attempts made before the handshake gives up
const HANDSHAKE_ATTEMPTS: u32 = 3;
const HANDSHAKE_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Cached state of the MoonLite controller
#[derive(Debug, Clone)]
pub struct CachedState {
    /// Current focuser position
    pub position: Option<u16>,
    /// Temperature in degrees Celsius
    pub temperature: Option<f64>,
    /// Motor speed setting (1 fastest, 5 slowest)
    pub speed: Option<u8>,
    /// Whether the motor is half stepping
    pub half_step: Option<bool>,
    /// Whether temperature compensation was enabled through this driver
    pub temp_comp: bool,
    pub motion: MotionTracker,
}

impl CachedState {
    fn new(motion_timeout: Duration) -> Self {
        Self {
            position: None,
            temperature: None,
            speed: None,
            half_step: None,
            temp_comp: false,
            motion: MotionTracker::new(motion_timeout),
        }
    }
}

/// Shared serial port manager for a MoonLite controller
pub struct SerialManager {
    focuser: FocuserConfig,
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
            poller: Poller::new("MoonLite"),
            focuser: config.focuser,
        }
    }

    /// Connect to the controller.
    ///
    /// The first connection opens the serial port, runs the handshake and
    /// starts polling; later connections only add a reference.
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

    /// Check if the serial port is available
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

    /// Start a move to an absolute position
    pub async fn move_absolute(&self, position: u16) -> Result<()> {
        self.ensure_available()?;

        self.cached_state
            .write()
            .await
            .motion
            .begin(Some(i64::from(position)));

        let result = async {
            self.send(Command::SetTarget { position }).await?;
            self.send(Command::Go).await
        }
        .await;

        if let Err(e) = result {
            error!("Failed to start move to {}: {}", position, e);
            self.cached_state.write().await.motion.reject();
            return Err(e);
        }

        debug!("Move command sent to position {}", position);
        Ok(())
    }

    /// Stop the motor
    pub async fn halt(&self) -> Result<()> {
        self.ensure_available()?;
        self.send(Command::Stop).await?;
        self.cached_state.write().await.motion.abort();
        debug!("Halt command sent");
        Ok(())
    }

    /// Overwrite the controller's position counter
    pub async fn sync(&self, position: u16) -> Result<()> {
        self.ensure_available()?;
        self.send(Command::Sync { position }).await?;
        self.cached_state.write().await.position = Some(position);
        debug!("Position synced to {}", position);
        Ok(())
    }

    /// Set the motor speed (1 fastest to 5 slowest)
    pub async fn set_speed(&self, speed: u8) -> Result<()> {
        if !(MIN_SPEED..=MAX_SPEED).contains(&speed) {
            return Err(MoonliteError::InvalidValue(format!(
                "Speed {} out of range [{}, {}]",
                speed, MIN_SPEED, MAX_SPEED
            )));
        }
        self.ensure_available()?;
        self.send(Command::SetSpeed { speed }).await?;
        self.cached_state.write().await.speed = Some(speed);
        debug!("Speed set to {}", speed);
        Ok(())
    }

    /// Select half or full stepping
    pub async fn set_half_step(&self, half_step: bool) -> Result<()> {
        self.ensure_available()?;
        self.send(Command::SetStepMode { half_step }).await?;
        self.cached_state.write().await.half_step = Some(half_step);
        debug!("Half step set to {}", half_step);
        Ok(())
    }

    /// Enable or disable the controller's temperature compensation
    pub async fn set_temp_comp(&self, enabled: bool) -> Result<()> {
        self.ensure_available()?;
        self.send(Command::SetTempComp { enabled }).await?;
        self.cached_state.write().await.temp_comp = enabled;
        debug!("Temperature compensation set to {}", enabled);
        Ok(())
    }

    pub async fn set_temperature_calibration(&self, offset: f64) -> Result<()> {
        self.ensure_available()?;
        self.send(Command::SetTempCalibration { offset }).await
    }

    pub async fn set_temperature_coefficient(&self, coefficient: f64) -> Result<()> {
        self.ensure_available()?;
        self.send(Command::SetTempCoefficient { coefficient })
            .await
    }

    /// Query the moving flag and position now instead of waiting for the poller.
    ///
    /// Used by `is_moving()` so clients see completion without polling lag.
    pub async fn refresh_motion(&self) -> Result<()> {
        self.ensure_available()?;

        let moving = parse_moving(&query(&self.link, Command::IsMoving).await?)?;
        let position = parse_position(&query(&self.link, Command::GetPosition).await?)?;

        let mut cached = self.cached_state.write().await;
        cached.position = Some(position);
        cached.motion.observe_moving(moving);
        Ok(())
    }

    fn ensure_available(&self) -> Result<()> {
        if self.link.is_available() {
            Ok(())
        } else {
            Err(MoonliteError::NotConnected)
        }
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.link.send(command.encode().as_bytes()).await?;
        Ok(())
    }

    /// Confirm the controller answers, read its settings and apply configured ones
    async fn perform_handshake(&self) -> Result<()> {
        let mut position = None;
        for attempt in 1..=HANDSHAKE_ATTEMPTS {
            match query(&self.link, Command::GetPosition)
                .await
                .and_then(|payload| parse_position(&payload))
            {
                Ok(p) => {
                    position = Some(p);
                    break;
                }
                Err(e) => {
                    warn!("Handshake attempt {} failed: {}", attempt, e);
                    if attempt < HANDSHAKE_ATTEMPTS {
                        tokio::time::sleep(HANDSHAKE_RETRY_DELAY).await;
                    }
                }
            }
        }
        let position = position.ok_or_else(|| {
            MoonliteError::HandshakeFailed(format!(
                "No position reply after {} attempts",
                HANDSHAKE_ATTEMPTS
            ))
        })?;
        debug!("Initial position: {}", position);

        let temperature = read_temperature(&self.link).await?;
        let speed = parse_speed(&query(&self.link, Command::GetSpeed).await?)?;
        let half_step = parse_step_mode(&query(&self.link, Command::GetStepMode).await?)?;
        debug!(
            "Initial temperature: {}°C, speed: {}, half step: {}",
            temperature, speed, half_step
        );

        {
            let mut cached = self.cached_state.write().await;
            cached.position = Some(position);
            cached.temperature = Some(temperature);
            cached.speed = Some(speed);
            cached.half_step = Some(half_step);
        }

        if let Some(speed) = self.focuser.speed {
            if !(MIN_SPEED..=MAX_SPEED).contains(&speed) {
                return Err(MoonliteError::InvalidValue(format!(
                    "Configured speed {} out of range [{}, {}]",
                    speed, MIN_SPEED, MAX_SPEED
                )));
            }
            self.send(Command::SetSpeed { speed }).await?;
            self.cached_state.write().await.speed = Some(speed);
        }
        if let Some(half_step) = self.focuser.half_step {
            self.send(Command::SetStepMode { half_step }).await?;
            self.cached_state.write().await.half_step = Some(half_step);
        }
        if let Some(offset) = self.focuser.temperature_calibration {
            self.send(Command::SetTempCalibration { offset }).await?;
        }
        if let Some(coefficient) = self.focuser.temperature_coefficient {
            self.send(Command::SetTempCoefficient { coefficient })
                .await?;
        }

        info!(
            "MoonLite focuser ready at position {} (max {})",
            position,
            self.focuser.max_step.min(MAX_POSITION)
        );
        Ok(())
    }

    /// Start background polling for position, temperature and motion
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

/// Send a query and return the reply payload without the `#`
async fn query(link: &DeviceLink, command: Command) -> Result<String> {
    let frame = link
        .transact_matching(command.encode().as_bytes(), &FRAMING, |frame| {
            command.accepts(frame)
        })
        .await?;
    Ok(FRAMING.text(&frame))
}

/// Trigger a conversion, then read the temperature
async fn read_temperature(link: &DeviceLink) -> Result<f64> {
    link.send(Command::ConvertTemperature.encode().as_bytes())
        .await?;
    parse_temperature(&query(link, Command::GetTemperature).await?)
}

/// One polling pass
async fn poll_device(link: &DeviceLink, cached_state: &RwLock<CachedState>) {
    let moving_pending = cached_state.read().await.motion.is_moving();

    let result = async {
        let position = parse_position(&query(link, Command::GetPosition).await?)?;
        let temperature = read_temperature(link).await?;
        let moving = if moving_pending {
            Some(parse_moving(&query(link, Command::IsMoving).await?)?)
        } else {
            None
        };
        Ok::<_, MoonliteError>((position, temperature, moving))
    }
    .await;

    let mut cached = cached_state.write().await;
    match result {
        Ok((position, temperature, moving)) => {
            cached.position = Some(position);
            cached.temperature = Some(temperature);
            if let Some(moving) = moving {
                if cached.motion.observe_moving(moving) == MotionUpdate::TimedOut {
                    error!("Focuser did not reach its target in time");
                }
            }
        }
        Err(e) => {
            warn!("Failed to poll MoonLite focuser: {}", e);
            if cached.motion.fail() == MotionUpdate::TimedOut {
                error!("Focuser did not reach its target in time");
            }
        }
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
