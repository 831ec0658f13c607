//! Shared serial port manager for Pegasus focusers
//!
//! Owns the device link, identifies the controller on connect, polls the
//! status line in the background and tracks motion.

use std::sync::Arc;
use std::time::Duration;

use serial_link::{DeviceLink, MotionState, MotionTracker, MotionUpdate, Poller, SerialPortFactory};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::config::{Config, FocuserConfig, Model, MotorType};
use crate::error::{PegasusError, Result};
use crate::protocol::{
    parse_status_response, validate_ping_response, FocuserStatus, PegasusCommand, FRAMING,
    MAX_SPEED, MIN_SPEED,
};

/// Cached state of the Pegasus controller
#[derive(Debug, Clone)]
pub struct CachedState {
    pub firmware: Option<String>,
    /// Motor type last reported (or selected) on a DMFC
    pub motor: Option<MotorType>,
    pub position: Option<i32>,
    pub temperature: Option<f64>,
    pub led: Option<bool>,
    pub reverse: Option<bool>,
    pub encoders: Option<bool>,
    pub backlash: Option<u32>,
    pub max_speed: Option<u16>,
    pub motion: MotionTracker,
}

impl CachedState {
    fn new(motion_timeout: Duration) -> Self {
        Self {
            firmware: None,
            motor: None,
            position: None,
            temperature: None,
            led: None,
            reverse: None,
            encoders: None,
            backlash: None,
            max_speed: None,
            motion: MotionTracker::new(motion_timeout),
        }
    }

    fn apply_status(&mut self, status: FocuserStatus) -> MotionUpdate {
        self.firmware = Some(status.firmware);
        if status.motor.is_some() {
            self.motor = status.motor;
        }
        self.position = Some(status.position);
        self.temperature = status.temperature;
        self.led = Some(status.led);
        self.reverse = Some(status.reverse);
        self.encoders = Some(status.encoders);
        self.backlash = Some(status.backlash);
        self.motion.observe_moving(status.moving)
    }
}

/// Shared serial port manager for a Pegasus focuser
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
            poller: Poller::new("Pegasus"),
            focuser: config.focuser,
        }
    }

    pub fn model(&self) -> Model {
        self.focuser.model
    }

    /// Connect to the controller.
    ///
    /// The first connection opens the serial port, identifies the controller
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

    /// Whether the focuser only supports relative moves (a DMFC driving a DC motor)
    pub async fn is_relative_only(&self) -> bool {
        if self.focuser.model != Model::Dmfc {
            return false;
        }
        let reported = self.cached_state.read().await.motor;
        reported.or(self.focuser.motor) == Some(MotorType::Dc)
    }

    /// Start a move to an absolute position
    pub async fn move_absolute(&self, position: u32) -> Result<()> {
        self.ensure_available()?;
        if self.is_relative_only().await {
            return Err(PegasusError::Unsupported(
                "Absolute moves with a DC motor".to_string(),
            ));
        }
        self.start_motion(
            Some(i64::from(position)),
            PegasusCommand::MoveAbsolute(position),
        )
        .await
    }

    /// Start a move by a signed number of steps
    pub async fn move_relative(&self, steps: i32) -> Result<()> {
        self.ensure_available()?;
        let target = self
            .cached_state
            .read()
            .await
            .position
            .map(|p| i64::from(p) + i64::from(steps));
        self.start_motion(target, PegasusCommand::MoveRelative(steps))
            .await
    }

    /// Stop the motor
    pub async fn halt(&self) -> Result<()> {
        self.ensure_available()?;
        self.command(PegasusCommand::Halt).await?;
        self.cached_state.write().await.motion.abort();
        debug!("Halt command sent");
        Ok(())
    }

    /// Overwrite the controller's position counter
    pub async fn sync(&self, position: u32) -> Result<()> {
        self.ensure_available()?;
        if self.is_relative_only().await {
            return Err(PegasusError::Unsupported("Sync with a DC motor".to_string()));
        }
        self.command(PegasusCommand::Sync(position)).await?;
        self.cached_state.write().await.position = i32::try_from(position).ok();
        debug!("Position synced to {}", position);
        Ok(())
    }

    pub async fn set_max_speed(&self, speed: u16) -> Result<()> {
        validate_speed(speed)?;
        self.ensure_available()?;
        self.command(PegasusCommand::SetMaxSpeed(speed)).await?;
        self.cached_state.write().await.max_speed = Some(speed);
        Ok(())
    }

    pub async fn set_reverse(&self, reverse: bool) -> Result<()> {
        self.ensure_available()?;
        self.command(PegasusCommand::SetReverse(reverse)).await?;
        self.cached_state.write().await.reverse = Some(reverse);
        Ok(())
    }

    pub async fn set_led(&self, on: bool) -> Result<()> {
        self.ensure_available()?;
        self.command(PegasusCommand::SetLed(on)).await?;
        self.cached_state.write().await.led = Some(on);
        Ok(())
    }

    pub async fn set_encoders(&self, enabled: bool) -> Result<()> {
        self.ensure_available()?;
        self.command(PegasusCommand::SetEncoders(enabled)).await?;
        self.cached_state.write().await.encoders = Some(enabled);
        Ok(())
    }

    /// Set backlash compensation; 0 turns it off
    pub async fn set_backlash(&self, steps: u32) -> Result<()> {
        self.ensure_available()?;
        self.command(PegasusCommand::SetBacklash(steps)).await?;
        self.cached_state.write().await.backlash = Some(steps);
        Ok(())
    }

    /// Select the motor driven by a DMFC
    pub async fn set_motor_type(&self, motor: MotorType) -> Result<()> {
        if self.focuser.model != Model::Dmfc {
            return Err(PegasusError::Unsupported(
                "FocusCube has a fixed stepper motor".to_string(),
            ));
        }
        self.ensure_available()?;
        self.command(PegasusCommand::SetMotorType(motor)).await?;
        self.cached_state.write().await.motor = Some(motor);
        info!("Motor type set to {:?}", motor);
        Ok(())
    }

    /// Read the status line now instead of waiting for the poller
    pub async fn refresh_status(&self) -> Result<()> {
        self.ensure_available()?;
        let status = read_status(&self.link, self.focuser.model).await?;
        if self.cached_state.write().await.apply_status(status) == MotionUpdate::TimedOut {
            error!("Focuser did not reach its target in time");
        }
        Ok(())
    }

    fn ensure_available(&self) -> Result<()> {
        if self.link.is_available() {
            Ok(())
        } else {
            Err(PegasusError::NotConnected)
        }
    }

    async fn start_motion(&self, target: Option<i64>, command: PegasusCommand) -> Result<()> {
        self.cached_state.write().await.motion.begin(target);

        if let Err(e) = self.command(command.clone()).await {
            error!("Failed to start {:?}: {}", command, e);
            self.cached_state.write().await.motion.reject();
            return Err(e);
        }

        debug!("Motion started with {:?}", command);
        Ok(())
    }

    async fn command(&self, command: PegasusCommand) -> Result<()> {
        send_command(&self.link, &command).await
    }

    /// Identify the controller, apply configured settings and read its status
    async fn perform_handshake(&self) -> Result<()> {
        let model = self.focuser.model;
        let frame = self
            .link
            .transact(PegasusCommand::Ping.to_command_string().as_bytes(), &FRAMING)
            .await?;
        validate_ping_response(model, &FRAMING.text(&frame))?;
        debug!("{:?} controller identified", model);

        if let Some(motor) = self.focuser.motor {
            if model == Model::Dmfc {
                self.command(PegasusCommand::SetMotorType(motor)).await?;
            } else {
                warn!("Ignoring motor type for a FocusCube");
            }
        }

        let status = read_status(&self.link, model).await?;
        info!(
            "{:?} firmware {} ready at position {}",
            model, status.firmware, status.position
        );
        self.cached_state.write().await.apply_status(status);

        if let Some(speed) = self.focuser.max_speed {
            validate_speed(speed)?;
            self.command(PegasusCommand::SetMaxSpeed(speed)).await?;
            self.cached_state.write().await.max_speed = Some(speed);
        }
        if let Some(on) = self.focuser.led {
            self.command(PegasusCommand::SetLed(on)).await?;
            self.cached_state.write().await.led = Some(on);
        }
        if let Some(enabled) = self.focuser.encoders {
            self.command(PegasusCommand::SetEncoders(enabled)).await?;
            self.cached_state.write().await.encoders = Some(enabled);
        }
        if let Some(reverse) = self.focuser.reverse {
            self.command(PegasusCommand::SetReverse(reverse)).await?;
            self.cached_state.write().await.reverse = Some(reverse);
        }
        if let Some(steps) = self.focuser.backlash {
            self.command(PegasusCommand::SetBacklash(steps)).await?;
            self.cached_state.write().await.backlash = Some(steps);
        }

        Ok(())
    }

    /// Start background polling of the status line
    async fn start_polling(&self) {
        let link = Arc::clone(&self.link);
        let cached_state = Arc::clone(&self.cached_state);
        let model = self.focuser.model;

        self.poller
            .start(self.polling_interval, move || {
                let link = Arc::clone(&link);
                let cached_state = Arc::clone(&cached_state);
                async move {
                    if link.is_available() {
                        poll_device(&link, model, &cached_state).await;
                    }
                }
            })
            .await;
    }
}

fn validate_speed(speed: u16) -> Result<()> {
    if (MIN_SPEED..=MAX_SPEED).contains(&speed) {
        Ok(())
    } else {
        Err(PegasusError::InvalidValue(format!(
            "Max speed {} out of range [{}, {}]",
            speed, MIN_SPEED, MAX_SPEED
        )))
    }
}

/// Send a command whose one-line reply carries nothing.
///
/// Write failures are errors; a missing reply is only logged.
async fn send_command(link: &DeviceLink, command: &PegasusCommand) -> Result<()> {
    match link
        .transact(command.to_command_string().as_bytes(), &FRAMING)
        .await
    {
        Ok(_) => Ok(()),
        Err(e) if e.is_timeout() => {
            debug!("No reply to {:?}: {}", command, e);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

async fn read_status(link: &DeviceLink, model: Model) -> Result<FocuserStatus> {
    let frame = link
        .transact(PegasusCommand::Status.to_command_string().as_bytes(), &FRAMING)
        .await?;
    parse_status_response(model, &FRAMING.text(&frame))
}

/// One polling pass
async fn poll_device(link: &DeviceLink, model: Model, cached_state: &RwLock<CachedState>) {
    let result = read_status(link, model).await;

    let mut cached = cached_state.write().await;
    let update = match result {
        Ok(status) => cached.apply_status(status),
        Err(e) => {
            warn!("Failed to poll Pegasus focuser: {}", e);
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
            .field("model", &self.focuser.model)
            .field("link", &self.link)
            .field("polling_interval", &self.polling_interval)
            .finish_non_exhaustive()
    }
}
