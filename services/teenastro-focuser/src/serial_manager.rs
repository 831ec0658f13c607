//! Shared serial port manager for TeenAstro focusers
//!
//! The controller reports position, motor speed and temperature in one
//! status reply; a move is over once the reported speed drops to zero.

use std::sync::Arc;
use std::time::Duration;

use serial_link::{DeviceLink, MotionState, MotionTracker, MotionUpdate, Poller, SerialPortFactory};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::config::{Config, FocuserConfig};
use crate::error::{Result, TeenAstroError};
use crate::protocol::{
    parse_ack, parse_motion_settings, parse_motor_settings, parse_status, parse_version,
    Command, ConfigItem, FocuserStatus, MotionSettings, MotorSettings, ACK_FRAMING, FRAMING,
};

/// The controller boots for a while after the port opens
const STARTUP_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct CachedState {
    pub firmware: Option<String>,
    pub position: Option<u32>,
    pub speed: Option<u32>,
    pub temperature: Option<f64>,
    pub settings: Option<MotionSettings>,
    pub motor: Option<MotorSettings>,
    pub motion: MotionTracker,
}

impl CachedState {
    fn new(motion_timeout: Duration) -> Self {
        Self {
            firmware: None,
            position: None,
            speed: None,
            temperature: None,
            settings: None,
            motor: None,
            motion: MotionTracker::new(motion_timeout),
        }
    }

    fn apply_status(&mut self, status: FocuserStatus) -> MotionUpdate {
        self.position = Some(status.position);
        self.speed = Some(status.speed);
        self.temperature = Some(status.temperature);
        self.motion.observe_moving(status.speed > 0)
    }
}

pub struct SerialManager {
    focuser: FocuserConfig,
    polling_interval: Duration,
    startup_delay: Duration,
    link: Arc<DeviceLink>,
    cached_state: Arc<RwLock<CachedState>>,
    poller: Poller,
}

impl SerialManager {
    pub fn new(config: Config, serial_factory: Arc<dyn SerialPortFactory>) -> Self {
        Self {
            polling_interval: config.serial.polling_interval(),
            startup_delay: STARTUP_DELAY,
            link: Arc::new(DeviceLink::new(
                config.serial.link_settings(),
                serial_factory,
            )),
            cached_state: Arc::new(RwLock::new(CachedState::new(
                config.focuser.motion_timeout,
            ))),
            poller: Poller::new("TeenAstro"),
            focuser: config.focuser,
        }
    }

    /// Override the pause between opening the port and the version query
    pub fn with_startup_delay(mut self, delay: Duration) -> Self {
        self.startup_delay = delay;
        self
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

    pub async fn motion_state(&self) -> MotionState {
        self.cached_state.read().await.motion.state()
    }

    /// The controller's max position once read, the configured one before
    pub async fn limit(&self) -> u32 {
        self.cached_state
            .read()
            .await
            .settings
            .map(|s| s.max_position)
            .unwrap_or(self.focuser.max_step)
    }

    pub async fn move_absolute(&self, position: u32) -> Result<()> {
        self.ensure_available()?;
        let limit = self.limit().await;
        if position > limit {
            return Err(TeenAstroError::InvalidValue(format!(
                "Position {} out of range [0, {}]",
                position, limit
            )));
        }
        self.start_motion(Command::GoTo(position), position).await
    }

    /// Move to the controller's park position
    pub async fn park(&self) -> Result<()> {
        self.ensure_available()?;
        let park = self
            .cached_state
            .read()
            .await
            .settings
            .map(|s| s.park_position)
            .ok_or_else(|| TeenAstroError::InvalidResponse("Park position unknown".to_string()))?;
        self.start_motion(Command::Park, park).await
    }

    pub async fn halt(&self) -> Result<()> {
        self.ensure_available()?;
        self.link.send(Command::Stop.encode().as_bytes()).await?;
        self.cached_state.write().await.motion.abort();
        debug!("Stop command sent");
        Ok(())
    }

    /// Make the current position zero
    pub async fn sync_zero(&self) -> Result<()> {
        self.ensure_available()?;
        let ack = self
            .link
            .transact(Command::SyncZero.encode().as_bytes(), &ACK_FRAMING)
            .await?;
        if !parse_ack(&ack) {
            return Err(TeenAstroError::Refused("sync to zero".to_string()));
        }
        self.cached_state.write().await.position = Some(0);
        Ok(())
    }

    /// Write one configuration item, then re-read the group it belongs to
    pub async fn set_item(&self, item: ConfigItem, value: u32) -> Result<()> {
        self.ensure_available()?;
        if item == ConfigItem::MaxPosition {
            let position = self.cached_state.read().await.position.unwrap_or(0);
            if value < position {
                return Err(TeenAstroError::InvalidValue(format!(
                    "Max position {} is below the current position {}",
                    value, position
                )));
            }
        }
        write_item(&self.link, item, value).await?;
        self.read_settings().await
    }

    /// Poll the status now instead of waiting for the poller
    pub async fn refresh_motion(&self) -> Result<()> {
        self.ensure_available()?;
        let status = read_status(&self.link).await?;
        self.cached_state.write().await.apply_status(status);
        Ok(())
    }

    fn ensure_available(&self) -> Result<()> {
        if self.link.is_available() {
            Ok(())
        } else {
            Err(TeenAstroError::NotConnected)
        }
    }

    async fn start_motion(&self, command: Command, target: u32) -> Result<()> {
        self.cached_state
            .write()
            .await
            .motion
            .begin(Some(i64::from(target)));

        if let Err(e) = self.link.send(command.encode().as_bytes()).await {
            error!("Failed to start move to {}: {}", target, e);
            self.cached_state.write().await.motion.reject();
            return Err(e.into());
        }
        debug!("{:?} sent, target {}", command, target);
        Ok(())
    }

    async fn read_settings(&self) -> Result<()> {
        let settings = parse_motion_settings(&query(&self.link, Command::Settings).await?)?;
        let motor = parse_motor_settings(&query(&self.link, Command::Motor).await?)?;
        let mut cached = self.cached_state.write().await;
        cached.settings = Some(settings);
        cached.motor = Some(motor);
        Ok(())
    }

    async fn perform_handshake(&self) -> Result<()> {
        tokio::time::sleep(self.startup_delay).await;

        let firmware = parse_version(&query(&self.link, Command::Version).await?)?;
        info!("TeenAstro focuser firmware {}", firmware);
        let status = read_status(&self.link).await?;

        let configured = [
            (ConfigItem::ParkPosition, self.focuser.park_position),
            (ConfigItem::GoToSpeed, self.focuser.goto_speed),
            (ConfigItem::GoToAcceleration, self.focuser.goto_acceleration),
            (ConfigItem::ManualSpeed, self.focuser.manual_speed),
            (ConfigItem::Invert, self.focuser.invert.map(u32::from)),
            (ConfigItem::Microsteps, self.focuser.microsteps),
            (ConfigItem::CurrentMilliamps, self.focuser.current_ma),
        ];
        for (item, value) in configured {
            if let Some(value) = value {
                write_item(&self.link, item, value).await?;
            }
        }

        {
            let mut cached = self.cached_state.write().await;
            cached.firmware = Some(firmware);
            cached.apply_status(status);
        }
        self.read_settings().await?;

        info!(
            "TeenAstro focuser ready at position {} (max {})",
            status.position,
            self.limit().await
        );
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

async fn query(link: &DeviceLink, command: Command) -> Result<String> {
    let frame = link
        .transact_matching(command.encode().as_bytes(), &FRAMING, |frame| {
            command.accepts(frame)
        })
        .await?;
    Ok(FRAMING.text(&frame))
}

async fn read_status(link: &DeviceLink) -> Result<FocuserStatus> {
    parse_status(&query(link, Command::State).await?)
}

async fn write_item(link: &DeviceLink, item: ConfigItem, value: u32) -> Result<()> {
    let wire = item.wire_value(value)?;
    let ack = link
        .transact(Command::Set(item, wire).encode().as_bytes(), &ACK_FRAMING)
        .await?;
    if !parse_ack(&ack) {
        return Err(TeenAstroError::Refused(format!("{:?} = {}", item, value)));
    }
    debug!("{:?} set to {}", item, value);
    Ok(())
}

async fn poll_device(link: &DeviceLink, cached_state: &RwLock<CachedState>) {
    let result = read_status(link).await;

    let mut cached = cached_state.write().await;
    let update = match result {
        Ok(status) => cached.apply_status(status),
        Err(e) => {
            warn!("Failed to poll TeenAstro focuser: {}", e);
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
