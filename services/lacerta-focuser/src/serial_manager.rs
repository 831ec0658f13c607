//! Shared serial port manager for Lacerta MFOC controllers
//!
//! The MFOC has no moving flag and no halt: a move is finished when the
//! polled position equals the target. Settings are written blind and then
//! read back to confirm the controller took them.

use std::sync::Arc;
use std::time::Duration;

use serial_link::{DeviceLink, MotionState, MotionTracker, MotionUpdate, Poller, SerialPortFactory};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::config::{Config, FocuserConfig};
use crate::error::{LacertaError, Result};
use crate::protocol::{
    parse_position, parse_reply, validate_max_position, validate_temp_comp, Command,
    TempDirection, FRAMING,
};

const HANDSHAKE_ATTEMPTS: u32 = 3;
const HANDSHAKE_RETRY_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct CachedState {
    pub position: Option<u32>,
    /// Highest position as reported by the controller
    pub max_position: Option<u32>,
    pub backlash: Option<u8>,
    /// Compensation steps per degree, 0 when compensation is off
    pub temp_comp_steps: Option<i32>,
    pub temp_direction: Option<TempDirection>,
    pub start_at_saved: Option<bool>,
    pub motion: MotionTracker,
}

impl CachedState {
    fn new(motion_timeout: Duration) -> Self {
        Self {
            position: None,
            max_position: None,
            backlash: None,
            temp_comp_steps: None,
            temp_direction: None,
            start_at_saved: None,
            motion: MotionTracker::new(motion_timeout),
        }
    }
}

pub struct SerialManager {
    focuser: FocuserConfig,
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
            cached_state: Arc::new(RwLock::new(CachedState::new(
                config.focuser.motion_timeout,
            ))),
            poller: Poller::new("Lacerta MFOC"),
            focuser: config.focuser,
        }
    }

    /// Connect, running the handshake on the first reference
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

    /// Highest reachable position: the controller's own limit once known
    pub async fn limit(&self) -> u32 {
        self.cached_state
            .read()
            .await
            .max_position
            .unwrap_or(self.focuser.max_step)
    }

    /// Start a move to an absolute position
    pub async fn move_absolute(&self, position: u32) -> Result<()> {
        self.ensure_available()?;
        let limit = self.limit().await;
        if position > limit {
            return Err(LacertaError::InvalidValue(format!(
                "Position {} out of range [0, {}]",
                position, limit
            )));
        }

        self.cached_state
            .write()
            .await
            .motion
            .begin(Some(i64::from(position)));

        if let Err(e) = self.send(Command::MoveTo(position)).await {
            error!("Failed to start move to {}: {}", position, e);
            self.cached_state.write().await.motion.reject();
            return Err(e);
        }
        debug!("Move command sent to position {}", position);
        Ok(())
    }

    /// Move by `steps` from the current position, clamped to the travel
    pub async fn move_relative(&self, steps: i64) -> Result<()> {
        self.ensure_available()?;
        let current = self
            .cached_state
            .read()
            .await
            .position
            .ok_or_else(|| LacertaError::InvalidResponse("Position not yet known".to_string()))?;
        let limit = self.limit().await;
        let target = (i64::from(current) + steps).clamp(0, i64::from(limit));
        self.move_absolute(target as u32).await
    }

    pub async fn set_backlash(&self, steps: u8) -> Result<()> {
        self.ensure_available()?;
        write_setting(&self.link, Command::SetBacklash(steps)).await?;
        self.cached_state.write().await.backlash = Some(steps);
        Ok(())
    }

    /// Compensation steps per degree; 0 turns compensation off
    pub async fn set_temp_comp_steps(&self, steps: i32) -> Result<()> {
        let steps = validate_temp_comp(steps)?;
        self.ensure_available()?;
        write_setting(&self.link, Command::SetTempComp(steps)).await?;
        self.cached_state.write().await.temp_comp_steps = Some(steps);
        Ok(())
    }

    /// Turn compensation on with the configured steps per degree, or off
    pub async fn set_temp_comp(&self, enabled: bool) -> Result<()> {
        let steps = if enabled {
            self.focuser.temp_comp_steps
        } else {
            0
        };
        self.set_temp_comp_steps(steps).await
    }

    pub async fn set_temp_direction(&self, direction: TempDirection) -> Result<()> {
        self.ensure_available()?;
        write_setting(&self.link, Command::SetTempDirection(direction)).await?;
        self.cached_state.write().await.temp_direction = Some(direction);
        Ok(())
    }

    pub async fn set_start_at_saved(&self, enabled: bool) -> Result<()> {
        self.ensure_available()?;
        write_setting(&self.link, Command::SetStartAtSaved(enabled)).await?;
        self.cached_state.write().await.start_at_saved = Some(enabled);
        Ok(())
    }

    pub async fn set_max_position(&self, position: u32) -> Result<()> {
        let position = validate_max_position(position)?;
        self.ensure_available()?;
        write_setting(&self.link, Command::SetMaxPosition(position)).await?;
        self.cached_state.write().await.max_position = Some(position);
        Ok(())
    }

    /// Read the position now instead of waiting for the poller
    pub async fn refresh_motion(&self) -> Result<()> {
        self.ensure_available()?;
        let position = read_position(&self.link).await?;
        let mut cached = self.cached_state.write().await;
        cached.position = Some(position);
        cached.motion.observe_position(i64::from(position));
        Ok(())
    }

    fn ensure_available(&self) -> Result<()> {
        if self.link.is_available() {
            Ok(())
        } else {
            Err(LacertaError::NotConnected)
        }
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.link.send(command.encode().as_bytes()).await?;
        Ok(())
    }

    async fn perform_handshake(&self) -> Result<()> {
        let mut position = None;
        for attempt in 1..=HANDSHAKE_ATTEMPTS {
            match read_position(&self.link).await {
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
            LacertaError::HandshakeFailed(format!(
                "No position reply after {} attempts",
                HANDSHAKE_ATTEMPTS
            ))
        })?;

        // Older firmware does not answer these; the driver works without them
        let max_position = read_setting(&self.link, Command::GetMaxPosition)
            .await
            .ok()
            .and_then(|v| u32::try_from(v).ok());
        let temp_comp_steps = read_setting(&self.link, Command::GetTempComp).await.ok();
        debug!(
            "Controller max position {:?}, compensation {:?}",
            max_position, temp_comp_steps
        );

        {
            let mut cached = self.cached_state.write().await;
            cached.position = Some(position);
            cached.max_position = max_position;
            cached.temp_comp_steps = temp_comp_steps;
        }

        if let Some(max_position) = self.focuser.max_position {
            let max_position = validate_max_position(max_position)?;
            write_setting(&self.link, Command::SetMaxPosition(max_position)).await?;
            self.cached_state.write().await.max_position = Some(max_position);
        }
        if let Some(backlash) = self.focuser.backlash {
            write_setting(&self.link, Command::SetBacklash(backlash)).await?;
            self.cached_state.write().await.backlash = Some(backlash);
        }
        if let Some(direction) = self.focuser.temp_direction {
            write_setting(&self.link, Command::SetTempDirection(direction)).await?;
            self.cached_state.write().await.temp_direction = Some(direction);
        }
        if let Some(enabled) = self.focuser.start_at_saved_position {
            write_setting(&self.link, Command::SetStartAtSaved(enabled)).await?;
            self.cached_state.write().await.start_at_saved = Some(enabled);
        }

        info!(
            "Lacerta MFOC ready at position {} (max {})",
            position,
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

async fn read_position(link: &DeviceLink) -> Result<u32> {
    let command = Command::GetPosition;
    let frame = link
        .transact_matching(command.encode().as_bytes(), &FRAMING, |frame| {
            command.accepts(frame)
        })
        .await?;
    parse_position(&FRAMING.text(&frame))
}

async fn read_setting(link: &DeviceLink, query: Command) -> Result<i32> {
    let frame = link
        .transact_matching(query.encode().as_bytes(), &FRAMING, |frame| {
            query.accepts(frame)
        })
        .await?;
    Ok(parse_reply(&FRAMING.text(&frame))?.value)
}

/// Write a setter, then read the value back and insist it matches
async fn write_setting(link: &DeviceLink, command: Command) -> Result<()> {
    link.send(command.encode().as_bytes()).await?;
    let (Some(query), Some(sent)) = (command.read_back(), command.written_value()) else {
        return Ok(());
    };
    let reported = read_setting(link, query).await?;
    if reported != sent {
        return Err(LacertaError::NotConfirmed { sent, reported });
    }
    debug!("{:?} confirmed", command);
    Ok(())
}

async fn poll_device(link: &DeviceLink, cached_state: &RwLock<CachedState>) {
    let result = read_position(link).await;

    let mut cached = cached_state.write().await;
    match result {
        Ok(position) => {
            cached.position = Some(position);
            if cached.motion.observe_position(i64::from(position)) == MotionUpdate::TimedOut {
                error!("Focuser did not reach its target in time");
            }
        }
        Err(e) => {
            warn!("Failed to poll Lacerta MFOC: {}", e);
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
