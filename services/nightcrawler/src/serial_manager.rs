//! Shared serial port manager for the NightCrawler
//!
//! The focuser and rotator devices share one controller and one port. Each
//! motor has its own motion tracker; while a motor is busy the poller asks it
//! whether it is still running. Homing runs both motors at once and ends with
//! an unsolicited `OK#` from the controller, so no other command may be sent
//! while it is under way.

use std::sync::Arc;
use std::time::Duration;

use serial_link::{
    DeviceLink, LinkError, MotionState, MotionTracker, MotionUpdate, Poller, SerialPortFactory,
};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::config::{Config, ControllerConfig};
use crate::error::{NightCrawlerError, Result};
use crate::protocol::{
    is_ack, parse_int, parse_moving, parse_tenths, range360, validate_step_delay, Command,
    LimitSwitches, Model, Motor, RotatorGeometry, ACK_FRAMING, FRAMING, HOMING_DONE,
    POSITION_FRAMING,
};

/// How long one poll listens for the end of a homing run
const HOMING_WAIT: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct CachedState {
    pub firmware: Option<String>,
    pub model: Option<Model>,
    pub geometry: Option<RotatorGeometry>,
    /// Rotation direction is mirrored in the driver, not on the controller
    pub reverse: bool,
    pub focus_position: Option<i32>,
    pub rotator_ticks: Option<i32>,
    pub temperature: Option<f64>,
    pub voltage: Option<f64>,
    pub limits: Option<LimitSwitches>,
    pub focus_step_delay: Option<u32>,
    pub rotator_step_delay: Option<u32>,
    pub homing: bool,
    pub focus_motion: MotionTracker,
    pub rotator_motion: MotionTracker,
}

#[derive(Debug, Clone, Copy)]
struct MotorReading {
    position: i32,
    /// Only asked for while a move is pending
    moving: Option<bool>,
}

#[derive(Debug, Clone, Copy)]
struct Readings {
    temperature: f64,
    voltage: f64,
    limits: LimitSwitches,
    focus: MotorReading,
    rotator: MotorReading,
}

impl CachedState {
    fn new(config: &Config) -> Self {
        Self {
            firmware: None,
            model: None,
            geometry: None,
            reverse: config.rotator.reverse,
            focus_position: None,
            rotator_ticks: None,
            temperature: None,
            voltage: None,
            limits: None,
            focus_step_delay: None,
            rotator_step_delay: None,
            homing: false,
            focus_motion: MotionTracker::new(config.focuser.motion_timeout),
            rotator_motion: MotionTracker::new(config.rotator.motion_timeout),
        }
    }

    /// Rotator angle in degrees with the reverse setting applied
    pub fn rotator_angle(&self) -> Option<f64> {
        Some(self.geometry?.angle_for(self.rotator_ticks?, self.reverse))
    }

    pub fn mechanical_angle(&self) -> Option<f64> {
        Some(self.geometry?.angle_for(self.rotator_ticks?, false))
    }

    /// Angle the rotator is heading for, while a move is pending
    pub fn rotator_target_angle(&self) -> Option<f64> {
        let ticks = i32::try_from(self.rotator_motion.target()?).ok()?;
        Some(self.geometry?.angle_for(ticks, self.reverse))
    }

    pub fn motion(&self, motor: Motor) -> &MotionTracker {
        match motor {
            Motor::Focus => &self.focus_motion,
            Motor::Rotator => &self.rotator_motion,
        }
    }

    fn motion_mut(&mut self, motor: Motor) -> &mut MotionTracker {
        match motor {
            Motor::Focus => &mut self.focus_motion,
            Motor::Rotator => &mut self.rotator_motion,
        }
    }

    fn apply(&mut self, readings: Readings) -> [MotionUpdate; 2] {
        self.temperature = Some(readings.temperature);
        self.voltage = Some(readings.voltage);
        self.limits = Some(readings.limits);
        self.focus_position = Some(readings.focus.position);
        self.rotator_ticks = Some(readings.rotator.position);

        let mut observe = |motor: Motor, reading: MotorReading| match reading.moving {
            Some(moving) => self.motion_mut(motor).observe_moving(moving),
            None => MotionUpdate::Idle,
        };
        [
            observe(Motor::Focus, readings.focus),
            observe(Motor::Rotator, readings.rotator),
        ]
    }

    fn finish_homing(&mut self) {
        self.homing = false;
        self.focus_motion.observe_moving(false);
        self.rotator_motion.observe_moving(false);
    }

    fn abandon_homing(&mut self) {
        self.homing = false;
        self.focus_motion.reject();
        self.rotator_motion.reject();
    }
}

pub struct SerialManager {
    controller: ControllerConfig,
    focus_limit: u32,
    polling_interval: Duration,
    link: Arc<DeviceLink>,
    cached_state: Arc<RwLock<CachedState>>,
    poller: Poller,
}

impl SerialManager {
    pub fn new(config: Config, serial_factory: Arc<dyn SerialPortFactory>) -> Self {
        Self {
            focus_limit: config.focuser.max_step,
            polling_interval: config.serial.polling_interval(),
            link: Arc::new(DeviceLink::new(
                config.serial.link_settings(),
                serial_factory,
            )),
            cached_state: Arc::new(RwLock::new(CachedState::new(&config))),
            poller: Poller::new("NightCrawler"),
            controller: config.controller,
        }
    }

    /// Connect one client. The first one opens the port and starts polling.
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

    pub async fn motion_state(&self, motor: Motor) -> MotionState {
        self.cached_state.read().await.motion(motor).state()
    }

    pub fn focus_limit(&self) -> u32 {
        self.focus_limit
    }

    pub async fn move_focus(&self, position: u32) -> Result<()> {
        if position > self.focus_limit {
            return Err(NightCrawlerError::InvalidValue(format!(
                "Position {} out of range [0, {}]",
                position, self.focus_limit
            )));
        }
        let target = i32::try_from(position)
            .map_err(|_| NightCrawlerError::InvalidValue(format!("Position {}", position)))?;
        self.start_motion(Motor::Focus, target).await
    }

    /// Move the rotator to a sky angle, honouring the reverse setting
    pub async fn move_rotator(&self, angle: f64) -> Result<()> {
        let reverse = self.cached_state.read().await.reverse;
        self.move_rotator_ticks(angle, reverse).await
    }

    pub async fn move_rotator_mechanical(&self, angle: f64) -> Result<()> {
        self.move_rotator_ticks(angle, false).await
    }

    /// Make the current rotator position read as `angle`
    pub async fn sync_rotator(&self, angle: f64) -> Result<()> {
        self.ensure_available()?;
        self.ensure_not_homing().await?;
        let angle = validate_angle(angle)?;
        let (geometry, reverse) = self.rotator_geometry().await?;
        let ticks = geometry.ticks_for(angle, reverse);
        expect_ack(&self.link, Command::Sync(Motor::Rotator, ticks)).await?;
        self.cached_state.write().await.rotator_ticks = Some(ticks);
        info!("Rotator synced to {:.2} degrees ({} ticks)", angle, ticks);
        Ok(())
    }

    pub async fn set_reverse(&self, reverse: bool) -> Result<()> {
        self.ensure_available()?;
        self.cached_state.write().await.reverse = reverse;
        debug!("Rotator reverse set to {}", reverse);
        Ok(())
    }

    /// Stop one motor. Stopping either motor during homing stops both.
    pub async fn halt(&self, motor: Motor) -> Result<()> {
        self.ensure_available()?;
        if self.cached_state.read().await.homing {
            for m in [Motor::Focus, Motor::Rotator] {
                expect_ack(&self.link, Command::Stop(m)).await?;
            }
            let mut cached = self.cached_state.write().await;
            cached.homing = false;
            cached.focus_motion.abort();
            cached.rotator_motion.abort();
            info!("Homing stopped");
            return Ok(());
        }
        expect_ack(&self.link, Command::Stop(motor)).await?;
        self.cached_state.write().await.motion_mut(motor).abort();
        debug!("{:?} motor stopped", motor);
        Ok(())
    }

    pub async fn set_step_delay(&self, motor: Motor, delay: u32) -> Result<()> {
        self.ensure_available()?;
        self.ensure_not_homing().await?;
        write_step_delay(&self.link, motor, delay).await?;
        let mut cached = self.cached_state.write().await;
        match motor {
            Motor::Focus => cached.focus_step_delay = Some(delay),
            Motor::Rotator => cached.rotator_step_delay = Some(delay),
        }
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
            Err(NightCrawlerError::NotConnected)
        }
    }

    async fn ensure_not_homing(&self) -> Result<()> {
        if self.cached_state.read().await.homing {
            Err(NightCrawlerError::Homing)
        } else {
            Ok(())
        }
    }

    async fn rotator_geometry(&self) -> Result<(RotatorGeometry, bool)> {
        let cached = self.cached_state.read().await;
        let geometry = cached.geometry.ok_or_else(|| {
            NightCrawlerError::InvalidResponse("Rotator geometry unknown".to_string())
        })?;
        Ok((geometry, cached.reverse))
    }

    async fn move_rotator_ticks(&self, angle: f64, reverse: bool) -> Result<()> {
        let angle = validate_angle(angle)?;
        let (geometry, _) = self.rotator_geometry().await?;
        self.start_motion(Motor::Rotator, geometry.ticks_for(angle, reverse))
            .await
    }

    async fn start_motion(&self, motor: Motor, target: i32) -> Result<()> {
        self.ensure_available()?;
        self.ensure_not_homing().await?;
        self.cached_state
            .write()
            .await
            .motion_mut(motor)
            .begin(Some(i64::from(target)));

        if let Err(e) = goto(&self.link, motor, target).await {
            error!("Failed to start {:?} move to {}: {}", motor, target, e);
            self.cached_state.write().await.motion_mut(motor).reject();
            return Err(e);
        }
        debug!("{:?} motor moving to {}", motor, target);
        Ok(())
    }

    async fn start_homing(&self) -> Result<()> {
        let mask = Motor::Focus.home_bit() | Motor::Rotator.home_bit();
        expect_ack(&self.link, Command::FindHome(mask)).await?;
        let mut cached = self.cached_state.write().await;
        cached.homing = true;
        cached.focus_motion.begin(None);
        cached.rotator_motion.begin(None);
        info!("Homing focus and rotator");
        Ok(())
    }

    async fn apply_controller_settings(&self) -> Result<()> {
        let c = &self.controller;
        if let Some(offset) = c.temperature_offset {
            self.link
                .send(Command::TemperatureOffset(offset).encode().as_bytes())
                .await?;
        }
        if let Some(enabled) = c.encoders {
            query(&self.link, Command::Encoders(enabled)).await?;
        }
        if let Some(value) = c.display_brightness {
            expect_ack(&self.link, Command::DisplayBrightness(value)).await?;
        }
        if let Some(value) = c.sleep_brightness {
            if value == 0 {
                return Err(NightCrawlerError::InvalidValue(
                    "Sleep brightness must be at least 1".to_string(),
                ));
            }
            expect_ack(&self.link, Command::SleepBrightness(value)).await?;
        }
        for (motor, delay) in [
            (Motor::Focus, c.focus_step_delay),
            (Motor::Rotator, c.rotator_step_delay),
        ] {
            if let Some(delay) = delay {
                write_step_delay(&self.link, motor, delay).await?;
            }
        }
        Ok(())
    }

    async fn perform_handshake(&self) -> Result<()> {
        let firmware = FRAMING.text(&query(&self.link, Command::Firmware).await?);
        let model = Model::from_type(&FRAMING.text(
            &query(&self.link, Command::FocuserType).await?,
        ));
        let steps_per_revolution = self
            .controller
            .custom_steps_per_revolution
            .unwrap_or(model.steps_per_revolution());
        if steps_per_revolution == 0 {
            return Err(NightCrawlerError::InvalidValue(
                "Steps per revolution must be positive".to_string(),
            ));
        }
        let geometry = RotatorGeometry {
            steps_per_revolution,
        };
        info!(
            "NightCrawler firmware {} ({:?}, {} steps per revolution)",
            firmware, model, steps_per_revolution
        );

        self.apply_controller_settings().await?;
        let focus_step_delay = read_step_delay(&self.link, Motor::Focus).await?;
        let rotator_step_delay = read_step_delay(&self.link, Motor::Rotator).await?;
        let readings = read_readings(&self.link, geometry, false, false).await?;

        {
            let mut cached = self.cached_state.write().await;
            cached.firmware = Some(firmware);
            cached.model = Some(model);
            cached.geometry = Some(geometry);
            cached.focus_step_delay = Some(focus_step_delay);
            cached.rotator_step_delay = Some(rotator_step_delay);
            cached.homing = false;
            cached.apply(readings);
        }
        info!(
            "NightCrawler ready: focus at {}, rotator at {} ticks",
            readings.focus.position, readings.rotator.position
        );

        if self.controller.find_home_on_connect {
            self.start_homing().await?;
        }
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

fn validate_angle(angle: f64) -> Result<f64> {
    if angle.is_finite() && (0.0..=360.0).contains(&angle) {
        Ok(range360(angle))
    } else {
        Err(NightCrawlerError::InvalidValue(format!(
            "Angle {} out of range [0, 360]",
            angle
        )))
    }
}

async fn query(link: &DeviceLink, command: Command) -> Result<Vec<u8>> {
    Ok(link.transact(command.encode().as_bytes(), &FRAMING).await?)
}

async fn expect_ack(link: &DeviceLink, command: Command) -> Result<()> {
    let ack = link
        .transact(command.encode().as_bytes(), &ACK_FRAMING)
        .await?;
    if is_ack(&ack) {
        Ok(())
    } else {
        Err(NightCrawlerError::Refused(format!(
            "{:?} answered '{}'",
            command,
            ack.escape_ascii()
        )))
    }
}

/// Load the target, then start the motor. The target is answered with a
/// single byte whose value carries no meaning.
async fn goto(link: &DeviceLink, motor: Motor, target: i32) -> Result<()> {
    link.transact(
        Command::SetTarget(motor, target).encode().as_bytes(),
        &ACK_FRAMING,
    )
    .await?;
    expect_ack(link, Command::Start(motor)).await
}

async fn read_step_delay(link: &DeviceLink, motor: Motor) -> Result<u32> {
    let delay = parse_int(&query(link, Command::GetStepDelay(motor)).await?)?;
    u32::try_from(delay)
        .map_err(|_| NightCrawlerError::InvalidResponse(format!("Step delay {}", delay)))
}

async fn write_step_delay(link: &DeviceLink, motor: Motor, delay: u32) -> Result<()> {
    let delay = validate_step_delay(delay)?;
    expect_ack(link, Command::SetStepDelay(motor, delay)).await?;
    debug!("{:?} step delay set to {}", motor, delay);
    Ok(())
}

async fn read_motor(link: &DeviceLink, motor: Motor, busy: bool) -> Result<MotorReading> {
    let moving = if busy {
        let reply = query(link, Command::IsMoving(motor)).await?;
        Some(parse_moving(&FRAMING.text(&reply))?)
    } else {
        None
    };
    let frame = link
        .transact(
            Command::GetPosition(motor).encode().as_bytes(),
            &POSITION_FRAMING,
        )
        .await?;
    Ok(MotorReading {
        position: parse_int(&frame)?,
        moving,
    })
}

async fn read_readings(
    link: &DeviceLink,
    geometry: RotatorGeometry,
    focus_busy: bool,
    rotator_busy: bool,
) -> Result<Readings> {
    let temperature = parse_tenths(&query(link, Command::Temperature).await?)?;
    let voltage = parse_tenths(&query(link, Command::Voltage).await?)?;
    let bits = parse_int(&query(link, Command::LimitSwitches).await?)?;
    let bits = u8::try_from(bits)
        .map_err(|_| NightCrawlerError::InvalidResponse(format!("Limit switch bits {}", bits)))?;

    let focus = read_motor(link, Motor::Focus, focus_busy).await?;
    let mut rotator = read_motor(link, Motor::Rotator, rotator_busy).await?;
    if geometry.out_of_bounds(rotator.position) {
        let wrapped = geometry.wrap(rotator.position);
        warn!(
            "Rotator at {} ticks is past a full turn, syncing to {}",
            rotator.position, wrapped
        );
        expect_ack(link, Command::Sync(Motor::Rotator, wrapped)).await?;
        rotator.position = wrapped;
    }

    Ok(Readings {
        temperature,
        voltage,
        limits: LimitSwitches::from_bits(bits),
        focus,
        rotator,
    })
}

/// Listen for the end of homing without sending anything, since any command
/// would flush the `OK#` the controller sends when it is done. Returns `true`
/// once homing is over.
async fn check_homing(link: &DeviceLink, cached_state: &RwLock<CachedState>) -> Result<bool> {
    match link.read_within(&FRAMING, HOMING_WAIT).await {
        Ok(frame) => {
            let text = FRAMING.text(&frame);
            if text == HOMING_DONE {
                info!("Homing complete");
                cached_state.write().await.finish_homing();
                return Ok(true);
            }
            debug!("Ignoring '{}' while homing", text);
            Ok(false)
        }
        Err(LinkError::Timeout(_)) => {
            let mut cached = cached_state.write().await;
            let updates = [
                cached.focus_motion.observe_moving(true),
                cached.rotator_motion.observe_moving(true),
            ];
            if updates.contains(&MotionUpdate::TimedOut) {
                error!("Homing did not finish in time");
                cached.abandon_homing();
                return Ok(true);
            }
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

async fn update_state(link: &DeviceLink, cached_state: &RwLock<CachedState>) -> Result<()> {
    let homing = cached_state.read().await.homing;
    if homing && !check_homing(link, cached_state).await? {
        return Ok(());
    }

    let (geometry, focus_busy, rotator_busy) = {
        let cached = cached_state.read().await;
        (
            cached.geometry,
            cached.focus_motion.is_moving(),
            cached.rotator_motion.is_moving(),
        )
    };
    let Some(geometry) = geometry else {
        return Ok(());
    };

    let readings = read_readings(link, geometry, focus_busy, rotator_busy).await?;
    let updates = cached_state.write().await.apply(readings);
    for (motor, update) in [Motor::Focus, Motor::Rotator].into_iter().zip(updates) {
        if update == MotionUpdate::TimedOut {
            error!("{:?} motor did not reach its target in time", motor);
        }
    }
    Ok(())
}

async fn poll_device(link: &DeviceLink, cached_state: &RwLock<CachedState>) {
    if let Err(e) = update_state(link, cached_state).await {
        warn!("Failed to poll NightCrawler: {}", e);
        let mut cached = cached_state.write().await;
        let updates = [cached.focus_motion.fail(), cached.rotator_motion.fail()];
        if updates.contains(&MotionUpdate::TimedOut) {
            error!("Motion did not finish in time");
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
