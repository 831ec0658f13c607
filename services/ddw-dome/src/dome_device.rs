//! DDW controller as an Alpaca dome
//!
//! Azimuth moves to whole degrees. The controller has no altitude axis, no
//! sync and no telescope slaving.

use std::fmt;
use std::sync::Arc;

use ascom_alpaca::api::{Device, Dome, ShutterState};
use ascom_alpaca::{ASCOMError, ASCOMErrorCode, ASCOMResult};
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::DomeConfig;
use crate::error::DdwError;
use crate::protocol::ShutterStatus;
use crate::serial_manager::SerialManager;

macro_rules! ensure_connected {
    ($self:ident) => {
        if !$self.connected().await.is_ok_and(|connected| connected) {
            debug!("Dome device not connected");
            return Err(ASCOMError::NOT_CONNECTED);
        }
    };
}

pub struct DdwDomeDevice {
    config: DomeConfig,
    requested_connection: Arc<RwLock<bool>>,
    serial_manager: Arc<SerialManager>,
}

impl fmt::Debug for DdwDomeDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DdwDomeDevice")
            .field("config", &self.config)
            .field("requested_connection", &self.requested_connection)
            .finish_non_exhaustive()
    }
}

impl DdwDomeDevice {
    pub fn new(config: DomeConfig, serial_manager: Arc<SerialManager>) -> Self {
        Self {
            config,
            requested_connection: Arc::new(RwLock::new(false)),
            serial_manager,
        }
    }

    fn to_ascom_error(err: DdwError) -> ASCOMError {
        err.to_ascom_error()
    }

    /// Poll now if something is moving, so callers waiting on a motion see it end
    async fn refresh_if_moving(&self) -> ASCOMResult<()> {
        if self.serial_manager.get_cached_state().await.is_moving() {
            self.serial_manager
                .refresh_motion()
                .await
                .map_err(Self::to_ascom_error)?;
        }
        Ok(())
    }
}

fn shutter_state(status: ShutterStatus) -> ShutterState {
    match status {
        ShutterStatus::Open => ShutterState::Open,
        ShutterStatus::Closed => ShutterState::Closed,
        ShutterStatus::Opening => ShutterState::Opening,
        ShutterStatus::Closing => ShutterState::Closing,
        ShutterStatus::Error => ShutterState::Error,
    }
}

#[async_trait]
impl Device for DdwDomeDevice {
    fn static_name(&self) -> &str {
        &self.config.name
    }

    fn unique_id(&self) -> &str {
        &self.config.unique_id
    }

    async fn description(&self) -> ASCOMResult<String> {
        Ok(self.config.description.clone())
    }

    async fn connected(&self) -> ASCOMResult<bool> {
        let requested = *self.requested_connection.read().await;
        Ok(requested && self.serial_manager.is_available())
    }

    async fn set_connected(&self, connected: bool) -> ASCOMResult<()> {
        if self.connected().await? == connected {
            return Ok(());
        }
        if connected {
            self.serial_manager
                .connect()
                .await
                .map_err(Self::to_ascom_error)?;
            *self.requested_connection.write().await = true;
            debug!("Dome device connected");
        } else {
            *self.requested_connection.write().await = false;
            self.serial_manager.disconnect().await;
            debug!("Dome device disconnected");
        }
        Ok(())
    }

    async fn driver_info(&self) -> ASCOMResult<String> {
        Ok("DDW Dome Driver - ASCOM Alpaca interface for Digital Dome Works controllers".to_string())
    }

    async fn driver_version(&self) -> ASCOMResult<String> {
        Ok(env!("CARGO_PKG_VERSION").to_string())
    }
}

#[async_trait]
impl Dome for DdwDomeDevice {
    async fn altitude(&self) -> ASCOMResult<f64> {
        Err(ASCOMError::NOT_IMPLEMENTED)
    }

    async fn at_home(&self) -> ASCOMResult<bool> {
        ensure_connected!(self);
        Ok(self.serial_manager.get_cached_state().await.at_home())
    }

    async fn at_park(&self) -> ASCOMResult<bool> {
        ensure_connected!(self);
        Ok(self.serial_manager.get_cached_state().await.at_park)
    }

    async fn azimuth(&self) -> ASCOMResult<f64> {
        ensure_connected!(self);
        self.serial_manager
            .get_cached_state()
            .await
            .azimuth()
            .ok_or_else(|| {
                ASCOMError::new(ASCOMErrorCode::INVALID_OPERATION, "Azimuth not yet available")
            })
    }

    async fn can_find_home(&self) -> ASCOMResult<bool> {
        Ok(true)
    }

    async fn can_park(&self) -> ASCOMResult<bool> {
        Ok(true)
    }

    async fn can_set_altitude(&self) -> ASCOMResult<bool> {
        Ok(false)
    }

    async fn can_set_azimuth(&self) -> ASCOMResult<bool> {
        Ok(true)
    }

    async fn can_set_park(&self) -> ASCOMResult<bool> {
        Ok(true)
    }

    async fn can_set_shutter(&self) -> ASCOMResult<bool> {
        Ok(true)
    }

    async fn can_slave(&self) -> ASCOMResult<bool> {
        Ok(false)
    }

    async fn can_sync_azimuth(&self) -> ASCOMResult<bool> {
        Ok(false)
    }

    async fn shutter_status(&self) -> ASCOMResult<ShutterState> {
        ensure_connected!(self);
        self.refresh_if_moving().await?;
        Ok(shutter_state(
            self.serial_manager.get_cached_state().await.shutter,
        ))
    }

    async fn slaved(&self) -> ASCOMResult<bool> {
        ensure_connected!(self);
        Ok(false)
    }

    async fn set_slaved(&self, slaved: bool) -> ASCOMResult<()> {
        ensure_connected!(self);
        if slaved {
            return Err(ASCOMError::NOT_IMPLEMENTED);
        }
        Ok(())
    }

    async fn slewing(&self) -> ASCOMResult<bool> {
        ensure_connected!(self);
        self.refresh_if_moving().await?;
        Ok(self.serial_manager.get_cached_state().await.is_moving())
    }

    async fn abort_slew(&self) -> ASCOMResult<()> {
        ensure_connected!(self);
        self.serial_manager
            .abort()
            .await
            .map_err(Self::to_ascom_error)
    }

    async fn close_shutter(&self) -> ASCOMResult<()> {
        ensure_connected!(self);
        self.serial_manager
            .close_shutter()
            .await
            .map_err(Self::to_ascom_error)
    }

    async fn find_home(&self) -> ASCOMResult<()> {
        ensure_connected!(self);
        self.serial_manager
            .find_home()
            .await
            .map_err(Self::to_ascom_error)
    }

    async fn open_shutter(&self) -> ASCOMResult<()> {
        ensure_connected!(self);
        self.serial_manager
            .open_shutter()
            .await
            .map_err(Self::to_ascom_error)
    }

    async fn park(&self) -> ASCOMResult<()> {
        ensure_connected!(self);
        self.serial_manager
            .park()
            .await
            .map_err(Self::to_ascom_error)
    }

    async fn set_park(&self) -> ASCOMResult<()> {
        ensure_connected!(self);
        self.serial_manager
            .set_park()
            .await
            .map_err(Self::to_ascom_error)
    }

    async fn slew_to_altitude(&self, _altitude: f64) -> ASCOMResult<()> {
        Err(ASCOMError::NOT_IMPLEMENTED)
    }

    async fn slew_to_azimuth(&self, azimuth: f64) -> ASCOMResult<()> {
        ensure_connected!(self);
        self.serial_manager
            .slew_to_azimuth(azimuth)
            .await
            .map_err(Self::to_ascom_error)
    }

    async fn sync_to_azimuth(&self, _azimuth: f64) -> ASCOMResult<()> {
        Err(ASCOMError::NOT_IMPLEMENTED)
    }
}
