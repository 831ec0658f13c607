//! Dream Focuser device implementation
//!
//! Implements the ASCOM Alpaca Device and Focuser traits on top of the
//! shared [`SerialManager`].

use std::fmt;
use std::sync::Arc;

use ascom_alpaca::api::{Device, Focuser};
use ascom_alpaca::{ASCOMError, ASCOMErrorCode, ASCOMResult};
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::FocuserConfig;
use crate::error::DreamError;
use crate::serial_manager::SerialManager;

/// Guard macro that returns NOT_CONNECTED if the device is not connected.
macro_rules! ensure_connected {
    ($self:ident) => {
        if !$self.connected().await.is_ok_and(|connected| connected) {
            debug!("Focuser device not connected");
            return Err(ASCOMError::NOT_CONNECTED);
        }
    };
}

/// Dream Focuser device for ASCOM Alpaca
pub struct DreamFocuserDevice {
    config: FocuserConfig,
    requested_connection: Arc<RwLock<bool>>,
    serial_manager: Arc<SerialManager>,
}

impl fmt::Debug for DreamFocuserDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DreamFocuserDevice")
            .field("config", &self.config)
            .field("requested_connection", &self.requested_connection)
            .finish_non_exhaustive()
    }
}

impl DreamFocuserDevice {
    pub fn new(config: FocuserConfig, serial_manager: Arc<SerialManager>) -> Self {
        Self {
            config,
            requested_connection: Arc::new(RwLock::new(false)),
            serial_manager,
        }
    }

    fn to_ascom_error(err: DreamError) -> ASCOMError {
        err.to_ascom_error()
    }

    /// Travel limit, preferring the one reported by the focuser
    async fn travel_limit(&self) -> u32 {
        self.serial_manager
            .get_cached_state()
            .await
            .max_position
            .and_then(|max| u32::try_from(max).ok())
            .filter(|max| *max > 0)
            .unwrap_or(self.config.max_step)
    }
}

#[async_trait]
impl Device for DreamFocuserDevice {
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
            debug!("Focuser device connected");
        } else {
            *self.requested_connection.write().await = false;
            self.serial_manager.disconnect().await;
            debug!("Focuser device disconnected");
        }
        Ok(())
    }

    async fn driver_info(&self) -> ASCOMResult<String> {
        Ok("Dream Focuser Driver - ASCOM Alpaca interface for the Dream Focuser".to_string())
    }

    async fn driver_version(&self) -> ASCOMResult<String> {
        Ok(env!("CARGO_PKG_VERSION").to_string())
    }
}

#[async_trait]
impl Focuser for DreamFocuserDevice {
    async fn absolute(&self) -> ASCOMResult<bool> {
        Ok(true)
    }

    async fn is_moving(&self) -> ASCOMResult<bool> {
        ensure_connected!(self);

        if self.serial_manager.get_cached_state().await.motion.is_moving() {
            self.serial_manager
                .refresh_motion()
                .await
                .map_err(Self::to_ascom_error)?;
        }

        Ok(self.serial_manager.get_cached_state().await.motion.is_moving())
    }

    async fn max_increment(&self) -> ASCOMResult<u32> {
        Ok(self.travel_limit().await)
    }

    async fn max_step(&self) -> ASCOMResult<u32> {
        Ok(self.travel_limit().await)
    }

    async fn position(&self) -> ASCOMResult<i32> {
        ensure_connected!(self);
        let state = self.serial_manager.get_cached_state().await;
        state.position.ok_or_else(|| {
            ASCOMError::new(
                ASCOMErrorCode::INVALID_OPERATION,
                "Position not yet available",
            )
        })
    }

    async fn step_size(&self) -> ASCOMResult<f64> {
        self.config
            .step_size_microns
            .ok_or(ASCOMError::NOT_IMPLEMENTED)
    }

    async fn temp_comp(&self) -> ASCOMResult<bool> {
        Ok(false)
    }

    async fn temp_comp_available(&self) -> ASCOMResult<bool> {
        Ok(false)
    }

    async fn temperature(&self) -> ASCOMResult<f64> {
        ensure_connected!(self);
        let state = self.serial_manager.get_cached_state().await;
        state.temperature.ok_or_else(|| {
            ASCOMError::new(
                ASCOMErrorCode::INVALID_OPERATION,
                "Temperature not yet available",
            )
        })
    }

    async fn halt(&self) -> ASCOMResult<()> {
        ensure_connected!(self);
        self.serial_manager
            .halt()
            .await
            .map_err(Self::to_ascom_error)
    }

    async fn move_(&self, position: i32) -> ASCOMResult<()> {
        ensure_connected!(self);

        let limit = self.travel_limit().await;
        if u32::try_from(position).map_or(true, |p| p > limit) {
            return Err(Self::to_ascom_error(DreamError::InvalidValue(format!(
                "Position {} out of range [0, {}]",
                position, limit
            ))));
        }

        self.serial_manager
            .move_to(position)
            .await
            .map_err(Self::to_ascom_error)
    }
}
