//! MoonLite focuser device implementation
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
use crate::error::MoonliteError;
use crate::protocol::MAX_POSITION;
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

/// MoonLite focuser device for ASCOM Alpaca
pub struct MoonliteFocuserDevice {
    config: FocuserConfig,
    requested_connection: Arc<RwLock<bool>>,
    serial_manager: Arc<SerialManager>,
}

impl fmt::Debug for MoonliteFocuserDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MoonliteFocuserDevice")
            .field("config", &self.config)
            .field("requested_connection", &self.requested_connection)
            .finish_non_exhaustive()
    }
}

impl MoonliteFocuserDevice {
    pub fn new(config: FocuserConfig, serial_manager: Arc<SerialManager>) -> Self {
        Self {
            config,
            requested_connection: Arc::new(RwLock::new(false)),
            serial_manager,
        }
    }

    /// Highest reachable position: the configured limit, capped by the protocol
    fn limit(&self) -> u32 {
        self.config.max_step.min(MAX_POSITION)
    }

    fn to_ascom_error(err: MoonliteError) -> ASCOMError {
        err.to_ascom_error()
    }
}

#[async_trait]
impl Device for MoonliteFocuserDevice {
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
        Ok("MoonLite Focuser Driver - ASCOM Alpaca interface for MoonLite controllers".to_string())
    }

    async fn driver_version(&self) -> ASCOMResult<String> {
        Ok(env!("CARGO_PKG_VERSION").to_string())
    }
}

#[async_trait]
impl Focuser for MoonliteFocuserDevice {
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
        Ok(self.limit())
    }

    async fn max_step(&self) -> ASCOMResult<u32> {
        Ok(self.limit())
    }

    async fn position(&self) -> ASCOMResult<i32> {
        ensure_connected!(self);
        let state = self.serial_manager.get_cached_state().await;
        state.position.map(i32::from).ok_or_else(|| {
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
        ensure_connected!(self);
        Ok(self.serial_manager.get_cached_state().await.temp_comp)
    }

    async fn set_temp_comp(&self, temp_comp: bool) -> ASCOMResult<()> {
        ensure_connected!(self);
        self.serial_manager
            .set_temp_comp(temp_comp)
            .await
            .map_err(Self::to_ascom_error)
    }

    async fn temp_comp_available(&self) -> ASCOMResult<bool> {
        Ok(true)
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

        let target = u16::try_from(position)
            .ok()
            .filter(|p| u32::from(*p) <= self.limit())
            .ok_or_else(|| {
                ASCOMError::new(
                    ASCOMErrorCode::INVALID_VALUE,
                    format!("Position {} out of range [0, {}]", position, self.limit()),
                )
            })?;

        self.serial_manager
            .move_absolute(target)
            .await
            .map_err(Self::to_ascom_error)
    }
}
