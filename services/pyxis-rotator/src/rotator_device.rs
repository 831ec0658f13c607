//! Pyxis rotator device implementation
//!
//! Implements the ASCOM Alpaca Device and Rotator traits on top of the
//! shared [`SerialManager`]. The Pyxis has no sync command, so sync is an
//! offset kept by the driver between the mechanical and the sky angle.

use std::fmt;
use std::sync::Arc;

use ascom_alpaca::api::{Device, Rotator};
use ascom_alpaca::{ASCOMError, ASCOMErrorCode, ASCOMResult};
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::RotatorConfig;
use crate::error::PyxisError;
use crate::protocol::normalize_degrees;
use crate::serial_manager::SerialManager;

/// Guard macro that returns NOT_CONNECTED if the device is not connected.
macro_rules! ensure_connected {
    ($self:ident) => {
        if !$self.connected().await.is_ok_and(|connected| connected) {
            debug!("Rotator device not connected");
            return Err(ASCOMError::NOT_CONNECTED);
        }
    };
}

/// Optec Pyxis rotator device for ASCOM Alpaca
pub struct PyxisRotatorDevice {
    config: RotatorConfig,
    requested_connection: Arc<RwLock<bool>>,
    serial_manager: Arc<SerialManager>,
}

impl fmt::Debug for PyxisRotatorDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PyxisRotatorDevice")
            .field("config", &self.config)
            .field("requested_connection", &self.requested_connection)
            .finish_non_exhaustive()
    }
}

impl PyxisRotatorDevice {
    pub fn new(config: RotatorConfig, serial_manager: Arc<SerialManager>) -> Self {
        Self {
            config,
            requested_connection: Arc::new(RwLock::new(false)),
            serial_manager,
        }
    }

    fn to_ascom_error(err: PyxisError) -> ASCOMError {
        err.to_ascom_error()
    }

    fn not_yet_available() -> ASCOMError {
        ASCOMError::new(
            ASCOMErrorCode::INVALID_OPERATION,
            "Position angle not yet available",
        )
    }
}

#[async_trait]
impl Device for PyxisRotatorDevice {
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
            debug!("Rotator device connected");
        } else {
            *self.requested_connection.write().await = false;
            self.serial_manager.disconnect().await;
            debug!("Rotator device disconnected");
        }
        Ok(())
    }

    async fn driver_info(&self) -> ASCOMResult<String> {
        Ok("Pyxis Rotator Driver - ASCOM Alpaca interface for Optec Pyxis rotators".to_string())
    }

    async fn driver_version(&self) -> ASCOMResult<String> {
        Ok(env!("CARGO_PKG_VERSION").to_string())
    }
}

#[async_trait]
impl Rotator for PyxisRotatorDevice {
    async fn can_reverse(&self) -> ASCOMResult<bool> {
        Ok(true)
    }

    async fn is_moving(&self) -> ASCOMResult<bool> {
        ensure_connected!(self);
        Ok(self.serial_manager.get_cached_state().await.motion.is_moving())
    }

    async fn mechanical_position(&self) -> ASCOMResult<f64> {
        ensure_connected!(self);
        self.serial_manager
            .get_cached_state()
            .await
            .mechanical_position
            .map(f64::from)
            .ok_or_else(Self::not_yet_available)
    }

    async fn position(&self) -> ASCOMResult<f64> {
        ensure_connected!(self);
        self.serial_manager
            .get_cached_state()
            .await
            .position()
            .ok_or_else(Self::not_yet_available)
    }

    async fn reverse(&self) -> ASCOMResult<bool> {
        ensure_connected!(self);
        Ok(self
            .serial_manager
            .get_cached_state()
            .await
            .reverse
            .unwrap_or(false))
    }

    async fn set_reverse(&self, reverse: bool) -> ASCOMResult<()> {
        ensure_connected!(self);
        self.serial_manager
            .set_reverse(reverse)
            .await
            .map_err(Self::to_ascom_error)
    }

    async fn step_size(&self) -> ASCOMResult<f64> {
        Ok(1.0)
    }

    async fn target_position(&self) -> ASCOMResult<f64> {
        ensure_connected!(self);
        let state = self.serial_manager.get_cached_state().await;
        state
            .target_position
            .or_else(|| state.position())
            .ok_or_else(Self::not_yet_available)
    }

    async fn halt(&self) -> ASCOMResult<()> {
        Err(ASCOMError::NOT_IMPLEMENTED)
    }

    async fn move_(&self, position: f64) -> ASCOMResult<()> {
        ensure_connected!(self);
        let current = self.position().await?;
        self.serial_manager
            .move_absolute(normalize_degrees(current + position))
            .await
            .map_err(Self::to_ascom_error)
    }

    async fn move_absolute(&self, position: f64) -> ASCOMResult<()> {
        ensure_connected!(self);
        self.serial_manager
            .move_absolute(position)
            .await
            .map_err(Self::to_ascom_error)
    }

    async fn move_mechanical(&self, position: f64) -> ASCOMResult<()> {
        ensure_connected!(self);
        self.serial_manager
            .move_mechanical(position)
            .await
            .map_err(Self::to_ascom_error)
    }

    async fn sync(&self, position: f64) -> ASCOMResult<()> {
        ensure_connected!(self);
        self.serial_manager
            .sync(position)
            .await
            .map_err(Self::to_ascom_error)
    }
}
