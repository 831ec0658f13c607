//! NightCrawler focus motor as an Alpaca focuser

use std::fmt;
use std::sync::Arc;

use ascom_alpaca::api::{Device, Focuser};
use ascom_alpaca::{ASCOMError, ASCOMErrorCode, ASCOMResult};
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::FocuserConfig;
use crate::error::NightCrawlerError;
use crate::protocol::Motor;
use crate::serial_manager::SerialManager;

macro_rules! ensure_connected {
    ($self:ident) => {
        if !$self.connected().await.is_ok_and(|connected| connected) {
            debug!("Focuser device not connected");
            return Err(ASCOMError::NOT_CONNECTED);
        }
    };
}

pub struct NightCrawlerFocuserDevice {
    config: FocuserConfig,
    requested_connection: Arc<RwLock<bool>>,
    serial_manager: Arc<SerialManager>,
}

impl fmt::Debug for NightCrawlerFocuserDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NightCrawlerFocuserDevice")
            .field("config", &self.config)
            .field("requested_connection", &self.requested_connection)
            .finish_non_exhaustive()
    }
}

impl NightCrawlerFocuserDevice {
    pub fn new(config: FocuserConfig, serial_manager: Arc<SerialManager>) -> Self {
        Self {
            config,
            requested_connection: Arc::new(RwLock::new(false)),
            serial_manager,
        }
    }

    fn to_ascom_error(err: NightCrawlerError) -> ASCOMError {
        err.to_ascom_error()
    }
}

#[async_trait]
impl Device for NightCrawlerFocuserDevice {
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
        Ok("NightCrawler Driver - ASCOM Alpaca interface for NightCrawler focusers".to_string())
    }

    async fn driver_version(&self) -> ASCOMResult<String> {
        Ok(env!("CARGO_PKG_VERSION").to_string())
    }
}

#[async_trait]
impl Focuser for NightCrawlerFocuserDevice {
    async fn absolute(&self) -> ASCOMResult<bool> {
        Ok(true)
    }

    async fn is_moving(&self) -> ASCOMResult<bool> {
        ensure_connected!(self);

        if self.serial_manager.get_cached_state().await.focus_motion.is_moving() {
            self.serial_manager
                .refresh_motion()
                .await
                .map_err(Self::to_ascom_error)?;
        }

        Ok(self.serial_manager.get_cached_state().await.focus_motion.is_moving())
    }

    async fn max_increment(&self) -> ASCOMResult<u32> {
        Ok(self.serial_manager.focus_limit())
    }

    async fn max_step(&self) -> ASCOMResult<u32> {
        Ok(self.serial_manager.focus_limit())
    }

    async fn position(&self) -> ASCOMResult<i32> {
        ensure_connected!(self);
        self.serial_manager
            .get_cached_state()
            .await
            .focus_position
            .ok_or_else(|| {
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
        self.serial_manager
            .get_cached_state()
            .await
            .temperature
            .ok_or_else(|| {
                ASCOMError::new(
                    ASCOMErrorCode::INVALID_OPERATION,
                    "Temperature not yet available",
                )
            })
    }

    async fn halt(&self) -> ASCOMResult<()> {
        ensure_connected!(self);
        self.serial_manager
            .halt(Motor::Focus)
            .await
            .map_err(Self::to_ascom_error)
    }

    async fn move_(&self, position: i32) -> ASCOMResult<()> {
        ensure_connected!(self);
        let target = u32::try_from(position).map_err(|_| {
            ASCOMError::new(
                ASCOMErrorCode::INVALID_VALUE,
                format!("Position {} is negative", position),
            )
        })?;
        self.serial_manager
            .move_focus(target)
            .await
            .map_err(Self::to_ascom_error)
    }
}
