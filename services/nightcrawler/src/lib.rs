//! NightCrawler Driver
//!
//! ASCOM Alpaca driver for the MoonLite NightCrawler, a focuser with a
//! built-in camera rotator. Both motors share one serial connection and are
//! served as a focuser and a rotator device.

pub mod config;
pub mod error;
pub mod focuser_device;
#[cfg(feature = "mock")]
pub mod mock;
pub mod protocol;
pub mod rotator_device;
pub mod serial_manager;

pub use config::{
    load_config, Config, ControllerConfig, FocuserConfig, RotatorConfig, SerialConfig,
    ServerConfig,
};
pub use error::{NightCrawlerError, Result};
pub use focuser_device::NightCrawlerFocuserDevice;
pub use protocol::{Model, Motor};
pub use rotator_device::NightCrawlerRotatorDevice;
pub use serial_manager::SerialManager;

#[cfg(feature = "mock")]
pub use mock::MockSerialPortFactory;

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use ascom_alpaca::api::CargoServerInfo;
use ascom_alpaca::{BoundServer, Server};
use serial_link::{SerialPortFactory, TokioSerialPortFactory};
use tracing::info;

/// Binds an Alpaca server exposing the devices described by a [`Config`].
///
/// The focuser and the rotator share one [`SerialManager`]. Real serial
/// ports are used unless another factory is supplied.
pub struct ServerBuilder {
    config: Config,
    factory: Arc<dyn SerialPortFactory>,
}

impl ServerBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            factory: Arc::new(TokioSerialPortFactory::new()),
        }
    }

    /// Open the device through `factory` instead of a real serial port
    pub fn with_factory(mut self, factory: Arc<dyn SerialPortFactory>) -> Self {
        self.factory = factory;
        self
    }

    pub async fn build(self) -> std::result::Result<BoundServer, Box<dyn std::error::Error>> {
        let Self { config, factory } = self;
        let mut server = Server::new(CargoServerInfo!());
        server.listen_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.server.port));

        let serial_manager = Arc::new(SerialManager::new(config.clone(), factory));

        if config.focuser.enabled {
            info!(
                "Serving {} as focuser {} on {}",
                config.focuser.name, config.focuser.device_number, config.serial.port
            );
            server.devices.register(NightCrawlerFocuserDevice::new(
                config.focuser.clone(),
                Arc::clone(&serial_manager),
            ));
        }

        if config.rotator.enabled {
            info!(
                "Serving {} as rotator {} on {}",
                config.rotator.name, config.rotator.device_number, config.serial.port
            );
            server.devices.register(NightCrawlerRotatorDevice::new(
                config.rotator.clone(),
                serial_manager,
            ));
        }

        if !config.focuser.enabled && !config.rotator.enabled {
            info!("Focuser and rotator disabled, no devices registered");
        }

        let bound = server.bind().await?;
        info!("Alpaca server listening on {}", bound.listen_addr());
        Ok(bound)
    }
}
