//! DDW Dome Driver
//!
//! ASCOM Alpaca driver for Digital Dome Works dome controllers. Rotation and
//! the shutter are tracked separately; the controller streams progress while
//! either moves and the driver only listens until the motion ends.

pub mod config;
pub mod dome_device;
pub mod error;
#[cfg(feature = "mock")]
pub mod mock;
pub mod protocol;
pub mod serial_manager;

pub use config::{load_config, Config, DomeConfig, SerialConfig, ServerConfig};
pub use dome_device::DdwDomeDevice;
pub use error::{DdwError, Result};
pub use protocol::{Rotation, ShutterStatus};
pub use serial_manager::SerialManager;

#[cfg(feature = "mock")]
pub use mock::MockSerialPortFactory;

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use ascom_alpaca::api::CargoServerInfo;
use ascom_alpaca::{BoundServer, Server};
use serial_link::{SerialPortFactory, TokioSerialPortFactory};
use tracing::info;

/// Binds an Alpaca server exposing the dome described by a [`Config`].
///
/// Real serial ports are used unless another factory is supplied.
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

        if config.dome.enabled {
            info!(
                "Serving {} as dome {} on {}",
                config.dome.name, config.dome.device_number, config.serial.port
            );
            let serial_manager = Arc::new(SerialManager::new(config.clone(), factory));
            server
                .devices
                .register(DdwDomeDevice::new(config.dome.clone(), serial_manager));
        } else {
            info!("Dome disabled, no devices registered");
        }

        let bound = server.bind().await?;
        info!("Alpaca server listening on {}", bound.listen_addr());
        Ok(bound)
    }
}
