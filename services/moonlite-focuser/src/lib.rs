//! MoonLite Focuser Driver
//!
//! ASCOM Alpaca driver for MoonLite focuser controllers.
//!
//! The controller speaks a `#` terminated ASCII protocol with hex encoded
//! values. Moves are started with a target and a go command; completion is
//! detected by polling the controller's moving flag.

pub mod config;
pub mod error;
pub mod focuser_device;
#[cfg(feature = "mock")]
pub mod mock;
pub mod protocol;
pub mod serial_manager;

pub use config::{load_config, Config, FocuserConfig, SerialConfig, ServerConfig};
pub use error::{MoonliteError, Result};
pub use focuser_device::MoonliteFocuserDevice;
pub use serial_manager::SerialManager;

#[cfg(feature = "mock")]
pub use mock::MockSerialPortFactory;

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use ascom_alpaca::api::CargoServerInfo;
use ascom_alpaca::{BoundServer, Server};
use serial_link::{SerialPortFactory, TokioSerialPortFactory};
use tracing::info;

/// Binds an Alpaca server exposing the focuser described by a [`Config`].
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

        if config.focuser.enabled {
            info!(
                "Serving {} as focuser {} on {}",
                config.focuser.name, config.focuser.device_number, config.serial.port
            );
            let serial_manager = Arc::new(SerialManager::new(config.clone(), factory));
            server
                .devices
                .register(MoonliteFocuserDevice::new(config.focuser, serial_manager));
        } else {
            info!("Focuser disabled, no devices registered");
        }

        let bound = server.bind().await?;
        info!("Alpaca server listening on {}", bound.listen_addr());
        Ok(bound)
    }
}
