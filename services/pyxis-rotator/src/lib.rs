//! Pyxis Rotator Driver
//!
//! ASCOM Alpaca driver for Optec Pyxis camera field rotators.
//!
//! The Pyxis takes six character commands and reports rotation progress as
//! a stream of acknowledgement bytes, one batch per degree, ending in `F`.
//! The 2-inch and 3-inch models differ in batch size and are told apart by
//! their firmware version.

pub mod config;
pub mod error;
#[cfg(feature = "mock")]
pub mod mock;
pub mod protocol;
pub mod rotator_device;
pub mod serial_manager;

pub use config::{load_config, Config, RotatorConfig, SerialConfig, ServerConfig};
pub use error::{PyxisError, Result};
pub use protocol::Model;
pub use rotator_device::PyxisRotatorDevice;
pub use serial_manager::SerialManager;

#[cfg(feature = "mock")]
pub use mock::MockSerialPortFactory;

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use ascom_alpaca::api::CargoServerInfo;
use ascom_alpaca::{BoundServer, Server};
use serial_link::{SerialPortFactory, TokioSerialPortFactory};
use tracing::info;

/// Binds an Alpaca server exposing the rotator described by a [`Config`].
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

        if config.rotator.enabled {
            info!(
                "Serving {} as rotator {} on {}",
                config.rotator.name, config.rotator.device_number, config.serial.port
            );
            let serial_manager = Arc::new(SerialManager::new(config.clone(), factory));
            server
                .devices
                .register(PyxisRotatorDevice::new(config.rotator, serial_manager));
        } else {
            info!("Rotator disabled, no devices registered");
        }

        let bound = server.bind().await?;
        info!("Alpaca server listening on {}", bound.listen_addr());
        Ok(bound)
    }
}
