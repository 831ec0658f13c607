//! World struct for MoonLite focuser BDD tests

use std::sync::Arc;

use cucumber::World;
use moonlite_focuser::{Config, MoonliteFocuserDevice, SerialManager};
use serial_link::testing::{FailingPortFactory, ScriptedDevice};
use serial_link::SerialPortFactory;

#[derive(Debug, Default, World)]
pub struct MoonliteWorld {
    pub config: Option<Config>,
    pub controller: Option<ScriptedDevice>,
    pub device: Option<Arc<MoonliteFocuserDevice>>,
    pub serial_manager: Option<Arc<SerialManager>>,
    pub last_error: Option<String>,
    pub last_error_code: Option<u16>,
    pub position_result: Option<i32>,
    pub temperature_result: Option<f64>,
    pub is_moving_result: Option<bool>,
}

impl MoonliteWorld {
    /// A controller at position 0x1388 (5000) reading 20.5°C at speed 2
    pub fn standard_controller() -> ScriptedDevice {
        let controller = ScriptedDevice::new();
        controller
            .on(":GP#", &[b"1388#"])
            .on(":GT#", &[b"0029#"])
            .on(":GD#", &[b"04#"])
            .on(":GH#", &[b"00#"])
            .on(":GI#", &[b"00#"]);
        controller
    }

    pub fn controller(&self) -> &ScriptedDevice {
        self.controller.as_ref().expect("controller not created")
    }

    pub fn device(&self) -> &MoonliteFocuserDevice {
        self.device.as_ref().expect("device not created")
    }

    pub fn manager(&self) -> &SerialManager {
        self.serial_manager
            .as_ref()
            .expect("serial manager not created")
    }

    /// Build a device on a scripted controller. The polling interval is long
    /// so the background poller stays out of the way.
    pub fn build_device(&mut self, controller: ScriptedDevice) {
        let factory = controller.factory();
        self.controller = Some(controller);
        self.build_with_factory(factory);
    }

    pub fn build_device_with_failing_factory(&mut self) {
        self.build_with_factory(Arc::new(FailingPortFactory));
    }

    pub fn record_error(&mut self, result: ascom_alpaca::ASCOMResult<()>) {
        match result {
            Ok(()) => {
                self.last_error = None;
                self.last_error_code = None;
            }
            Err(e) => {
                self.last_error = Some(e.to_string());
                self.last_error_code = Some(e.code.raw());
            }
        }
    }

    fn build_with_factory(&mut self, factory: Arc<dyn SerialPortFactory>) {
        let mut config = self.config.clone().unwrap_or_default();
        config.serial.polling_interval_ms = 60_000;
        let serial_manager = Arc::new(SerialManager::new(config.clone(), factory));
        self.serial_manager = Some(Arc::clone(&serial_manager));
        self.device = Some(Arc::new(MoonliteFocuserDevice::new(
            config.focuser,
            serial_manager,
        )));
    }
}
