//! World struct for TeenAstro focuser BDD tests

use std::sync::Arc;
use std::time::Duration;

use cucumber::World;
use serial_link::testing::ScriptedDevice;
use teenastro_focuser::{Config, SerialManager, TeenAstroFocuserDevice};

#[derive(Debug, Default, World)]
pub struct TeenAstroWorld {
    pub config: Option<Config>,
    pub controller: Option<ScriptedDevice>,
    pub device: Option<Arc<TeenAstroFocuserDevice>>,
    pub serial_manager: Option<Arc<SerialManager>>,
    pub last_error_code: Option<u16>,
    pub is_moving_result: Option<bool>,
}

impl TeenAstroWorld {
    /// A focuser resting at 5000 with park at 1000 and max 65000
    pub fn standard_controller() -> ScriptedDevice {
        let controller = ScriptedDevice::new();
        controller
            .on(":FV#", &[b"$ TeenAstro Focuser 1.3#"])
            .on(":F?#", &[b"?5000 0 18.5#"])
            .on(":F~#", &[b"~1000 65000 20 100 10 10 10#"])
            .on(":FM#", &[b"M0 4 16 50 200#"]);
        controller
    }

    pub fn controller(&self) -> &ScriptedDevice {
        self.controller.as_ref().expect("controller not created")
    }

    pub fn device(&self) -> &TeenAstroFocuserDevice {
        self.device.as_ref().expect("device not created")
    }

    pub fn manager(&self) -> &SerialManager {
        self.serial_manager
            .as_ref()
            .expect("serial manager not created")
    }

    pub fn build_device(&mut self, controller: ScriptedDevice) {
        let mut config = self.config.clone().unwrap_or_default();
        config.serial.polling_interval_ms = 60_000;
        let serial_manager = Arc::new(
            SerialManager::new(config.clone(), controller.factory())
                .with_startup_delay(Duration::ZERO),
        );
        self.controller = Some(controller);
        self.serial_manager = Some(Arc::clone(&serial_manager));
        self.device = Some(Arc::new(TeenAstroFocuserDevice::new(
            config.focuser,
            serial_manager,
        )));
    }

    pub fn record_error(&mut self, result: ascom_alpaca::ASCOMResult<()>) {
        self.last_error_code = result.err().map(|e| e.code.raw());
    }
}
