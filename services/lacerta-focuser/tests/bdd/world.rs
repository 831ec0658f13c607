//! World struct for Lacerta MFOC BDD tests

use std::sync::Arc;

use cucumber::World;
use lacerta_focuser::{Config, LacertaFocuserDevice, SerialManager};
use serial_link::testing::ScriptedDevice;

#[derive(Debug, Default, World)]
pub struct LacertaWorld {
    pub config: Option<Config>,
    pub controller: Option<ScriptedDevice>,
    pub device: Option<Arc<LacertaFocuserDevice>>,
    pub serial_manager: Option<Arc<SerialManager>>,
    pub last_error_code: Option<u16>,
    pub is_moving_result: Option<bool>,
}

impl LacertaWorld {
    /// An MFOC at position 15000 with compensation off
    pub fn standard_controller() -> ScriptedDevice {
        let controller = ScriptedDevice::new();
        controller
            .on(": Q #", &[b"P 15000\r"])
            .on(": O #", &[b"G 110000\r"])
            .on(": U #", &[b"D 0\r"]);
        controller
    }

    pub fn controller(&self) -> &ScriptedDevice {
        self.controller.as_ref().expect("controller not created")
    }

    pub fn device(&self) -> &LacertaFocuserDevice {
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
        let serial_manager = Arc::new(SerialManager::new(config.clone(), controller.factory()));
        self.controller = Some(controller);
        self.serial_manager = Some(Arc::clone(&serial_manager));
        self.device = Some(Arc::new(LacertaFocuserDevice::new(
            config.focuser,
            serial_manager,
        )));
    }

    pub fn record_error(&mut self, result: ascom_alpaca::ASCOMResult<()>) {
        self.last_error_code = result.err().map(|e| e.code.raw());
    }
}
