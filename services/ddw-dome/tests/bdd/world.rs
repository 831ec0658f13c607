//! World struct for DDW dome BDD tests

use std::sync::Arc;

use cucumber::World;
use ddw_dome::{Config, DdwDomeDevice, SerialManager};
use serial_link::testing::ScriptedDevice;

#[derive(Debug, Default, World)]
pub struct DdwWorld {
    pub config: Config,
    pub controller: Option<ScriptedDevice>,
    pub dome: Option<Arc<DdwDomeDevice>>,
    pub serial_manager: Option<Arc<SerialManager>>,
    pub last_error_code: Option<u16>,
    pub slewing_result: Option<bool>,
}

impl DdwWorld {
    /// 400 ticks per turn, home at 100 ticks, sitting at zero with the shutter closed
    pub fn standard_controller() -> ScriptedDevice {
        let controller = ScriptedDevice::new();
        controller.on("GINF", &[b"V1,400,100,2,0,0,1,0,0\r"]);
        controller
    }

    pub fn controller(&self) -> &ScriptedDevice {
        self.controller.as_ref().expect("controller not created")
    }

    pub fn dome(&self) -> &DdwDomeDevice {
        self.dome.as_ref().expect("dome not created")
    }

    pub fn manager(&self) -> &SerialManager {
        self.serial_manager
            .as_ref()
            .expect("serial manager not created")
    }

    pub fn build_dome(&mut self, controller: ScriptedDevice) {
        let mut config = self.config.clone();
        config.serial.polling_interval_ms = 60_000;
        let serial_manager = Arc::new(SerialManager::new(config.clone(), controller.factory()));
        self.controller = Some(controller);
        self.serial_manager = Some(Arc::clone(&serial_manager));
        self.dome = Some(Arc::new(DdwDomeDevice::new(config.dome, serial_manager)));
    }

    pub fn record_error(&mut self, result: ascom_alpaca::ASCOMResult<()>) {
        self.last_error_code = result.err().map(|e| e.code.raw());
    }
}
