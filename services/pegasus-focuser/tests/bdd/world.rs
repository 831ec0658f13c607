//! World struct for Pegasus focuser BDD tests

use std::sync::Arc;

use cucumber::World;
use pegasus_focuser::{Config, Model, PegasusFocuserDevice, SerialManager};
use serial_link::testing::ScriptedDevice;

#[derive(Debug, Default, World)]
pub struct PegasusWorld {
    pub config: Option<Config>,
    pub controller: Option<ScriptedDevice>,
    pub device: Option<Arc<PegasusFocuserDevice>>,
    pub serial_manager: Option<Arc<SerialManager>>,
    pub last_error_code: Option<u16>,
    pub is_moving_result: Option<bool>,
}

impl PegasusWorld {
    /// Script a controller answering the ping and status commands
    pub fn script_controller(&mut self, model: Model, status: &str) {
        let identifier = match model {
            Model::Dmfc => "OK_DMFCN\n",
            Model::FocusCube => "OK_FC\n",
        };
        let controller = ScriptedDevice::new();
        controller
            .on("#\n", &[identifier.as_bytes()])
            .on("A\n", &[format!("{}\n", status).as_bytes()]);

        let mut config = self.config.clone().unwrap_or_default();
        config.focuser.model = model;
        self.config = Some(config);
        self.controller = Some(controller);
    }

    pub fn controller(&self) -> &ScriptedDevice {
        self.controller.as_ref().expect("controller not created")
    }

    pub fn device(&self) -> &PegasusFocuserDevice {
        self.device.as_ref().expect("device not created")
    }

    pub fn manager(&self) -> &SerialManager {
        self.serial_manager
            .as_ref()
            .expect("serial manager not created")
    }

    /// Build the device with a long polling interval so the poller stays idle
    pub fn build_device(&mut self) {
        let factory = self.controller().factory();
        let mut config = self.config.clone().unwrap_or_default();
        config.serial.polling_interval_ms = 60_000;
        let serial_manager = Arc::new(SerialManager::new(config.clone(), factory));
        self.serial_manager = Some(Arc::clone(&serial_manager));
        self.device = Some(Arc::new(PegasusFocuserDevice::new(
            config.focuser,
            serial_manager,
        )));
    }

    pub fn record_error(&mut self, result: ascom_alpaca::ASCOMResult<()>) {
        self.last_error_code = result.err().map(|e| e.code.raw());
    }
}
