//! World struct for Pyxis rotator BDD tests

use std::sync::Arc;

use cucumber::World;
use pyxis_rotator::protocol::Command;
use pyxis_rotator::{Config, PyxisRotatorDevice, SerialManager};
use serial_link::testing::ScriptedDevice;

#[derive(Debug, Default, World)]
pub struct PyxisWorld {
    pub rotator: Option<ScriptedDevice>,
    pub device: Option<Arc<PyxisRotatorDevice>>,
    pub serial_manager: Option<Arc<SerialManager>>,
    pub last_error_code: Option<u16>,
}

impl PyxisWorld {
    /// Script an idle 3-inch rotator at `angle`
    pub fn script_rotator(&mut self, angle: u16) {
        let rotator = ScriptedDevice::new();
        rotator
            .on(Command::Link.encode(), &[b"!"])
            .on(Command::ReverseStatus.encode(), &[b"0"])
            .on(Command::Version.encode(), &[b"3.1"])
            .on(Command::SetRate(6).encode(), &[b"!"])
            .on(Command::Wake.encode(), &[b"!"]);
        self.rotator = Some(rotator);
        self.report_angle(angle);
    }

    pub fn report_angle(&self, angle: u16) {
        self.rotator().on(
            Command::GetPositionAngle.encode(),
            &[format!("{:03}", angle).as_bytes()],
        );
    }

    pub fn rotator(&self) -> &ScriptedDevice {
        self.rotator.as_ref().expect("rotator not scripted")
    }

    pub fn device(&self) -> &PyxisRotatorDevice {
        self.device.as_ref().expect("device not created")
    }

    pub fn manager(&self) -> &SerialManager {
        self.serial_manager
            .as_ref()
            .expect("serial manager not created")
    }

    /// Build the device with a long polling interval so the poller stays idle
    pub fn build_device(&mut self) {
        let factory = self.rotator().factory();
        let mut config = Config::default();
        config.serial.polling_interval_ms = 60_000;
        let serial_manager = Arc::new(SerialManager::new(config.clone(), factory));
        self.serial_manager = Some(Arc::clone(&serial_manager));
        self.device = Some(Arc::new(PyxisRotatorDevice::new(
            config.rotator,
            serial_manager,
        )));
    }

    pub fn record_error(&mut self, result: ascom_alpaca::ASCOMResult<()>) {
        self.last_error_code = result.err().map(|e| e.code.raw());
    }
}
