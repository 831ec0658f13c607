//! World struct for Dream Focuser BDD tests

use std::sync::Arc;

use cucumber::World;
use dream_focuser::protocol::Command;
use dream_focuser::{Config, DreamFocuserDevice, SerialManager};
use serial_link::sum8;
use serial_link::testing::ScriptedDevice;

#[derive(Debug, Default, World)]
pub struct DreamWorld {
    pub focuser: Option<ScriptedDevice>,
    pub device: Option<Arc<DreamFocuserDevice>>,
    pub serial_manager: Option<Arc<SerialManager>>,
    pub last_error_code: Option<u16>,
    pub is_moving_result: Option<bool>,
}

/// Build a checksummed reply frame
pub fn frame(code: u8, payload: [u8; 4]) -> Vec<u8> {
    let mut frame = vec![b'M', code, payload[0], payload[1], payload[2], payload[3], 0];
    frame.push(sum8(&frame));
    frame
}

pub fn value_reply(code: u8, value: i32) -> Vec<u8> {
    frame(code, value.to_be_bytes())
}

impl DreamWorld {
    /// Script an idle focuser at `position`
    pub fn script_focuser(&mut self, position: i32, calibrated: bool) {
        let focuser = ScriptedDevice::new();
        focuser
            .on(Command::Status.encode(), &[&frame(b'I', [0; 4])])
            .on(
                Command::AbsoluteMode.encode(),
                &[&frame(b'W', [0, 0, 0, u8::from(calibrated)])],
            )
            .on(Command::Position.encode(), &[&value_reply(b'P', position)])
            .on(Command::MaxPosition.encode(), &[&value_reply(b'A', 60_000)])
            .on(Command::Climate.encode(), &[&frame(b'T', [0x02, 0x26, 0x00, 0x7d])]);
        self.focuser = Some(focuser);
    }

    pub fn focuser(&self) -> &ScriptedDevice {
        self.focuser.as_ref().expect("focuser not scripted")
    }

    pub fn device(&self) -> &DreamFocuserDevice {
        self.device.as_ref().expect("device not created")
    }

    pub fn manager(&self) -> &SerialManager {
        self.serial_manager
            .as_ref()
            .expect("serial manager not created")
    }

    /// Build the device with a long polling interval so the poller stays idle
    pub fn build_device(&mut self) {
        let factory = self.focuser().factory();
        let mut config = Config::default();
        config.serial.polling_interval_ms = 60_000;
        let serial_manager = Arc::new(SerialManager::new(config.clone(), factory));
        self.serial_manager = Some(Arc::clone(&serial_manager));
        self.device = Some(Arc::new(DreamFocuserDevice::new(
            config.focuser,
            serial_manager,
        )));
    }

    pub fn record_error(&mut self, result: ascom_alpaca::ASCOMResult<()>) {
        self.last_error_code = result.err().map(|e| e.code.raw());
    }
}
