//! World struct for NightCrawler BDD tests

use std::sync::Arc;

use cucumber::World;
use nightcrawler::{Config, NightCrawlerFocuserDevice, NightCrawlerRotatorDevice, SerialManager};
use serial_link::testing::ScriptedDevice;

#[derive(Debug, Default, World)]
pub struct NightCrawlerWorld {
    pub config: Config,
    pub controller: Option<ScriptedDevice>,
    pub focuser: Option<Arc<NightCrawlerFocuserDevice>>,
    pub rotator: Option<Arc<NightCrawlerRotatorDevice>>,
    pub serial_manager: Option<Arc<SerialManager>>,
    pub last_error_code: Option<u16>,
    pub is_moving_result: Option<bool>,
}

impl NightCrawlerWorld {
    /// A 3.0" unit with focus at 10000 and the rotator at zero
    pub fn standard_controller() -> ScriptedDevice {
        let controller = ScriptedDevice::new();
        controller
            .on("PV#", &[b"5.05#"])
            .on("PF#", &[b"3.0 NC#"])
            .on("1SR#", &[b"010#"])
            .on("2SR#", &[b"020#"])
            .on("GT#", &[b"215#"])
            .on("GV#", &[b"121#"])
            .on("GS#", &[b"00#"])
            .on("1GP#", &[b"0010000#"])
            .on("2GP#", &[b"0000000#"])
            .on("SH 03#", &[b"#"])
            .on("1SQ#", &[b"#"])
            .on("2SQ#", &[b"#"])
            .on("2SM#", &[b"#"])
            .on("1SM#", &[b"#"]);
        controller
    }

    pub fn controller(&self) -> &ScriptedDevice {
        self.controller.as_ref().expect("controller not created")
    }

    pub fn focuser(&self) -> &NightCrawlerFocuserDevice {
        self.focuser.as_ref().expect("focuser not created")
    }

    pub fn rotator(&self) -> &NightCrawlerRotatorDevice {
        self.rotator.as_ref().expect("rotator not created")
    }

    pub fn manager(&self) -> &SerialManager {
        self.serial_manager
            .as_ref()
            .expect("serial manager not created")
    }

    pub fn build_devices(&mut self, controller: ScriptedDevice) {
        let mut config = self.config.clone();
        config.serial.polling_interval_ms = 60_000;
        let serial_manager = Arc::new(SerialManager::new(config.clone(), controller.factory()));
        self.controller = Some(controller);
        self.serial_manager = Some(Arc::clone(&serial_manager));
        self.focuser = Some(Arc::new(NightCrawlerFocuserDevice::new(
            config.focuser,
            Arc::clone(&serial_manager),
        )));
        self.rotator = Some(Arc::new(NightCrawlerRotatorDevice::new(
            config.rotator,
            serial_manager,
        )));
    }

    pub fn record_error(&mut self, result: ascom_alpaca::ASCOMResult<()>) {
        self.last_error_code = result.err().map(|e| e.code.raw());
    }
}
