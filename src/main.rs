// Handshake Badge: Firmware Entry Point
//
// Boot sequence:
//   1. Shared I2C bus (BNO055 + ST25DV), haptic PWM.
//   2. WiFi station, then the MQTT assignment link (device id = STA MAC).
//   3. BLE radio with the discovery observer registered for scan results.
//   4. Probe and blank the tag, announce availability.
//   5. Poll loop: broker housekeeping, reboot requests, orchestrator tick.
//
// Missing hardware parks the device (fail-stop); nothing else is fatal.

#[cfg(target_os = "espidf")]
fn main() -> anyhow::Result<()> {
    firmware::run()
}

#[cfg(not(target_os = "espidf"))]
fn main() {
    println!("handshake-badge runs on ESP-IDF targets; host builds only carry the library tests");
}

#[cfg(target_os = "espidf")]
mod firmware {
    use std::sync::Mutex;
    use std::thread;
    use std::time::Duration;

    use esp_idf_hal::i2c::{I2cConfig, I2cDriver};
    use esp_idf_hal::prelude::*;
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;

    use handshake_badge::config::*;
    use handshake_badge::discovery::PeerDiscovery;
    use handshake_badge::drivers::ble::{self, BleRadio};
    use handshake_badge::drivers::broker::BrokerLink;
    use handshake_badge::drivers::haptic::LedcMotor;
    use handshake_badge::drivers::imu::Bno055;
    use handshake_badge::drivers::nfc::St25dv;
    use handshake_badge::drivers::{wifi, SharedBus};
    use handshake_badge::gesture::{GestureClassifier, Scorer};
    use handshake_badge::haptic::Haptic;
    use handshake_badge::link::{device_id_from_mac, AssignmentLink, Command, Status};
    use handshake_badge::timing::now_ms;
    use handshake_badge::{FatalError, Orchestrator, Settings};

    pub fn run() -> anyhow::Result<()> {
        esp_idf_svc::sys::link_patches();
        esp_idf_svc::log::EspLogger::initialize_default();
        log::info!("Handshake badge firmware starting");

        let peripherals = Peripherals::take()?;
        let sysloop = EspSystemEventLoop::take()?;
        let nvs = EspDefaultNvsPartition::take()?;

        // ---- I2C bus (shared between BNO055 and ST25DV) -------------------
        let i2c_config = I2cConfig::new().baudrate(I2C_BAUDRATE_HZ.Hz());
        let i2c = I2cDriver::new(
            peripherals.i2c0,
            peripherals.pins.gpio6, // SDA
            peripherals.pins.gpio7, // SCL
            &i2c_config,
        )?;
        let bus: SharedBus = Box::leak(Box::new(Mutex::new(i2c)));

        let motor = LedcMotor::new(
            peripherals.ledc.channel0,
            peripherals.ledc.timer0,
            peripherals.pins.gpio1,
        )?;

        // ---- Network ------------------------------------------------------
        let (wifi_modem, bt_modem) = peripherals.modem.split();
        let wifi = wifi::connect(wifi_modem, sysloop.clone(), Some(nvs.clone()))?;
        let device_id = device_id_from_mac(wifi.wifi().sta_netif().get_mac()?);
        log::info!("Device id {}", device_id);

        let link = BrokerLink::connect(&device_id, EVENT_ID)?;
        let mut control = link.clone();

        // ---- Peer discovery radio -----------------------------------------
        let radio = BleRadio::new(bt_modem, Some(nvs))?;
        let discovery = PeerDiscovery::new(Box::new(radio));
        ble::register_observer(discovery.observer())?;

        let classifier = GestureClassifier::new(Box::new(Bno055::new(bus)), scorer());

        let mut orchestrator = Orchestrator::new(
            Settings::default(),
            Box::new(link),
            Box::new(St25dv::new(bus)),
            Haptic::new(Box::new(motor)),
            classifier,
            discovery,
        )?;
        if let Err(e) = orchestrator.start() {
            halt(e);
        }

        let interval = Duration::from_millis(MAIN_LOOP_INTERVAL_MS);
        loop {
            control.service();

            if control.take_reboot_request() {
                log::warn!("Reboot requested by backend");
                if let Err(e) = control.publish_receipt(Command::Reboot, Status::Acknowledged) {
                    log::warn!("Reboot receipt not published: {:#}", e);
                }
                thread::sleep(Duration::from_millis(200));
                esp_idf_hal::reset::restart();
            }

            if let Err(e) = orchestrator.tick(now_ms()) {
                halt(e);
            }

            thread::sleep(interval);
        }
    }

    #[cfg(feature = "tflite-model")]
    fn scorer() -> Box<dyn Scorer> {
        Box::new(handshake_badge::gesture::TfliteScorer::new())
    }

    #[cfg(not(feature = "tflite-model"))]
    fn scorer() -> Box<dyn Scorer> {
        Box::new(handshake_badge::gesture::SignatureScorer::new())
    }

    /// Park the device; only a power cycle recovers.
    fn halt(e: FatalError) -> ! {
        log::error!("{} - halting", e);
        loop {
            thread::sleep(Duration::from_secs(60));
        }
    }
}
