// Handshake Badge: WiFi Station
//
// Blocking bring-up before the broker connects. Retries until associated
// or the connect timeout elapses.

use std::time::{Duration, Instant};

use esp_idf_hal::delay::FreeRtos;
use esp_idf_hal::modem::WifiModemPeripheral;
use esp_idf_hal::peripheral::Peripheral;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi};

use crate::config::*;

pub fn connect<'d>(
    modem: impl Peripheral<P = impl WifiModemPeripheral> + 'd,
    sysloop: EspSystemEventLoop,
    nvs: Option<EspDefaultNvsPartition>,
) -> anyhow::Result<BlockingWifi<EspWifi<'d>>> {
    let mut wifi = BlockingWifi::wrap(EspWifi::new(modem, sysloop.clone(), nvs)?, sysloop)?;

    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: WIFI_SSID
            .try_into()
            .map_err(|_| anyhow::anyhow!("SSID too long"))?,
        password: WIFI_PASSWORD
            .try_into()
            .map_err(|_| anyhow::anyhow!("WiFi password too long"))?,
        auth_method: if WIFI_PASSWORD.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        },
        ..Default::default()
    }))?;
    wifi.start()?;

    let started = Instant::now();
    let timeout = Duration::from_millis(WIFI_CONNECT_TIMEOUT_MS);
    loop {
        match wifi.connect() {
            Ok(()) => break,
            Err(e) if started.elapsed() < timeout => {
                log::warn!("WiFi connect failed ({}), retrying", e);
                FreeRtos::delay_ms(WIFI_RETRY_DELAY_MS);
            }
            Err(e) => return Err(e.into()),
        }
    }
    wifi.wait_netif_up()?;

    log::info!("WiFi connected to {}", WIFI_SSID);
    Ok(wifi)
}
