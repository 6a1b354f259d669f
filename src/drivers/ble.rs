// Handshake Badge: BLE Advertise/Scan Radio
//
// `BtDriver` brings up the controller and Bluedroid; advertising and
// scanning go through the raw GAP API. Scan results arrive on the Bluedroid
// task and are handed straight to the registered observer.
//
// sdkconfig: CONFIG_BT_ENABLED=y, CONFIG_BT_BLUEDROID_ENABLED=y,
// CONFIG_BTDM_CTRL_MODE_BLE_ONLY=y (and SW coexistence with WiFi).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

use esp_idf_hal::modem::BluetoothModemPeripheral;
use esp_idf_hal::peripheral::Peripheral;
use esp_idf_svc::bt::{Ble, BtDriver};
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_sys::{self as sys, esp};

use crate::config::*;
use crate::discovery::{Radio, ScanObserver};

static OBSERVER: OnceLock<Box<dyn ScanObserver>> = OnceLock::new();

/// Advertising is started from the callback once the raw data is accepted.
static ADV_WANTED: AtomicBool = AtomicBool::new(false);

pub struct BleRadio<'d> {
    _driver: BtDriver<'d, Ble>,
}

impl<'d> BleRadio<'d> {
    pub fn new(
        modem: impl Peripheral<P = impl BluetoothModemPeripheral> + 'd,
        nvs: Option<EspDefaultNvsPartition>,
    ) -> anyhow::Result<Self> {
        let driver = BtDriver::<Ble>::new(modem, nvs)?;

        let mut scan_params = sys::esp_ble_scan_params_t {
            scan_type: sys::esp_ble_scan_type_t_BLE_SCAN_TYPE_PASSIVE,
            own_addr_type: sys::esp_ble_addr_type_t_BLE_ADDR_TYPE_PUBLIC,
            scan_filter_policy: sys::esp_ble_scan_filter_t_BLE_SCAN_FILTER_ALLOW_ALL,
            scan_interval: SCAN_INTERVAL_UNITS,
            scan_window: SCAN_WINDOW_UNITS,
            scan_duplicate: sys::esp_ble_scan_duplicate_t_BLE_SCAN_DUPLICATE_DISABLE,
        };
        unsafe {
            esp!(sys::esp_ble_gap_register_callback(Some(gap_event)))?;
            esp!(sys::esp_ble_gap_set_scan_params(&mut scan_params))?;
        }

        log::info!("BLE radio ready");
        Ok(Self { _driver: driver })
    }
}

/// Route scan results to `observer`. One observer per boot.
pub fn register_observer(observer: impl ScanObserver + 'static) -> anyhow::Result<()> {
    OBSERVER
        .set(Box::new(observer))
        .map_err(|_| anyhow::anyhow!("BLE observer already registered"))
}

fn adv_params() -> sys::esp_ble_adv_params_t {
    sys::esp_ble_adv_params_t {
        adv_int_min: ADV_INTERVAL_UNITS,
        adv_int_max: ADV_INTERVAL_UNITS,
        adv_type: sys::esp_ble_adv_type_t_ADV_TYPE_NONCONN_IND,
        own_addr_type: sys::esp_ble_addr_type_t_BLE_ADDR_TYPE_PUBLIC,
        channel_map: sys::esp_ble_adv_channel_t_ADV_CHNL_ALL,
        adv_filter_policy: sys::esp_ble_adv_filter_t_ADV_FILTER_ALLOW_SCAN_ANY_CON_ANY,
        ..Default::default()
    }
}

unsafe extern "C" fn gap_event(event: sys::esp_gap_ble_cb_event_t, param: *mut sys::esp_ble_gap_cb_param_t) {
    if param.is_null() {
        return;
    }
    match event {
        sys::esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_DATA_RAW_SET_COMPLETE_EVT => {
            if ADV_WANTED.load(Ordering::Acquire) {
                let mut params = adv_params();
                if let Err(e) = esp!(sys::esp_ble_gap_start_advertising(&mut params)) {
                    log::warn!("Advertising start failed: {}", e);
                }
            }
        }
        sys::esp_gap_ble_cb_event_t_ESP_GAP_BLE_SCAN_RESULT_EVT => {
            let result = &(*param).scan_rst;
            if result.search_evt != sys::esp_gap_search_evt_t_ESP_GAP_SEARCH_INQ_RES_EVT {
                return;
            }
            let len = (result.adv_data_len as usize).min(result.ble_adv.len());
            if let Some(observer) = OBSERVER.get() {
                observer.on_observation(&result.ble_adv[..len], result.rssi);
            }
        }
        _ => {}
    }
}

impl Radio for BleRadio<'_> {
    fn start_advertising(&mut self, payload: &[u8]) -> anyhow::Result<()> {
        let mut data = payload.to_vec();
        ADV_WANTED.store(true, Ordering::Release);
        unsafe {
            esp!(sys::esp_ble_gap_config_adv_data_raw(data.as_mut_ptr(), data.len() as u32))?;
        }
        Ok(())
    }

    fn stop_advertising(&mut self) {
        ADV_WANTED.store(false, Ordering::Release);
        if let Err(e) = unsafe { esp!(sys::esp_ble_gap_stop_advertising()) } {
            log::warn!("Advertising stop failed: {}", e);
        }
    }

    fn start_scanning(&mut self) -> anyhow::Result<()> {
        // Duration 0 scans until stopped.
        unsafe {
            esp!(sys::esp_ble_gap_start_scanning(0))?;
        }
        Ok(())
    }

    fn stop_scanning(&mut self) {
        if let Err(e) = unsafe { esp!(sys::esp_ble_gap_stop_scanning()) } {
            log::warn!("Scan stop failed: {}", e);
        }
    }
}
