//! ESP-IDF implementations of the hardware traits.

pub mod ble;
pub mod broker;
pub mod haptic;
pub mod imu;
pub mod nfc;
pub mod wifi;

use std::sync::{Mutex, MutexGuard, PoisonError};

use esp_idf_hal::i2c::I2cDriver;

/// Thread-safe handle to the I2C bus shared by the IMU and the tag.
pub type SharedBus = &'static Mutex<I2cDriver<'static>>;

pub(crate) fn lock_bus(bus: SharedBus) -> MutexGuard<'static, I2cDriver<'static>> {
    bus.lock().unwrap_or_else(PoisonError::into_inner)
}
