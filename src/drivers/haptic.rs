// Handshake Badge: Haptic Motor Driver
//
// Vibration motor on an LEDC PWM channel (5 kHz, 8-bit).

use esp_idf_hal::gpio::OutputPin;
use esp_idf_hal::ledc::config::TimerConfig;
use esp_idf_hal::ledc::{LedcChannel, LedcDriver, LedcTimer, LedcTimerDriver, Resolution};
use esp_idf_hal::peripheral::Peripheral;
use esp_idf_hal::prelude::*;

use crate::config::*;
use crate::haptic::MotorOutput;

pub struct LedcMotor<'d> {
    driver: LedcDriver<'d>,
}

impl<'d> LedcMotor<'d> {
    pub fn new<C, T>(
        channel: impl Peripheral<P = C> + 'd,
        timer: impl Peripheral<P = T> + 'd,
        pin: impl Peripheral<P = impl OutputPin> + 'd,
    ) -> anyhow::Result<Self>
    where
        C: LedcChannel<SpeedMode = T::SpeedMode>,
        T: LedcTimer + 'd,
    {
        let timer = LedcTimerDriver::new(
            timer,
            &TimerConfig::new()
                .frequency(HAPTIC_PWM_FREQUENCY_HZ.Hz())
                .resolution(Resolution::Bits8),
        )?;
        let mut driver = LedcDriver::new(channel, timer, pin)?;
        driver.set_duty(0)?;
        Ok(Self { driver })
    }
}

impl MotorOutput for LedcMotor<'_> {
    fn set_duty(&mut self, duty: u8) {
        let scaled = u32::from(duty) * self.driver.get_max_duty() / u32::from(u8::MAX);
        if let Err(e) = self.driver.set_duty(scaled) {
            log::warn!("Haptic duty update failed: {}", e);
        }
    }
}
