// Handshake Badge: BNO055 IMU Driver
//
// Register-level driver over the shared I2C bus. The sensor runs its own
// fusion (NDOF mode), so linear acceleration already has gravity removed.

use esp_idf_hal::delay::FreeRtos;

use crate::config::*;
use crate::drivers::{lock_bus, SharedBus};
use crate::events::SensorData;
use crate::gesture::InertialSensor;

const REG_CHIP_ID: u8 = 0x00;
const REG_GYR_DATA_X_LSB: u8 = 0x14; // Start of gyro..linear-accel burst
const REG_UNIT_SEL: u8 = 0x3B;
const REG_OPR_MODE: u8 = 0x3D;
const REG_PWR_MODE: u8 = 0x3E;
const REG_SYS_TRIGGER: u8 = 0x3F;

const CHIP_ID_EXPECTED: u8 = 0xA0;
const MODE_CONFIG: u8 = 0x00;
const MODE_NDOF: u8 = 0x0C;
const POWER_NORMAL: u8 = 0x00;
const TRIGGER_RESET: u8 = 0x20;

// Offsets inside the 26-byte burst starting at GYR_DATA_X_LSB.
const GYRO_OFFSET: usize = 0;
const LIA_OFFSET: usize = 0x28 - REG_GYR_DATA_X_LSB as usize;
const BURST_LEN: usize = LIA_OFFSET + 6;

pub struct Bno055 {
    bus: SharedBus,
}

impl Bno055 {
    pub fn new(bus: SharedBus) -> Self {
        Self { bus }
    }

    pub fn is_connected(&self) -> bool {
        let mut buf = [0u8; 1];
        match lock_bus(self.bus).write_read(I2C_ADDR_BNO055, &[REG_CHIP_ID], &mut buf, I2C_TIMEOUT_TICKS) {
            Ok(()) => buf[0] == CHIP_ID_EXPECTED,
            Err(_) => false,
        }
    }

    fn write_reg(&self, reg: u8, value: u8) -> anyhow::Result<()> {
        lock_bus(self.bus).write(I2C_ADDR_BNO055, &[reg, value], I2C_TIMEOUT_TICKS)?;
        Ok(())
    }
}

fn axis(raw: &[u8], offset: usize, lsb_per_unit: f32) -> f32 {
    i16::from_le_bytes([raw[offset], raw[offset + 1]]) as f32 / lsb_per_unit
}

impl InertialSensor for Bno055 {
    /// Reset, then enter NDOF fusion with m/s² and °/s units.
    fn init(&mut self) -> anyhow::Result<()> {
        anyhow::ensure!(self.is_connected(), "BNO055 not found at {:#04x}", I2C_ADDR_BNO055);

        self.write_reg(REG_OPR_MODE, MODE_CONFIG)?;
        FreeRtos::delay_ms(25);
        self.write_reg(REG_SYS_TRIGGER, TRIGGER_RESET)?;
        FreeRtos::delay_ms(650);
        anyhow::ensure!(self.is_connected(), "BNO055 did not come back after reset");

        self.write_reg(REG_PWR_MODE, POWER_NORMAL)?;
        self.write_reg(REG_UNIT_SEL, 0x00)?;
        self.write_reg(REG_SYS_TRIGGER, 0x00)?;
        self.write_reg(REG_OPR_MODE, MODE_NDOF)?;
        FreeRtos::delay_ms(20);

        log::info!("BNO055 initialised (NDOF)");
        Ok(())
    }

    /// One burst read covering gyro and linear acceleration.
    fn read(&mut self) -> anyhow::Result<SensorData> {
        let mut raw = [0u8; BURST_LEN];
        lock_bus(self.bus).write_read(I2C_ADDR_BNO055, &[REG_GYR_DATA_X_LSB], &mut raw, I2C_TIMEOUT_TICKS)?;

        Ok(SensorData {
            ax: axis(&raw, LIA_OFFSET, LINEAR_ACCEL_LSB_PER_MS2),
            ay: axis(&raw, LIA_OFFSET + 2, LINEAR_ACCEL_LSB_PER_MS2),
            az: axis(&raw, LIA_OFFSET + 4, LINEAR_ACCEL_LSB_PER_MS2),
            gx: axis(&raw, GYRO_OFFSET, GYRO_LSB_PER_DPS),
            gy: axis(&raw, GYRO_OFFSET + 2, GYRO_LSB_PER_DPS),
            gz: axis(&raw, GYRO_OFFSET + 4, GYRO_LSB_PER_DPS),
        })
    }
}
