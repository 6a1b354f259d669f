// Handshake Badge: ST25DV Dynamic Tag Driver
//
// User memory is addressed with a 16-bit big-endian offset. EEPROM
// programming takes 5 ms per 4-byte block, so images go out in small chunks
// with a settle delay after each.

use esp_idf_hal::delay::FreeRtos;

use crate::config::*;
use crate::drivers::{lock_bus, SharedBus};
use crate::tag::{blank_image, tag_image, TagWriter};

const BLOCK_LEN: usize = 4;
const BLOCK_PROGRAM_MS: u32 = 5;

pub struct St25dv {
    bus: SharedBus,
}

impl St25dv {
    pub fn new(bus: SharedBus) -> Self {
        Self { bus }
    }

    fn write_image(&mut self, image: &[u8]) -> anyhow::Result<()> {
        let mut frame = [0u8; 2 + TAG_WRITE_CHUNK];
        for (i, chunk) in image.chunks(TAG_WRITE_CHUNK).enumerate() {
            let addr = (i * TAG_WRITE_CHUNK) as u16;
            frame[..2].copy_from_slice(&addr.to_be_bytes());
            frame[2..2 + chunk.len()].copy_from_slice(chunk);

            lock_bus(self.bus).write(I2C_ADDR_ST25DV_USER, &frame[..2 + chunk.len()], I2C_TIMEOUT_TICKS)?;
            FreeRtos::delay_ms(chunk.len().div_ceil(BLOCK_LEN) as u32 * BLOCK_PROGRAM_MS + 1);
        }
        Ok(())
    }
}

impl TagWriter for St25dv {
    fn probe(&mut self) -> bool {
        let mut buf = [0u8; 1];
        lock_bus(self.bus)
            .write_read(I2C_ADDR_ST25DV_USER, &[0x00, 0x00], &mut buf, I2C_TIMEOUT_TICKS)
            .is_ok()
    }

    fn write_uri(&mut self, uri: &str) -> anyhow::Result<()> {
        let image = tag_image(uri)?;
        self.write_image(&image)?;
        log::debug!("Tag image written ({} bytes)", image.len());
        Ok(())
    }

    fn erase(&mut self) -> anyhow::Result<()> {
        self.write_image(&blank_image(TAG_ERASE_LEN))?;
        log::info!("Tag erased");
        Ok(())
    }
}
