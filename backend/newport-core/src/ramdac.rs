//! Bt445-style RAMDAC output stage
//!
//! Applies a per-channel gamma LUT to every composed pixel on its way to the display.

use bincode::{Decode, Encode};

const REG_LUT_INDEX: u32 = 0;
const REG_LUT_DATA: u32 = 1;
const REG_COMMAND: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
enum LutChannel {
    #[default]
    Red,
    Green,
    Blue,
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct Ramdac {
    lut_index: u8,
    lut_channel: LutChannel,
    command: u32,
    red_lut: [u8; 256],
    green_lut: [u8; 256],
    blue_lut: [u8; 256],
}

fn identity_lut() -> [u8; 256] {
    std::array::from_fn(|i| i as u8)
}

impl Ramdac {
    #[must_use]
    pub fn new() -> Self {
        Self {
            lut_index: 0,
            lut_channel: LutChannel::default(),
            command: 0,
            red_lut: identity_lut(),
            green_lut: identity_lut(),
            blue_lut: identity_lut(),
        }
    }

    #[must_use]
    pub fn read(&mut self, register: u32) -> u32 {
        match register {
            REG_LUT_INDEX => self.lut_index.into(),
            REG_LUT_DATA => {
                let i = self.lut_index as usize;
                let value = match self.lut_channel {
                    LutChannel::Red => self.red_lut[i],
                    LutChannel::Green => self.green_lut[i],
                    LutChannel::Blue => self.blue_lut[i],
                };
                self.advance_channel();
                value.into()
            }
            REG_COMMAND => self.command,
            _ => {
                log::warn!("RAMDAC read from unknown register {register}");
                0
            }
        }
    }

    pub fn write(&mut self, register: u32, value: u32) {
        match register {
            REG_LUT_INDEX => {
                self.lut_index = value as u8;
                self.lut_channel = LutChannel::Red;
            }
            REG_LUT_DATA => {
                let i = self.lut_index as usize;
                match self.lut_channel {
                    LutChannel::Red => self.red_lut[i] = value as u8,
                    LutChannel::Green => self.green_lut[i] = value as u8,
                    LutChannel::Blue => self.blue_lut[i] = value as u8,
                }
                self.advance_channel();
            }
            REG_COMMAND => {
                self.command = value & 0xFF;
                log::debug!("RAMDAC command write: {value:02X}");
            }
            _ => {
                log::warn!("RAMDAC write to unknown register {register}: {value:08X}");
            }
        }
    }

    fn advance_channel(&mut self) {
        self.lut_channel = match self.lut_channel {
            LutChannel::Red => LutChannel::Green,
            LutChannel::Green => LutChannel::Blue,
            LutChannel::Blue => {
                self.lut_index = self.lut_index.wrapping_add(1);
                LutChannel::Red
            }
        };
    }

    /// Map a packed `0x00RRGGBB` value through the channel LUTs.
    #[must_use]
    pub fn remap(&self, rgb: u32) -> u32 {
        let r = self.red_lut[((rgb >> 16) & 0xFF) as usize];
        let g = self.green_lut[((rgb >> 8) & 0xFF) as usize];
        let b = self.blue_lut[(rgb & 0xFF) as usize];
        (u32::from(r) << 16) | (u32::from(g) << 8) | u32::from(b)
    }

    #[must_use]
    pub fn lut_index(&self) -> u8 {
        self.lut_index
    }

    #[must_use]
    pub fn command(&self) -> u32 {
        self.command
    }
}

impl Default for Ramdac {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_after_reset() {
        let ramdac = Ramdac::new();
        assert_eq!(ramdac.remap(0x12_3456), 0x12_3456);
    }

    #[test]
    fn lut_writes_in_rgb_order() {
        let mut ramdac = Ramdac::new();

        ramdac.write(REG_LUT_INDEX, 0x10);
        for value in [0xA0, 0xB0, 0xC0, 0x01] {
            ramdac.write(REG_LUT_DATA, value);
        }

        assert_eq!(ramdac.lut_index(), 0x11);
        assert_eq!(ramdac.remap(0x10_1010), 0xA0_B0C0);
        assert_eq!(ramdac.remap(0x11_0000), 0x01_0000);

        ramdac.write(REG_LUT_INDEX, 0x10);
        assert_eq!(ramdac.read(REG_LUT_DATA), 0xA0);
        assert_eq!(ramdac.read(REG_LUT_DATA), 0xB0);
    }
}
