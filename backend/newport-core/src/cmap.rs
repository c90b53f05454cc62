//! CMAP indexed color lookup

use bincode::{Decode, Encode};
use newport_common::boxedarray::BoxedDwordArray;

pub const PALETTE_LEN: usize = 0x10000;

// Entries visible to the display path
pub const DISPLAY_PALETTE_LEN: usize = 0x2000;

const REG_ADDRESS: u32 = 0;
const REG_PALETTE_DATA: u32 = 1;
const REG_PALETTE_DATA_ALT: u32 = 2;
const REG_STATUS: u32 = 3;
const REG_REVISION: u32 = 4;

// Palette writes complete immediately, so the busy bit (2) never reads set
const STATUS_IDLE: u32 = 0x08;

#[derive(Debug, Clone, Encode, Decode)]
pub struct Cmap {
    revision: u32,
    palette_index: u16,
    palette: BoxedDwordArray<PALETTE_LEN>,
}

impl Cmap {
    #[must_use]
    pub fn new(revision: u32) -> Self {
        Self { revision, palette_index: 0, palette: BoxedDwordArray::new() }
    }

    /// Soft reset. Palette contents are preserved.
    pub fn reset(&mut self) {
        self.palette_index = 0;
    }

    #[must_use]
    pub fn read(&self, register: u32) -> u32 {
        match register {
            REG_ADDRESS => self.palette_index.into(),
            REG_PALETTE_DATA | REG_PALETTE_DATA_ALT => self.palette[self.palette_index as usize],
            REG_STATUS => STATUS_IDLE,
            REG_REVISION => self.revision,
            _ => {
                log::warn!("CMAP read from unknown register {register}");
                0
            }
        }
    }

    pub fn write(&mut self, register: u32, value: u32) {
        match register {
            REG_ADDRESS => {
                self.palette_index = value as u16;
                log::trace!("CMAP palette index write: {:04X}", self.palette_index);
            }
            REG_PALETTE_DATA | REG_PALETTE_DATA_ALT => {
                self.palette[self.palette_index as usize] = value & 0xFF_FFFF;
                log::trace!("CMAP palette[{:04X}] = {:06X}", self.palette_index, value & 0xFF_FFFF);

                self.palette_index = self.palette_index.wrapping_add(1);
            }
            REG_STATUS | REG_REVISION => {
                log::warn!("CMAP write to read-only register {register}: {value:08X}");
            }
            _ => {
                log::warn!("CMAP write to unknown register {register}: {value:08X}");
            }
        }
    }

    #[must_use]
    pub fn palette_index(&self) -> u16 {
        self.palette_index
    }

    /// Full palette table, RGB in the low 24 bits of each entry.
    #[must_use]
    pub fn palette_base(&self) -> &[u32; PALETTE_LEN] {
        &self.palette
    }

    #[must_use]
    pub fn palette_entry(&self, index: u32) -> u32 {
        self.palette[(index as usize) & (PALETTE_LEN - 1)]
    }

    #[must_use]
    pub fn revision(&self) -> u32 {
        self.revision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_writes_auto_increment() {
        let mut cmap = Cmap::new(0xA0);

        cmap.write(REG_ADDRESS, 5);
        for value in [0x11_1111, 0x22_2222, 0x33_3333] {
            cmap.write(REG_PALETTE_DATA, value);
        }

        assert_eq!(&cmap.palette_base()[5..8], &[0x11_1111, 0x22_2222, 0x33_3333]);
        assert_eq!(cmap.read(REG_ADDRESS), 8);
    }

    #[test]
    fn data_reads_do_not_advance() {
        let mut cmap = Cmap::new(0xA0);
        cmap.write(REG_ADDRESS, 0x100);
        cmap.write(REG_PALETTE_DATA_ALT, 0xFF12_3456);
        cmap.write(REG_ADDRESS, 0x100);

        assert_eq!(cmap.read(REG_PALETTE_DATA), 0x12_3456);
        assert_eq!(cmap.read(REG_PALETTE_DATA), 0x12_3456);
        assert_eq!(cmap.palette_index(), 0x100);
    }

    #[test]
    fn index_wraps_at_table_size() {
        let mut cmap = Cmap::new(0xA1);
        cmap.write(REG_ADDRESS, 0xFFFF);
        cmap.write(REG_PALETTE_DATA, 0xAB_CDEF);
        cmap.write(REG_PALETTE_DATA, 0x12_3456);

        assert_eq!(cmap.palette_entry(0xFFFF), 0xAB_CDEF);
        assert_eq!(cmap.palette_entry(0), 0x12_3456);
        assert_eq!(cmap.palette_index(), 1);
    }

    #[test]
    fn revision_and_status() {
        let mut cmap = Cmap::new(0xA1);
        cmap.write(REG_REVISION, 0);
        assert_eq!(cmap.read(REG_REVISION), 0xA1);
        assert_eq!(cmap.read(REG_STATUS), STATUS_IDLE);
    }

    #[test]
    fn reset_preserves_palette() {
        let mut cmap = Cmap::new(0xA0);
        cmap.write(REG_ADDRESS, 0x1C00);
        cmap.write(REG_PALETTE_DATA, 0x00_FF00);

        cmap.reset();
        assert_eq!(cmap.palette_index(), 0);
        assert_eq!(cmap.palette_entry(0x1C00), 0x00_FF00);
    }
}
