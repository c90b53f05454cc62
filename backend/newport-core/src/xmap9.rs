//! XMAP9 pixel-mode resolver
//!
//! Each XMAP9 holds a 32-entry mode table that tells the display path how to interpret the
//! stored value of a pixel, selected per span by the VC2's display-ID entries.

use crate::color::PixelDepth;
use bincode::{Decode, Encode};
use newport_common::num::GetBit;

pub const MODE_TABLE_LEN: usize = 32;

// Register selects on the DCB
const REG_CONFIG: u32 = 0;
const REG_REVISION: u32 = 1;
const REG_FIFO_AVAILABLE: u32 = 2;
const REG_CURSOR_CMAP: u32 = 3;
const REG_POPUP_CMAP: u32 = 4;
const REG_MODE_TABLE_DATA: u32 = 5;
const REG_MODE_TABLE_INDEX: u32 = 7;

// The XMAP9 input FIFO is never modeled as filling up
const FIFO_AVAILABLE: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub enum PixelMode {
    #[default]
    ColorIndex = 0,
    // 4/8bpp RGB through the CMAP's upper region
    Rgb0 = 1,
    Rgb1 = 2,
    Rgb2 = 3,
}

impl PixelMode {
    fn from_bits(bits: u32) -> Self {
        match bits & 3 {
            0 => Self::ColorIndex,
            1 => Self::Rgb0,
            2 => Self::Rgb1,
            3 => Self::Rgb2,
            _ => unreachable!("value & 3 is always <= 3"),
        }
    }
}

/// Decoded mode table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub struct ModeEntry {
    pub raw: u32,
    /// Upper bits of the CMAP index in color index mode, already shifted into place
    pub ci_msb: u32,
    pub pixel_mode: PixelMode,
    pub pixel_size: PixelDepth,
    pub buffer_select: bool,
    pub overlay_enabled: bool,
}

impl ModeEntry {
    #[must_use]
    pub fn decode(raw: u32) -> Self {
        Self {
            raw: raw & 0xFF_FFFF,
            ci_msb: (raw & 0xF8) << 5,
            pixel_mode: PixelMode::from_bits(raw.bits(8..=9)),
            pixel_size: PixelDepth::from_bits(raw.bits(10..=11)),
            buffer_select: raw.bit(12),
            overlay_enabled: raw.bit(16),
        }
    }
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct Xmap9 {
    revision: u32,
    config: u32,
    cursor_cmap: u32,
    popup_cmap: u32,
    mode_table_index: u32,
    mode_table: [u32; MODE_TABLE_LEN],
}

impl Xmap9 {
    #[must_use]
    pub fn new(revision: u32) -> Self {
        Self {
            revision,
            config: 0,
            cursor_cmap: 0,
            popup_cmap: 0,
            mode_table_index: 0,
            mode_table: [0; MODE_TABLE_LEN],
        }
    }

    /// Soft reset. The mode table is preserved.
    pub fn reset(&mut self) {
        self.config = 0;
        self.cursor_cmap = 0;
        self.popup_cmap = 0;
        self.mode_table_index = 0;
    }

    #[must_use]
    pub fn read(&self, register: u32) -> u32 {
        match register {
            REG_CONFIG => self.config,
            REG_REVISION => self.revision,
            REG_FIFO_AVAILABLE => FIFO_AVAILABLE,
            REG_CURSOR_CMAP => self.cursor_cmap,
            REG_POPUP_CMAP => self.popup_cmap,
            REG_MODE_TABLE_DATA => self.mode_table[self.mode_table_index as usize],
            REG_MODE_TABLE_INDEX => self.mode_table_index,
            _ => {
                log::warn!("XMAP9 read from unknown register {register}");
                0
            }
        }
    }

    pub fn write(&mut self, register: u32, value: u32) {
        match register {
            REG_CONFIG => {
                self.config = value & 0xFF;
                log::debug!("XMAP9 config write: {value:02X} (8bpp={})", self.is_8bpp());
            }
            REG_REVISION | REG_FIFO_AVAILABLE => {
                log::warn!("XMAP9 write to read-only register {register}: {value:08X}");
            }
            REG_CURSOR_CMAP => {
                self.cursor_cmap = value & 0xFF;
                log::debug!("XMAP9 cursor colormap write: {value:02X}");
            }
            REG_POPUP_CMAP => {
                self.popup_cmap = value & 0xFF;
                log::debug!("XMAP9 pop-up colormap write: {value:02X}");
            }
            REG_MODE_TABLE_DATA => {
                // Index in the top byte, entry in the low 24 bits
                let index = value.bits(24..=28) as usize;
                self.mode_table[index] = value & 0xFF_FFFF;
                log::debug!("XMAP9 mode table[{index}] = {:06X}", self.mode_table[index]);
            }
            REG_MODE_TABLE_INDEX => {
                self.mode_table_index = value & (MODE_TABLE_LEN as u32 - 1);
            }
            _ => {
                log::warn!("XMAP9 write to unknown register {register}: {value:08X}");
            }
        }
    }

    #[must_use]
    pub fn is_8bpp(&self) -> bool {
        self.config.bit(2)
    }

    #[must_use]
    pub fn mode_entry(&self, index: usize) -> ModeEntry {
        ModeEntry::decode(self.mode_table[index % MODE_TABLE_LEN])
    }

    #[must_use]
    pub fn raw_mode_entry(&self, index: usize) -> u32 {
        self.mode_table[index % MODE_TABLE_LEN]
    }

    #[must_use]
    pub fn cursor_cmap(&self) -> u32 {
        self.cursor_cmap
    }

    #[must_use]
    pub fn popup_cmap(&self) -> u32 {
        self.popup_cmap
    }

    #[must_use]
    pub fn config(&self) -> u32 {
        self.config
    }

    #[must_use]
    pub fn revision(&self) -> u32 {
        self.revision
    }

    #[must_use]
    pub fn mode_table_index(&self) -> u32 {
        self.mode_table_index
    }
}
