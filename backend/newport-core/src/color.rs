//! Packed pixel formats and conversions between them
//!
//! Storage order is BGR with blue in the most significant bits:
//!
//! | Depth | Blue  | Green | Red  |
//! |-------|-------|-------|------|
//! | 4bpp  | 3     | 2:1   | 0    |
//! | 8bpp  | 7:6   | 5:3   | 2:0  |
//! | 12bpp | 11:8  | 7:4   | 3:0  |
//! | 24bpp | 23:16 | 15:8  | 7:0  |
//!
//! Channels widen to 8 bits by bit replication and narrow by truncation. Every conversion
//! between two depths goes through 24bpp.

use bincode::{Decode, Encode};
use newport_common::num::GetBit;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub enum PixelDepth {
    Bpp4 = 0,
    Bpp8 = 1,
    Bpp12 = 2,
    #[default]
    Bpp24 = 3,
}

impl PixelDepth {
    pub fn from_bits(bits: u32) -> Self {
        match bits & 3 {
            0 => Self::Bpp4,
            1 => Self::Bpp8,
            2 => Self::Bpp12,
            3 => Self::Bpp24,
            _ => unreachable!("value & 3 is always <= 3"),
        }
    }

    #[must_use]
    pub fn bits_per_pixel(self) -> u32 {
        match self {
            Self::Bpp4 => 4,
            Self::Bpp8 => 8,
            Self::Bpp12 => 12,
            Self::Bpp24 => 24,
        }
    }

    #[must_use]
    pub fn pixel_mask(self) -> u32 {
        (1 << self.bits_per_pixel()) - 1
    }

    /// Bit offset of the second buffer when double-buffered writes are enabled. 24bpp has no
    /// room for a second buffer and always stores at offset 0.
    #[must_use]
    pub fn store_shift(self) -> u32 {
        match self {
            Self::Bpp4 => 4,
            Self::Bpp8 => 8,
            Self::Bpp12 => 12,
            Self::Bpp24 => 0,
        }
    }
}

impl Display for PixelDepth {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}bpp", self.bits_per_pixel())
    }
}

pub type ConvertFn = fn(u32) -> u32;

#[inline]
fn widen_1(value: u32) -> u32 {
    if value.bit(0) { 0xFF } else { 0x00 }
}

#[inline]
fn widen_2(value: u32) -> u32 {
    (value & 3) * 0x55
}

#[inline]
fn widen_3(value: u32) -> u32 {
    let value = value & 7;
    (value << 5) | (value << 2) | (value >> 1)
}

#[inline]
fn widen_4(value: u32) -> u32 {
    (value & 0xF) * 0x11
}

#[inline]
fn pack_bgr24(r: u32, g: u32, b: u32) -> u32 {
    (b << 16) | (g << 8) | r
}

#[inline]
fn unpack_bgr24(value: u32) -> (u32, u32, u32) {
    (value.bits(0..=7), value.bits(8..=15), value.bits(16..=23))
}

#[must_use]
pub fn bgr4_to_bgr24(value: u32) -> u32 {
    pack_bgr24(widen_1(value), widen_2(value >> 1), widen_1(value >> 3))
}

#[must_use]
pub fn bgr8_to_bgr24(value: u32) -> u32 {
    pack_bgr24(widen_3(value), widen_3(value >> 3), widen_2(value >> 6))
}

#[must_use]
pub fn bgr12_to_bgr24(value: u32) -> u32 {
    pack_bgr24(widen_4(value), widen_4(value >> 4), widen_4(value >> 8))
}

#[must_use]
pub fn bgr24_to_bgr24(value: u32) -> u32 {
    value & 0xFF_FFFF
}

#[must_use]
pub fn bgr24_to_bgr4(value: u32) -> u32 {
    let (r, g, b) = unpack_bgr24(value);
    ((b >> 7) << 3) | ((g >> 6) << 1) | (r >> 7)
}

#[must_use]
pub fn bgr24_to_bgr8(value: u32) -> u32 {
    let (r, g, b) = unpack_bgr24(value);
    ((b >> 6) << 6) | ((g >> 5) << 3) | (r >> 5)
}

#[must_use]
pub fn bgr24_to_bgr12(value: u32) -> u32 {
    let (r, g, b) = unpack_bgr24(value);
    ((b >> 4) << 8) | ((g >> 4) << 4) | (r >> 4)
}

/// Widen a stored pixel of the given depth to 24bpp BGR.
#[must_use]
pub fn to_bgr24(depth: PixelDepth, value: u32) -> u32 {
    match depth {
        PixelDepth::Bpp4 => bgr4_to_bgr24(value),
        PixelDepth::Bpp8 => bgr8_to_bgr24(value),
        PixelDepth::Bpp12 => bgr12_to_bgr24(value),
        PixelDepth::Bpp24 => bgr24_to_bgr24(value),
    }
}

#[must_use]
pub fn from_bgr24(depth: PixelDepth, value: u32) -> u32 {
    match depth {
        PixelDepth::Bpp4 => bgr24_to_bgr4(value),
        PixelDepth::Bpp8 => bgr24_to_bgr8(value),
        PixelDepth::Bpp12 => bgr24_to_bgr12(value),
        PixelDepth::Bpp24 => bgr24_to_bgr24(value),
    }
}

/// Swap a 24bpp BGR value into display order, R in bits 23:16.
#[must_use]
pub fn bgr24_to_rgb24(value: u32) -> u32 {
    let (r, g, b) = unpack_bgr24(value);
    (r << 16) | (g << 8) | b
}

/// Widen a stored pixel to 24bpp in display (RGB) order.
#[must_use]
pub fn to_rgb24(depth: PixelDepth, value: u32) -> u32 {
    bgr24_to_rgb24(to_bgr24(depth, value))
}

/// Host-endian swap of a pixel of the given depth.
#[must_use]
pub fn byte_swap(depth: PixelDepth, value: u32) -> u32 {
    match depth {
        PixelDepth::Bpp4 | PixelDepth::Bpp8 => value,
        PixelDepth::Bpp12 => u32::from((value as u16).swap_bytes()),
        PixelDepth::Bpp24 => value.swap_bytes(),
    }
}

macro_rules! via_bgr24 {
    ($name:ident, $from:ident, $to:ident) => {
        fn $name(value: u32) -> u32 {
            $to($from(value))
        }
    };
}

via_bgr24!(bgr4_to_bgr8, bgr4_to_bgr24, bgr24_to_bgr8);
via_bgr24!(bgr4_to_bgr12, bgr4_to_bgr24, bgr24_to_bgr12);
via_bgr24!(bgr8_to_bgr4, bgr8_to_bgr24, bgr24_to_bgr4);
via_bgr24!(bgr8_to_bgr12, bgr8_to_bgr24, bgr24_to_bgr12);
via_bgr24!(bgr12_to_bgr4, bgr12_to_bgr24, bgr24_to_bgr4);
via_bgr24!(bgr12_to_bgr8, bgr12_to_bgr24, bgr24_to_bgr8);

fn bgr4_identity(value: u32) -> u32 {
    value & 0xF
}

fn bgr8_identity(value: u32) -> u32 {
    value & 0xFF
}

fn bgr12_identity(value: u32) -> u32 {
    value & 0xFFF
}

// Indexed [from][to]
const CONVERTERS: [[ConvertFn; 4]; 4] = [
    [bgr4_identity, bgr4_to_bgr8, bgr4_to_bgr12, bgr4_to_bgr24],
    [bgr8_to_bgr4, bgr8_identity, bgr8_to_bgr12, bgr8_to_bgr24],
    [bgr12_to_bgr4, bgr12_to_bgr8, bgr12_identity, bgr12_to_bgr24],
    [bgr24_to_bgr4, bgr24_to_bgr8, bgr24_to_bgr12, bgr24_to_bgr24],
];

/// Look up the conversion from one stored depth to another. Intended to be resolved once per
/// command and then called per pixel.
#[must_use]
pub fn converter(from: PixelDepth, to: PixelDepth) -> ConvertFn {
    CONVERTERS[from as usize][to as usize]
}
