use std::ops::RangeInclusive;

pub trait GetBit {
    #[must_use]
    fn bit(self, i: u8) -> bool;

    #[must_use]
    fn bits(self, range: RangeInclusive<u8>) -> Self;
}

macro_rules! impl_get_bit {
    ($($t:ty),* $(,)?) => {
        $(
            impl GetBit for $t {
                #[inline]
                fn bit(self, i: u8) -> bool {
                    debug_assert!(i < (<$t>::BITS as u8));
                    self & (1 << i) != 0
                }

                #[inline]
                fn bits(self, range: RangeInclusive<u8>) -> Self {
                    let start = *range.start();
                    let end = *range.end();
                    debug_assert!(end < (<$t>::BITS as u8));

                    let width = u32::from(end - start + 1);
                    if width == <$t>::BITS {
                        return self >> start;
                    }

                    (self >> start) & ((1 << width) - 1)
                }
            }
        )*
    };
}

impl_get_bit!(u8, u16, u32, u64);

/// Two's complement sign extension of a narrow field held in the low bits of a `u32`.
pub trait SignExtend {
    #[must_use]
    fn sign_extend(self, width: u8) -> i32;
}

impl SignExtend for u32 {
    #[inline]
    fn sign_extend(self, width: u8) -> i32 {
        debug_assert!((1..=32).contains(&width));

        let shift = 32 - u32::from(width);
        ((self << shift) as i32) >> shift
    }
}

/// Helpers for a 64-bit bus word made of two 32-bit registers.
///
/// The bus is big-endian: the register at the lower address (address bit 2 clear) occupies the
/// upper half of the word.
pub trait BusWordExt {
    fn high_half(self) -> u32;

    fn low_half(self) -> u32;

    fn accesses_high_half(self) -> bool;

    fn accesses_low_half(self) -> bool;
}

impl BusWordExt for u64 {
    #[inline(always)]
    fn high_half(self) -> u32 {
        (self >> 32) as u32
    }

    #[inline(always)]
    fn low_half(self) -> u32 {
        self as u32
    }

    #[inline(always)]
    fn accesses_high_half(self) -> bool {
        self.high_half() != 0
    }

    #[inline(always)]
    fn accesses_low_half(self) -> bool {
        self.low_half() != 0
    }
}

/// Merge a 32-bit register write, honoring a partial-word byte mask.
#[inline(always)]
#[must_use]
pub fn merge_u32(current: u32, data: u32, mem_mask: u32) -> u32 {
    (current & !mem_mask) | (data & mem_mask)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bits_extracts_full_width_field() {
        assert_eq!(0xDEAD_BEEF_u32.bits(0..=31), 0xDEAD_BEEF);
        assert_eq!(0xDEAD_BEEF_u32.bits(28..=31), 0xD);
        assert_eq!(0b1011_0000_u8.bits(4..=5), 0b11);
    }

    #[test]
    fn sign_extend_narrow_fields() {
        assert_eq!(0x0080_0000_u32.sign_extend(24), -0x0080_0000);
        assert_eq!(0x007F_FFFF_u32.sign_extend(24), 0x007F_FFFF);
        assert_eq!(0xFFFF_u32.sign_extend(16), -1);
        assert_eq!(0x1_0000_u32.sign_extend(16), 0);
    }

    #[test]
    fn bus_word_halves() {
        let word = 0x1122_3344_5566_7788_u64;
        assert_eq!(word.high_half(), 0x1122_3344);
        assert_eq!(word.low_half(), 0x5566_7788);

        let mask = 0xFFFF_FFFF_0000_0000_u64;
        assert!(mask.accesses_high_half());
        assert!(!mask.accesses_low_half());
    }
}
