use std::ops::RangeInclusive;

/// Bit helpers shared by the decoder and the status register.
///
/// Indexes go from lsb to msb (right to left), `get_bits(3..=5)` returns
/// the three bits starting at bit 3 moved down to position 0.
pub trait Bits: Copy {
    const WIDTH: u32;

    fn get_bit(self, bit_idx: u8) -> bool;

    #[must_use]
    fn with_bit(self, bit_idx: u8, value: bool) -> Self;

    fn set_bit(&mut self, bit_idx: u8, value: bool) {
        *self = self.with_bit(bit_idx, value);
    }

    #[must_use]
    fn get_bits(self, bits_range: RangeInclusive<u8>) -> Self;

    /// Interprets the lowest `width` bits as a two's complement number
    /// and widens it to the full 32 bits.
    fn sign_extended(self, width: u32) -> u32;
}

macro_rules! impl_bits {
    ($($ty:ty),*) => {
        $(
            impl Bits for $ty {
                const WIDTH: u32 = <$ty>::BITS;

                #[inline]
                fn get_bit(self, bit_idx: u8) -> bool {
                    debug_assert!(u32::from(bit_idx) < Self::WIDTH);
                    (self >> bit_idx) & 1 == 1
                }

                #[inline]
                fn with_bit(self, bit_idx: u8, value: bool) -> Self {
                    debug_assert!(u32::from(bit_idx) < Self::WIDTH);
                    let mask: $ty = 1 << bit_idx;
                    if value { self | mask } else { self & !mask }
                }

                #[inline]
                fn get_bits(self, bits_range: RangeInclusive<u8>) -> Self {
                    let start = *bits_range.start();
                    let length = u32::from(*bits_range.end() - start) + 1;
                    debug_assert!(u32::from(start) + length <= Self::WIDTH);

                    // `length` ones, computed in the wider type so a full-width
                    // range does not overflow the shift.
                    let mask = ((1_u64 << length) - 1) as $ty;
                    (self >> start) & mask
                }

                #[inline]
                fn sign_extended(self, width: u32) -> u32 {
                    debug_assert!(width > 0 && width <= 32);
                    let shift = 32 - width;
                    ((u32::from(self) << shift) as i32 >> shift) as u32
                }
            }
        )*
    };
}

impl_bits!(u8, u16, u32);
