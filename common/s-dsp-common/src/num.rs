use std::ops::RangeInclusive;

pub trait GetBit {
    #[must_use]
    fn bit(self, i: u8) -> bool;

    #[must_use]
    fn bits(self, range: RangeInclusive<u8>) -> Self;
}

macro_rules! impl_get_bit {
    ($t:ty) => {
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

                (self >> start) & ((1 << (end - start + 1)) - 1)
            }
        }
    };
}

impl_get_bit!(u8);
impl_get_bit!(u16);
impl_get_bit!(i32);

pub trait U16Ext {
    fn lsb(self) -> u8;

    fn msb(self) -> u8;

    fn set_lsb(&mut self, value: u8);

    fn set_msb(&mut self, value: u8);
}

impl U16Ext for u16 {
    #[inline(always)]
    fn lsb(self) -> u8 {
        self as u8
    }

    #[inline(always)]
    fn msb(self) -> u8 {
        (self >> 8) as u8
    }

    #[inline(always)]
    fn set_lsb(&mut self, value: u8) {
        *self = (*self & 0xFF00) | u16::from(value);
    }

    #[inline(always)]
    fn set_msb(&mut self, value: u8) {
        *self = (*self & 0x00FF) | (u16::from(value) << 8);
    }
}

/// Saturate a 32-bit intermediate to the signed 16-bit range.
pub trait ClampI16 {
    #[must_use]
    fn clamp_i16(self) -> i16;
}

impl ClampI16 for i32 {
    #[inline(always)]
    fn clamp_i16(self) -> i16 {
        self.clamp(i16::MIN.into(), i16::MAX.into()) as i16
    }
}

/// Read a little-endian 16-bit word, wrapping the second byte's address within `memory`.
#[inline]
#[must_use]
pub fn read_u16_le(memory: &[u8], address: usize) -> u16 {
    let len = memory.len();
    u16::from_le_bytes([memory[address % len], memory[(address + 1) % len]])
}

/// Write a little-endian 16-bit word, wrapping the second byte's address within `memory`.
#[inline]
pub fn write_u16_le(memory: &mut [u8], address: usize, value: u16) {
    let len = memory.len();
    let [lsb, msb] = value.to_le_bytes();
    memory[address % len] = lsb;
    memory[(address + 1) % len] = msb;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_ranges() {
        assert!(0x80_u8.bit(7));
        assert!(!0x80_u8.bit(6));
        assert_eq!(0x0D, 0xD5_u8.bits(4..=7));
        assert_eq!(0x03, 0b0000_1100_u8.bits(2..=3));
    }

    #[test]
    fn u16_halves() {
        let mut value = 0x1234_u16;
        assert_eq!(0x34, value.lsb());
        assert_eq!(0x12, value.msb());

        value.set_msb(0xAB);
        value.set_lsb(0xCD);
        assert_eq!(0xABCD, value);
    }

    #[test]
    fn clamps_to_16_bits() {
        assert_eq!(i16::MAX, 40000.clamp_i16());
        assert_eq!(i16::MIN, (-40000).clamp_i16());
        assert_eq!(-5, (-5).clamp_i16());
    }

    #[test]
    fn words_wrap_at_end_of_memory() {
        let mut memory = [0_u8; 4];
        write_u16_le(&mut memory, 3, 0xBEEF);
        assert_eq!([0xBE, 0, 0, 0xEF], memory);
        assert_eq!(0xBEEF, read_u16_le(&memory, 3));
    }
}
