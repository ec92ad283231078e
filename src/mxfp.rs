//! OCP microscaling (MX) element formats: FP8 (E4M3, E5M2), FP6 (E3M2, E2M3) and
//! FP4 (E2M1).
//!
//! Only E5M2 reserves the all-ones exponent for infinities and NaN. E4M3 reserves the
//! all-ones magnitude for NaN. The 6- and 4-bit formats have no special values.
//!
//! The decode and float16 lookup tables are computed lazily, once per format, and kept
//! in a `OnceLock`. No precomputed tables ship with the crate.

use std::{fmt, sync::OnceLock};

use tracing::debug;

use crate::{
    float16::f16_bits_to_f64,
    minifloat::{Layout, Specials},
};

/// What to do with magnitudes beyond the largest finite value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum MxfpOverflow {
    /// Clamp to the largest finite value of the same sign.
    #[default]
    Saturate,
    /// Map to the format's overflow code (infinity for E5M2, NaN for E4M3).
    Overflow,
}

impl fmt::Display for MxfpOverflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MxfpOverflow::Saturate => "saturate",
            MxfpOverflow::Overflow => "overflow",
        })
    }
}

/// A micro-scaling float element format.
#[derive(Debug)]
pub struct MxfpFormat {
    pub exp_bits: u32,
    pub mantissa_bits: u32,
    pub bias: i32,
    pub overflow: MxfpOverflow,
    pub pos_clamp_value: u8,
    pub neg_clamp_value: u8,
    decode_lut: OnceLock<Vec<f32>>,
    float16_lut: OnceLock<Vec<u8>>,
}

pub static E2M1: MxfpFormat = MxfpFormat::new(2, 1, 1, MxfpOverflow::Saturate);
pub static E2M3: MxfpFormat = MxfpFormat::new(2, 3, 1, MxfpOverflow::Saturate);
pub static E3M2: MxfpFormat = MxfpFormat::new(3, 2, 3, MxfpOverflow::Saturate);
pub static E4M3_SATURATE: MxfpFormat = MxfpFormat::new(4, 3, 7, MxfpOverflow::Saturate);
pub static E5M2_SATURATE: MxfpFormat = MxfpFormat::new(5, 2, 15, MxfpOverflow::Saturate);
pub static E4M3_OVERFLOW: MxfpFormat = MxfpFormat::new(4, 3, 7, MxfpOverflow::Overflow);
pub static E5M2_OVERFLOW: MxfpFormat = MxfpFormat::new(5, 2, 15, MxfpOverflow::Overflow);

impl MxfpFormat {
    pub const fn new(exp_bits: u32, mantissa_bits: u32, bias: i32, overflow: MxfpOverflow) -> Self {
        let mut pos_clamp_value = ((1u32 << (exp_bits + mantissa_bits)) - 1) as u8;
        let mut neg_clamp_value = ((1u32 << (1 + exp_bits + mantissa_bits)) - 1) as u8;
        match (exp_bits, mantissa_bits, overflow) {
            (4, 3, MxfpOverflow::Saturate) => {
                pos_clamp_value = 0x7E;
                neg_clamp_value = 0xFE;
            }
            (4, 3, MxfpOverflow::Overflow) => {
                pos_clamp_value = 0xFF;
                neg_clamp_value = 0xFF;
            }
            (5, 2, MxfpOverflow::Saturate) => {
                pos_clamp_value = 0x7B;
                neg_clamp_value = 0xFB;
            }
            (5, 2, MxfpOverflow::Overflow) => {
                pos_clamp_value = 0x7C;
                neg_clamp_value = 0xFC;
            }
            _ => {}
        }
        Self {
            exp_bits,
            mantissa_bits,
            bias,
            overflow,
            pos_clamp_value,
            neg_clamp_value,
            decode_lut: OnceLock::new(),
            float16_lut: OnceLock::new(),
        }
    }

    pub const fn layout(&self) -> Layout {
        let specials = match (self.exp_bits, self.mantissa_bits) {
            (5, 2) => Specials::Ieee,
            (4, 3) => Specials::NanOnly,
            _ => Specials::None,
        };
        Layout {
            exp_bits: self.exp_bits,
            mantissa_bits: self.mantissa_bits,
            bias: self.bias,
            specials,
        }
    }

    pub const fn bit_length(&self) -> usize {
        (1 + self.exp_bits + self.mantissa_bits) as usize
    }

    /// Best code for `f`. NaN encodes as the all-ones pattern.
    pub fn encode(&self, f: f64) -> u8 {
        let layout = self.layout();
        let all_ones = (1u32 << layout.total_bits()) - 1;
        layout.encode(
            f,
            all_ones,
            self.pos_clamp_value as u32,
            self.neg_clamp_value as u32,
        ) as u8
    }

    pub fn decode(&self, code: u8) -> f64 {
        self.decode_table()[code as usize] as f64
    }

    /// Table from every code to its value, built on first use.
    pub fn decode_table(&self) -> &[f32] {
        self.decode_lut.get_or_init(|| {
            debug!(format = %self, "building mxfp decode table");
            self.layout().decode_table()
        })
    }

    /// 65536-entry table from float16 bit pattern to nearest code, built on first use.
    pub fn float16_table(&self) -> &[u8] {
        self.float16_lut.get_or_init(|| {
            debug!(format = %self, "building float16 to mxfp table");
            (0..=u16::MAX)
                .map(|bits| self.encode(f16_bits_to_f64(bits)))
                .collect()
        })
    }

    pub fn encode_float16_bits(&self, bits: u16) -> u8 {
        self.float16_table()[bits as usize]
    }
}

impl PartialEq for MxfpFormat {
    fn eq(&self, other: &Self) -> bool {
        self.exp_bits == other.exp_bits
            && self.mantissa_bits == other.mantissa_bits
            && self.bias == other.bias
            && self.overflow == other.overflow
    }
}

impl fmt::Display for MxfpFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MxfpFormat(exp_bits={}, mantissa_bits={}, bias={}, mxfp_overflow='{}')",
            self.exp_bits, self.mantissa_bits, self.bias, self.overflow
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_values() {
        assert_eq!((E4M3_SATURATE.pos_clamp_value, E4M3_SATURATE.neg_clamp_value), (126, 254));
        assert_eq!((E4M3_OVERFLOW.pos_clamp_value, E4M3_OVERFLOW.neg_clamp_value), (255, 255));
        assert_eq!((E5M2_SATURATE.pos_clamp_value, E5M2_SATURATE.neg_clamp_value), (123, 251));
        assert_eq!((E5M2_OVERFLOW.pos_clamp_value, E5M2_OVERFLOW.neg_clamp_value), (124, 252));
        assert_eq!((E2M1.pos_clamp_value, E2M1.neg_clamp_value), (0b0111, 0b1111));
        assert_eq!((E3M2.pos_clamp_value, E3M2.neg_clamp_value), (31, 63));
    }

    #[test]
    fn test_largest_values() {
        assert_eq!(E4M3_SATURATE.decode(0x7E), 448.0);
        assert_eq!(E5M2_SATURATE.decode(0x7B), 57344.0);
        assert_eq!(E2M1.decode(0b0111), 6.0);
        assert_eq!(E2M3.decode(0b011111), 7.5);
        assert_eq!(E3M2.decode(0b011111), 28.0);
    }

    #[test]
    fn test_overflow_policies() {
        assert_eq!(E4M3_SATURATE.encode(1000.0), 0x7E);
        assert_eq!(E4M3_SATURATE.encode(-1000.0), 0xFE);
        assert_eq!(E4M3_OVERFLOW.encode(1000.0), 0xFF);
        assert!(E4M3_OVERFLOW.decode(0xFF).is_nan());
        assert_eq!(E5M2_OVERFLOW.encode(f64::INFINITY), 0x7C);
        assert_eq!(E5M2_OVERFLOW.decode(0x7C), f64::INFINITY);
        assert_eq!(E5M2_SATURATE.encode(f64::NEG_INFINITY), 0xFB);
        assert_eq!(E2M1.encode(100.0), 0b0111);
    }

    #[test]
    fn test_nan_and_zero() {
        assert_eq!(E2M1.encode(f64::NAN), 0b1111);
        assert_eq!(E3M2.encode(f64::NAN), 0b111111);
        assert_eq!(E4M3_SATURATE.encode(0.0), 0);
        assert_eq!(E4M3_SATURATE.encode(-0.0), 0);
    }

    #[test]
    fn test_e2m1_values() {
        let expected = [0.0, 0.5, 1.0, 1.5, 2.0, 3.0, 4.0, 6.0];
        for (code, value) in expected.iter().enumerate() {
            assert_eq!(E2M1.decode(code as u8), *value);
            assert_eq!(E2M1.decode(code as u8 | 0b1000), -*value);
        }
        // 2.5 is a tie between 2.0 and 3.0: ties go to the even mantissa.
        assert_eq!(E2M1.encode(2.5), 0b0100);
        assert_eq!(E2M1.encode(0.25), 0b0000);
        assert_eq!(E2M1.encode(0.3), 0b0001);
    }

    #[test]
    fn test_table_sizes() {
        assert_eq!(E2M1.decode_table().len(), 16);
        assert_eq!(E3M2.decode_table().len(), 64);
        assert_eq!(E5M2_SATURATE.decode_table().len(), 256);
    }

    #[test]
    fn test_float16_table() {
        assert_eq!(E4M3_SATURATE.encode_float16_bits(0x3C00), 0x38);
        // float16 max (65504) saturates.
        assert_eq!(E4M3_SATURATE.encode_float16_bits(0x7BFF), 0x7E);
    }
}
