//! 8-bit floating point formats from the IEEE P3109 binary8 draft.
//!
//! See <https://arxiv.org/abs/2206.02915>. The all-ones exponent is reserved for
//! infinities and NaN. NaN encodes as `0xFF`; infinities and overflowing magnitudes
//! encode as the clamp codes `0x7F` / `0xFF`.
//!
//! The decode and float16 lookup tables are computed lazily, once per format, and kept
//! in a `OnceLock`. No precomputed tables ship with the crate.

use std::{fmt, sync::OnceLock};

use tracing::debug;

use crate::{
    float16::f16_bits_to_f64,
    minifloat::{Layout, Specials},
};

/// An 8-bit float format: 1 sign bit, `exp_bits` exponent bits, the rest mantissa.
#[derive(Debug)]
pub struct Binary8Format {
    pub exp_bits: u32,
    pub bias: i32,
    pub pos_clamp_value: u8,
    pub neg_clamp_value: u8,
    decode_lut: OnceLock<Vec<f32>>,
    float16_lut: OnceLock<Vec<u8>>,
}

/// `p4binary8`: 4 exponent bits, bias 8.
pub static P4BINARY8: Binary8Format = Binary8Format::new(4, 8);
/// `p3binary8`: 5 exponent bits, bias 16.
pub static P3BINARY8: Binary8Format = Binary8Format::new(5, 16);

impl Binary8Format {
    pub const fn new(exp_bits: u32, bias: i32) -> Self {
        Self {
            exp_bits,
            bias,
            pos_clamp_value: 0x7F,
            neg_clamp_value: 0xFF,
            decode_lut: OnceLock::new(),
            float16_lut: OnceLock::new(),
        }
    }

    pub const fn layout(&self) -> Layout {
        Layout {
            exp_bits: self.exp_bits,
            mantissa_bits: 7 - self.exp_bits,
            bias: self.bias,
            specials: Specials::Ieee,
        }
    }

    /// Best 8-bit code for `f`.
    pub fn encode(&self, f: f64) -> u8 {
        self.layout().encode(
            f,
            0xFF,
            self.pos_clamp_value as u32,
            self.neg_clamp_value as u32,
        ) as u8
    }

    pub fn decode(&self, code: u8) -> f64 {
        self.decode_table()[code as usize] as f64
    }

    /// 256-entry table from code to value, built on first use.
    pub fn decode_table(&self) -> &[f32] {
        self.decode_lut.get_or_init(|| {
            debug!(format = %self, "building binary8 decode table");
            self.layout().decode_table()
        })
    }

    /// 65536-entry table from float16 bit pattern to nearest code, built on first use.
    pub fn float16_table(&self) -> &[u8] {
        self.float16_lut.get_or_init(|| {
            debug!(format = %self, "building float16 to binary8 table");
            (0..=u16::MAX)
                .map(|bits| self.encode(f16_bits_to_f64(bits)))
                .collect()
        })
    }

    /// Encodes a float16 given by its bit pattern, through [`Self::float16_table`].
    pub fn encode_float16_bits(&self, bits: u16) -> u8 {
        self.float16_table()[bits as usize]
    }
}

impl PartialEq for Binary8Format {
    fn eq(&self, other: &Self) -> bool {
        self.exp_bits == other.exp_bits && self.bias == other.bias
    }
}

impl fmt::Display for Binary8Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Binary8Format(exp_bits={}, bias={})",
            self.exp_bits, self.bias
        )
    }
}
