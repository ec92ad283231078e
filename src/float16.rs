//! IEEE 754 half precision conversions.

use crate::minifloat::{Layout, Specials};

const HALF: Layout = Layout {
    exp_bits: 5,
    mantissa_bits: 10,
    bias: 15,
    specials: Specials::Ieee,
};

const INFINITY: u16 = 0x7C00;
const QUIET_NAN: u16 = 0x7E00;

/// Converts half precision bits to the `f64` they denote exactly.
pub fn f16_bits_to_f64(bits: u16) -> f64 {
    HALF.value_of(bits as u32)
}

/// Rounds `f` to the nearest half precision value. Out-of-range magnitudes become
/// infinity; the sign of zero is kept.
pub fn f64_to_f16_bits(f: f64) -> u16 {
    if f.is_nan() {
        return QUIET_NAN;
    }
    let sign = if f.is_sign_negative() { 0x8000 } else { 0 };
    if f == 0.0 {
        return sign;
    }
    match f.is_finite().then(|| HALF.quantize(f.abs())).flatten() {
        Some(code) => sign | code as u16,
        None => sign | INFINITY,
    }
}
