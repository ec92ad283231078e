//! Rounding and table-building core shared by the narrow float formats.
//!
//! A layout is `1 + exp_bits + mantissa_bits` wide with an exponent `bias`. Encoding
//! rounds half-to-even, produces subnormals when the biased exponent falls below 1 and
//! carries mantissa overflow into the exponent.

/// Which codes of a layout are reserved for non-finite values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Specials {
    /// All-ones exponent: infinity with a zero mantissa, NaN otherwise.
    Ieee,
    /// Only the all-ones magnitude is reserved, as NaN.
    NanOnly,
    /// Every code is a finite number.
    None,
}

/// Bit layout of a narrow float.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub exp_bits: u32,
    pub mantissa_bits: u32,
    pub bias: i32,
    pub specials: Specials,
}

impl Layout {
    pub const fn total_bits(&self) -> u32 {
        1 + self.exp_bits + self.mantissa_bits
    }

    pub const fn sign_bit(&self) -> u32 {
        1 << (self.exp_bits + self.mantissa_bits)
    }

    const fn max_exponent_field(&self) -> u32 {
        (1 << self.exp_bits) - 1
    }

    /// Largest magnitude code that decodes to a finite number.
    pub const fn max_finite_code(&self) -> u32 {
        let all_ones = self.sign_bit() - 1;
        match self.specials {
            Specials::Ieee => ((self.max_exponent_field() - 1) << self.mantissa_bits)
                | ((1 << self.mantissa_bits) - 1),
            Specials::NanOnly => all_ones - 1,
            Specials::None => all_ones,
        }
    }

    /// Rounds a finite, strictly positive magnitude to its magnitude code.
    ///
    /// Returns `None` when the rounded value exceeds the largest finite code.
    pub fn quantize(&self, magnitude: f64) -> Option<u32> {
        debug_assert!(magnitude.is_finite() && magnitude > 0.0);
        let scale = (1u64 << self.mantissa_bits) as f64;
        let (exponent, significand) = decompose(magnitude);
        let mut biased = exponent as i64 + self.bias as i64;

        let mut mantissa = if biased < 1 {
            biased = 0;
            (magnitude * pow2(self.bias - 1) * scale).round_ties_even()
        } else {
            ((significand - 1.0) * scale).round_ties_even()
        };
        if mantissa >= scale {
            mantissa = 0.0;
            biased += 1;
        }

        if biased > self.max_exponent_field() as i64 {
            return None;
        }
        let code = ((biased as u32) << self.mantissa_bits) | mantissa as u32;
        (code <= self.max_finite_code()).then_some(code)
    }

    /// Value of a full code (sign included).
    pub fn value_of(&self, code: u32) -> f64 {
        let sign = if code & self.sign_bit() != 0 { -1.0 } else { 1.0 };
        let magnitude = code & (self.sign_bit() - 1);
        let exponent = (magnitude >> self.mantissa_bits) as i32;
        let mantissa = (magnitude & ((1 << self.mantissa_bits) - 1)) as f64;
        let scale = (1u64 << self.mantissa_bits) as f64;

        match self.specials {
            Specials::Ieee if exponent as u32 == self.max_exponent_field() => {
                return if mantissa == 0.0 {
                    sign * f64::INFINITY
                } else {
                    f64::NAN
                };
            }
            Specials::NanOnly if magnitude == self.sign_bit() - 1 => return f64::NAN,
            _ => {}
        }

        if exponent == 0 {
            sign * (mantissa / scale) * pow2(1 - self.bias)
        } else {
            sign * (1.0 + mantissa / scale) * pow2(exponent - self.bias)
        }
    }

    /// Encodes `f` to a full code. NaN maps to `nan_code`; infinities and magnitudes
    /// beyond the largest finite value map to the clamp code for their sign.
    pub fn encode(&self, f: f64, nan_code: u32, pos_clamp: u32, neg_clamp: u32) -> u32 {
        if f.is_nan() {
            return nan_code;
        }
        if f == 0.0 {
            return 0;
        }
        let negative = f < 0.0;
        let clamp = if negative { neg_clamp } else { pos_clamp };
        if f.is_infinite() {
            return clamp;
        }
        match self.quantize(f.abs()) {
            Some(code) if negative => self.sign_bit() | code,
            Some(code) => code,
            None => clamp,
        }
    }

    /// Decode table indexed by every code of the layout.
    pub fn decode_table(&self) -> Vec<f32> {
        (0..1u32 << self.total_bits())
            .map(|code| self.value_of(code) as f32)
            .collect()
    }
}

/// Splits a finite positive `x` into `(e, m)` with `x == m * 2^e` and `1 <= m < 2`.
pub fn decompose(x: f64) -> (i32, f64) {
    const EXP_MASK: u64 = 0x7FF << 52;
    const MANTISSA_MASK: u64 = (1 << 52) - 1;

    let bits = x.to_bits();
    let exp_field = ((bits & EXP_MASK) >> 52) as i32;
    if exp_field == 0 {
        // f64 subnormal: renormalise first.
        let (e, m) = decompose(x * pow2(64));
        return (e - 64, m);
    }
    let significand = f64::from_bits((bits & MANTISSA_MASK) | (1023u64 << 52));
    (exp_field - 1023, significand)
}

/// `2^e` as an f64, exact for the exponents used here.
pub fn pow2(e: i32) -> f64 {
    2f64.powi(e)
}
