//! Dynamic values produced by decoding bits and consumed when encoding them.

use crate::{
    bitstring::Bits,
    errors::{Error, Result},
};

/// A value read from, or to be written into, a run of bits.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    UInt(u128),
    Int(i128),
    Float(f64),
    /// Text renderings: `bin`, `hex` and `oct` digits.
    Text(String),
    Bytes(Vec<u8>),
    Bits(Bits),
}

impl Value {
    /// The value as an unsigned integer, if it is a non-negative whole number.
    pub fn to_u128(&self) -> Result<u128> {
        match self {
            Value::UInt(v) => Ok(*v),
            Value::Int(v) => u128::try_from(*v)
                .map_err(|_| Error::creation(format!("{v} is negative and can't be unsigned"))),
            Value::Bool(b) => Ok(*b as u128),
            Value::Text(s) => parse_int(s)?.to_u128(),
            other => Err(Error::creation(format!("{other:?} is not an integer"))),
        }
    }

    /// The value as a signed integer.
    pub fn to_i128(&self) -> Result<i128> {
        match self {
            Value::Int(v) => Ok(*v),
            Value::UInt(v) => {
                i128::try_from(*v).map_err(|_| Error::creation(format!("{v} is too large for int")))
            }
            Value::Bool(b) => Ok(*b as i128),
            Value::Text(s) => parse_int(s)?.to_i128(),
            other => Err(Error::creation(format!("{other:?} is not an integer"))),
        }
    }

    /// The value as a float. Integers convert (possibly rounding).
    pub fn to_f64(&self) -> Result<f64> {
        match self {
            Value::Float(v) => Ok(*v),
            Value::Int(v) => Ok(*v as f64),
            Value::UInt(v) => Ok(*v as f64),
            Value::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| Error::creation(format!("can't parse '{s}' as a float"))),
            other => Err(Error::creation(format!("{other:?} is not a number"))),
        }
    }

    pub fn to_bool(&self) -> Result<bool> {
        match self {
            Value::Bool(b) => Ok(*b),
            Value::UInt(0) | Value::Int(0) => Ok(false),
            Value::UInt(1) | Value::Int(1) => Ok(true),
            Value::Text(s) => match s.trim() {
                "1" | "True" | "true" => Ok(true),
                "0" | "False" | "false" => Ok(false),
                _ => Err(Error::creation(format!("can't parse '{s}' as a bool"))),
            },
            other => Err(Error::creation(format!("{other:?} is not a bool"))),
        }
    }

    pub fn as_text(&self) -> Result<&str> {
        match self {
            Value::Text(s) => Ok(s),
            other => Err(Error::creation(format!("{other:?} is not a string"))),
        }
    }
}

/// Parses a decimal integer with an optional sign, or a `0x`/`0o`/`0b` literal.
fn parse_int(s: &str) -> Result<Value> {
    let trimmed = s.trim();
    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let lower = digits.to_ascii_lowercase();
    let (radix, digits) = match lower.get(..2) {
        Some("0x") => (16, &lower[2..]),
        Some("0o") => (8, &lower[2..]),
        Some("0b") => (2, &lower[2..]),
        _ => (10, lower.as_str()),
    };
    let magnitude = u128::from_str_radix(digits, radix)
        .map_err(|_| Error::creation(format!("can't parse '{s}' as an integer")))?;
    if !negative {
        return Ok(Value::UInt(magnitude));
    }
    0i128
        .checked_sub_unsigned(magnitude)
        .map(Value::Int)
        .ok_or_else(|| Error::creation(format!("{s} is too small for int")))
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

macro_rules! impl_from_unsigned {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(value: $t) -> Self {
                Value::UInt(value as u128)
            }
        })*
    };
}

macro_rules! impl_from_signed {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(value: $t) -> Self {
                Value::Int(value as i128)
            }
        })*
    };
}

impl_from_unsigned!(u8, u16, u32, u64, u128, usize);
impl_from_signed!(i8, i16, i32, i64, i128, isize);

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::Float(value as f64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Bytes(value)
    }
}

impl From<Bits> for Value {
    fn from(value: Bits) -> Self {
        Value::Bits(value)
    }
}
