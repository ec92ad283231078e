//! Encode/decode pairs for the built-in dtype families.

use std::sync::Arc;

use crate::{
    bits::sign_extend,
    dtypes::{DecodeFn, DtypeTraits, EncodeFn, MetaDtype},
    errors::{Error, InterpretError, Result},
    float16::{f16_bits_to_f64, f64_to_f16_bits},
    fp8::{P3BINARY8, P4BINARY8},
    mxfp::{
        E2M1, E2M3, E3M2, E4M3_OVERFLOW, E4M3_SATURATE, E5M2_OVERFLOW, E5M2_SATURATE, MxfpOverflow,
    },
    options::Options,
    store::BitStore,
    value::Value,
};

/// `(family, alias)` pairs registered with the built-ins.
pub(crate) const BUILTIN_ALIASES: [(&str, &str); 2] = [("float", "floatbe"), ("bfloat", "bfloatbe")];

const UNSIGNED: DtypeTraits = DtypeTraits {
    is_integer: true,
    is_float: false,
    is_signed: false,
    is_unknown_length: false,
};
const SIGNED: DtypeTraits = DtypeTraits {
    is_signed: true,
    ..UNSIGNED
};
const FLOAT: DtypeTraits = DtypeTraits {
    is_integer: false,
    is_float: true,
    is_signed: true,
    is_unknown_length: false,
};
const PLAIN: DtypeTraits = DtypeTraits {
    is_integer: false,
    is_float: false,
    is_signed: false,
    is_unknown_length: false,
};
const UNSIGNED_CODE: DtypeTraits = DtypeTraits {
    is_unknown_length: true,
    ..UNSIGNED
};
const SIGNED_CODE: DtypeTraits = DtypeTraits {
    is_unknown_length: true,
    ..SIGNED
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteOrder {
    Big,
    Little,
}

const NATIVE: ByteOrder = if cfg!(target_endian = "little") {
    ByteOrder::Little
} else {
    ByteOrder::Big
};

/// Encodes a value into exactly `length` big-endian bits.
type Encoder = fn(&Value, usize, &str) -> Result<BitStore>;
/// Decodes a big-endian run of bits that is exactly the value.
type Decoder = fn(&BitStore, &str) -> Result<Value, InterpretError>;
type Codec = (EncodeFn, DecodeFn);

/// Every built-in family. `e4m3mxfp` and `e5m2mxfp` follow `options.mxfp_overflow`.
pub(crate) fn builtin_meta_dtypes(options: &Options) -> Result<Vec<MetaDtype>> {
    let mut families = Vec::new();
    let mut add = |name: &str, traits: DtypeTraits, length: Option<usize>, (encode, decode): Codec| {
        MetaDtype::new(name, traits, length, encode, decode).map(|meta| families.push(meta))
    };

    add("uint", UNSIGNED, None, codec("uint", None, encode_uint, decode_uint))?;
    add("int", SIGNED, None, codec("int", None, encode_int, decode_int))?;
    for (uint, int, float, bfloat, order) in [
        ("uintbe", "intbe", "float", "bfloat", ByteOrder::Big),
        ("uintle", "intle", "floatle", "bfloatle", ByteOrder::Little),
        ("uintne", "intne", "floatne", "bfloatne", NATIVE),
    ] {
        let order = Some(order);
        add(uint, UNSIGNED, None, codec(uint, order, encode_uint, decode_uint))?;
        add(int, SIGNED, None, codec(int, order, encode_int, decode_int))?;
        add(float, FLOAT, None, codec(float, order, encode_float, decode_float))?;
        add(bfloat, FLOAT, Some(16), codec(bfloat, order, encode_bfloat, decode_bfloat))?;
    }
    add("bool", PLAIN, Some(1), codec("bool", None, encode_bool, decode_bool))?;

    add("bin", PLAIN, None, text_codec("bin", 1))?;
    add("oct", PLAIN, None, text_codec("oct", 3))?;
    add("hex", PLAIN, None, text_codec("hex", 4))?;
    add("bytes", PLAIN, None, bytes_codec())?;

    add("ue", UNSIGNED_CODE, None, golomb_codec(encode_ue, decode_ue))?;
    add("se", SIGNED_CODE, None, golomb_codec(encode_se, decode_se))?;
    add("uie", UNSIGNED_CODE, None, golomb_codec(encode_uie, decode_uie))?;
    add("sie", SIGNED_CODE, None, golomb_codec(encode_sie, decode_sie))?;

    add(
        "p4binary",
        FLOAT,
        Some(8),
        minifloat_codec("p4binary", 8, |f| P4BINARY8.encode(f), |c| P4BINARY8.decode(c)),
    )?;
    add(
        "p3binary",
        FLOAT,
        Some(8),
        minifloat_codec("p3binary", 8, |f| P3BINARY8.encode(f), |c| P3BINARY8.decode(c)),
    )?;

    let (e4m3, e5m2) = match options.mxfp_overflow {
        MxfpOverflow::Saturate => (&E4M3_SATURATE, &E5M2_SATURATE),
        MxfpOverflow::Overflow => (&E4M3_OVERFLOW, &E5M2_OVERFLOW),
    };
    for (name, format) in [
        ("e4m3mxfp", e4m3),
        ("e5m2mxfp", e5m2),
        ("e3m2mxfp", &E3M2),
        ("e2m3mxfp", &E2M3),
        ("e2m1mxfp", &E2M1),
    ] {
        let width = format.bit_length();
        add(
            name,
            FLOAT,
            Some(width),
            minifloat_codec(name, width, move |f| format.encode(f), move |c| format.decode(c)),
        )?;
    }

    Ok(families)
}

/// Wraps a big-endian encoder/decoder pair. With a byte order the length must be a
/// whole number of bytes and bytes are reversed for little-endian.
fn codec(name: &str, order: Option<ByteOrder>, encode: Encoder, decode: Decoder) -> Codec {
    let owned = name.to_string();
    let encode_fn: EncodeFn = Arc::new(move |value, length| {
        let length = length
            .ok_or_else(|| Error::creation(format!("a length is needed to create {owned}")))?;
        if order.is_some() && length % 8 != 0 {
            return Err(Error::creation(format!(
                "{owned} needs a whole number of bytes, not {length} bits"
            )));
        }
        Ok(reorder(encode(value, length, &owned)?, order))
    });

    let owned = name.to_string();
    let decode_fn: DecodeFn = Arc::new(move |store, start, length| {
        let length = length.unwrap_or(store.len().saturating_sub(start));
        if order.is_some() && length % 8 != 0 {
            return Err(invalid_length(&owned, length, "must be a whole number of bytes"));
        }
        let bits = take(&owned, store, start, length)?;
        Ok((decode(&reorder(bits, order), &owned)?, start + length))
    });
    (encode_fn, decode_fn)
}

fn reorder(store: BitStore, order: Option<ByteOrder>) -> BitStore {
    match order {
        Some(ByteOrder::Little) => {
            let mut bytes = store.to_bytes();
            bytes.reverse();
            BitStore::from_bytes(&bytes)
        }
        _ => store,
    }
}

fn take(name: &str, store: &BitStore, start: usize, length: usize) -> Result<BitStore, InterpretError> {
    match start.checked_add(length) {
        Some(end) if end <= store.len() => Ok(store.slice(start, end)),
        _ => Err(not_enough(name, start)),
    }
}

fn not_enough(name: &str, pos: usize) -> InterpretError {
    InterpretError::NotEnoughBits {
        dtype: name.to_string(),
        pos,
    }
}

fn invalid_length(name: &str, length: usize, reason: &'static str) -> InterpretError {
    InterpretError::InvalidLength {
        dtype: name.to_string(),
        length,
        reason,
    }
}

/// The whole store as an unsigned integer. Callers keep it within 128 bits.
fn whole_uint(bits: &BitStore, name: &str) -> Result<u128, InterpretError> {
    bits.uint_at(0, bits.len()).map_err(|_| not_enough(name, 0))
}

fn check_int_length(length: usize) -> Result<(), &'static str> {
    if length == 0 || length > 128 {
        return Err("integers need between 1 and 128 bits");
    }
    Ok(())
}

fn encode_uint(value: &Value, length: usize, name: &str) -> Result<BitStore> {
    check_int_length(length).map_err(|reason| Error::creation(format!("{name}{length}: {reason}")))?;
    let v = value.to_u128()?;
    if length < 128 && v >> length != 0 {
        return Err(Error::creation(format!("{v} is too large for {name}{length}")));
    }
    Ok(BitStore::from_uint(v, length))
}

fn encode_int(value: &Value, length: usize, name: &str) -> Result<BitStore> {
    check_int_length(length).map_err(|reason| Error::creation(format!("{name}{length}: {reason}")))?;
    let v = value.to_i128()?;
    let (min, max) = if length == 128 {
        (i128::MIN, i128::MAX)
    } else {
        (-(1i128 << (length - 1)), (1i128 << (length - 1)) - 1)
    };
    if v < min || v > max {
        return Err(Error::creation(format!(
            "{v} is outside [{min}, {max}] for {name}{length}"
        )));
    }
    Ok(BitStore::from_uint(v as u128, length))
}

fn decode_uint(bits: &BitStore, name: &str) -> Result<Value, InterpretError> {
    check_int_length(bits.len()).map_err(|reason| invalid_length(name, bits.len(), reason))?;
    Ok(Value::UInt(whole_uint(bits, name)?))
}

fn decode_int(bits: &BitStore, name: &str) -> Result<Value, InterpretError> {
    check_int_length(bits.len()).map_err(|reason| invalid_length(name, bits.len(), reason))?;
    Ok(Value::Int(sign_extend(whole_uint(bits, name)?, bits.len())))
}

fn encode_float(value: &Value, length: usize, name: &str) -> Result<BitStore> {
    let f = value.to_f64()?;
    let bits = match length {
        16 => f64_to_f16_bits(f) as u128,
        32 => (f as f32).to_bits() as u128,
        64 => f.to_bits() as u128,
        _ => {
            return Err(Error::creation(format!(
                "{name} needs 16, 32 or 64 bits, not {length}"
            )));
        }
    };
    Ok(BitStore::from_uint(bits, length))
}

fn decode_float(bits: &BitStore, name: &str) -> Result<Value, InterpretError> {
    let f = match bits.len() {
        16 => f16_bits_to_f64(whole_uint(bits, name)? as u16),
        32 => f32::from_bits(whole_uint(bits, name)? as u32) as f64,
        64 => f64::from_bits(whole_uint(bits, name)? as u64),
        other => return Err(invalid_length(name, other, "floats must be 16, 32 or 64 bits")),
    };
    Ok(Value::Float(f))
}

/// bfloat16 keeps the top half of an `f32`; the low mantissa bits are truncated.
fn encode_bfloat(value: &Value, length: usize, name: &str) -> Result<BitStore> {
    if length != 16 {
        return Err(Error::creation(format!("{name} is always 16 bits")));
    }
    let f = value.to_f64()? as f32;
    Ok(BitStore::from_uint((f.to_bits() >> 16) as u128, 16))
}

fn decode_bfloat(bits: &BitStore, name: &str) -> Result<Value, InterpretError> {
    if bits.len() != 16 {
        return Err(invalid_length(name, bits.len(), "bfloats are 16 bits"));
    }
    let high = whole_uint(bits, name)? as u32;
    Ok(Value::Float(f32::from_bits(high << 16) as f64))
}

fn encode_bool(value: &Value, length: usize, name: &str) -> Result<BitStore> {
    if length != 1 {
        return Err(Error::creation(format!("{name} is always 1 bit")));
    }
    Ok(BitStore::from_bools([value.to_bool()?]))
}

fn decode_bool(bits: &BitStore, name: &str) -> Result<Value, InterpretError> {
    match bits.get(0) {
        Some(bit) if bits.len() == 1 => Ok(Value::Bool(bit)),
        _ => Err(invalid_length(name, bits.len(), "bools are 1 bit")),
    }
}

/// `bin`, `oct` and `hex`: digit strings of 1, 3 or 4 bits per digit.
fn text_codec(name: &'static str, bits_per_digit: usize) -> Codec {
    let encode: EncodeFn = Arc::new(move |value, _length| {
        let text = match value {
            Value::Bits(bits) => return Ok(bits.as_store().clone()),
            other => other.as_text()?,
        };
        match bits_per_digit {
            1 => BitStore::from_bin_str(text),
            3 => BitStore::from_oct_str(text),
            _ => BitStore::from_hex_str(text),
        }
    });
    let decode: DecodeFn = Arc::new(move |store, start, length| {
        let length = length.unwrap_or(store.len().saturating_sub(start));
        if length % bits_per_digit != 0 {
            return Err(invalid_length(name, length, "not a whole number of digits"));
        }
        let bits = take(name, store, start, length)?;
        let text = match bits_per_digit {
            1 => Ok(bits.to_bin()),
            3 => bits.to_oct(),
            _ => bits.to_hex(),
        }
        .map_err(|e| InterpretError::Invalid(e.to_string()))?;
        Ok((Value::Text(text), start + length))
    });
    (encode, decode)
}

fn bytes_codec() -> Codec {
    let encode: EncodeFn = Arc::new(|value, _length| match value {
        Value::Bytes(bytes) => Ok(BitStore::from_bytes(bytes)),
        other => Err(Error::creation(format!("{other:?} is not bytes"))),
    });
    let decode: DecodeFn = Arc::new(|store, start, length| {
        let length = length.unwrap_or(store.len().saturating_sub(start));
        if length % 8 != 0 {
            return Err(invalid_length("bytes", length, "must be a whole number of bytes"));
        }
        let bits = take("bytes", store, start, length)?;
        Ok((Value::Bytes(bits.to_bytes()), start + length))
    });
    (encode, decode)
}

fn minifloat_codec<E, D>(name: &'static str, width: usize, encode: E, decode: D) -> Codec
where
    E: Fn(f64) -> u8 + Send + Sync + 'static,
    D: Fn(u8) -> f64 + Send + Sync + 'static,
{
    let encode_fn: EncodeFn = Arc::new(move |value, length| {
        if length.is_some_and(|n| n != width) {
            return Err(Error::creation(format!("{name} is always {width} bits")));
        }
        Ok(BitStore::from_uint(encode(value.to_f64()?) as u128, width))
    });
    let decode_fn: DecodeFn = Arc::new(move |store, start, length| {
        if let Some(n) = length.filter(|n| *n != width) {
            return Err(invalid_length(name, n, "micro-floats have a fixed width"));
        }
        let bits = take(name, store, start, width)?;
        Ok((Value::Float(decode(whole_uint(&bits, name)? as u8)), start + width))
    });
    (encode_fn, decode_fn)
}

type GolombDecoder = fn(&BitStore, usize) -> Result<(Value, usize), InterpretError>;

/// Exp-Golomb codes carry their own length, so any supplied length is ignored.
fn golomb_codec(encode: fn(&Value) -> Result<BitStore>, decode: GolombDecoder) -> Codec {
    let encode_fn: EncodeFn = Arc::new(move |value, _length| encode(value));
    let decode_fn: DecodeFn = Arc::new(move |store, start, _length| decode(store, start));
    (encode_fn, decode_fn)
}

fn ue_bits(v: u128) -> Result<BitStore> {
    let code = v
        .checked_add(1)
        .ok_or_else(|| Error::creation(format!("{v} is too large for ue")))?;
    let significant = 128 - code.leading_zeros() as usize;
    let mut store = BitStore::zeros(significant - 1);
    store.extend_from(&BitStore::from_uint(code, significant));
    Ok(store)
}

fn read_ue(store: &BitStore, start: usize, name: &str) -> Result<(u128, usize), InterpretError> {
    let mut pos = start;
    while !store.get(pos).ok_or_else(|| InterpretError::Unterminated(name.to_string()))? {
        pos += 1;
    }
    let zeros = pos - start;
    if zeros > 127 {
        return Err(InterpretError::Invalid(format!("{name} code is too long to read")));
    }
    pos += 1;
    let tail = if zeros == 0 {
        0
    } else {
        store
            .uint_at(pos, zeros)
            .map_err(|_| InterpretError::Unterminated(name.to_string()))?
    };
    Ok(((1u128 << zeros) - 1 + tail, pos + zeros))
}

fn encode_ue(value: &Value) -> Result<BitStore> {
    ue_bits(value.to_u128()?)
}

fn decode_ue(store: &BitStore, start: usize) -> Result<(Value, usize), InterpretError> {
    let (v, end) = read_ue(store, start, "ue")?;
    Ok((Value::UInt(v), end))
}

fn encode_se(value: &Value) -> Result<BitStore> {
    let k = value.to_i128()?;
    let doubled = k
        .unsigned_abs()
        .checked_mul(2)
        .ok_or_else(|| Error::creation(format!("{k} is too large for se")))?;
    ue_bits(if k > 0 { doubled - 1 } else { doubled })
}

fn decode_se(store: &BitStore, start: usize) -> Result<(Value, usize), InterpretError> {
    let (code, end) = read_ue(store, start, "se")?;
    let m = (code / 2 + code % 2) as i128;
    Ok((Value::Int(if code % 2 == 0 { -m } else { m }), end))
}

fn uie_bits(v: u128) -> Result<BitStore> {
    let code = v
        .checked_add(1)
        .ok_or_else(|| Error::creation(format!("{v} is too large for uie")))?;
    let significant = 128 - code.leading_zeros() as usize;
    let mut store = BitStore::new();
    for i in (0..significant - 1).rev() {
        store.push(false);
        store.push((code >> i) & 1 == 1);
    }
    store.push(true);
    Ok(store)
}

fn read_uie(store: &BitStore, start: usize, name: &str) -> Result<(u128, usize), InterpretError> {
    let unterminated = || InterpretError::Unterminated(name.to_string());
    let mut pos = start;
    let mut code: u128 = 1;
    while !store.get(pos).ok_or_else(unterminated)? {
        let bit = store.get(pos + 1).ok_or_else(unterminated)?;
        if code >> 127 != 0 {
            return Err(InterpretError::Invalid(format!("{name} code is too long to read")));
        }
        code = (code << 1) | bit as u128;
        pos += 2;
    }
    Ok((code - 1, pos + 1))
}

fn encode_uie(value: &Value) -> Result<BitStore> {
    uie_bits(value.to_u128()?)
}

fn decode_uie(store: &BitStore, start: usize) -> Result<(Value, usize), InterpretError> {
    let (v, end) = read_uie(store, start, "uie")?;
    Ok((Value::UInt(v), end))
}

/// `uie` of the magnitude, then a sign bit (1 for negative) unless zero.
fn encode_sie(value: &Value) -> Result<BitStore> {
    let k = value.to_i128()?;
    let mut store = uie_bits(k.unsigned_abs())?;
    if k != 0 {
        store.push(k < 0);
    }
    Ok(store)
}

fn decode_sie(store: &BitStore, start: usize) -> Result<(Value, usize), InterpretError> {
    let (magnitude, end) = read_uie(store, start, "sie")?;
    if magnitude == 0 {
        return Ok((Value::Int(0), end));
    }
    let negative = store
        .get(end)
        .ok_or_else(|| InterpretError::Unterminated("sie".to_string()))?;
    let magnitude = i128::try_from(magnitude)
        .map_err(|_| InterpretError::Invalid("sie value is too large".to_string()))?;
    Ok((Value::Int(if negative { -magnitude } else { magnitude }), end + 1))
}
