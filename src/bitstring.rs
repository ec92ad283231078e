//! The immutable bit container and the format-driven construction and unpacking paths.

use std::{collections::HashMap, fmt, ops::Add, ops::Deref, str::FromStr, sync::Arc};

use crate::{
    dtypes::{LengthKind, Register, split_key},
    errors::{Error, InterpretError, Result},
    format::{Token, TokenLength, tokenparser},
    store::BitStore,
    value::Value,
};

/// Keyword arguments for [`Bits::pack_in`] and [`BitStore::unpack_in`]: named values and
/// named lengths (`uint:n`).
pub type Kwargs = HashMap<String, Value>;

/// An immutable sequence of bits.
///
/// Clones share the same buffer. Nothing can change it; convert into a
/// [`crate::BitArray`] to edit a copy.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Bits {
    store: Arc<BitStore>,
}

impl Bits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn zeros(len: usize) -> Self {
        BitStore::zeros(len).into()
    }

    pub fn ones(len: usize) -> Self {
        BitStore::ones(len).into()
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        BitStore::from_bytes(bytes).into()
    }

    /// `length` bits (default: the rest) of `bytes`, skipping the first `offset` bits.
    pub fn from_bytes_with_offset(bytes: &[u8], offset: usize, length: Option<usize>) -> Result<Self> {
        Ok(BitStore::from_bytes_with_offset(bytes, offset, length)?.into())
    }

    pub fn from_bools<I: IntoIterator<Item = bool>>(bits: I) -> Self {
        BitStore::from_bools(bits).into()
    }

    /// Builds bits from a format whose tokens all carry their values, e.g.
    /// `"0xff, uint4=3, 0b1"`.
    pub fn from_format(fmt: &str) -> Result<Self> {
        Self::pack(fmt, &[])
    }

    /// Encodes a single value, e.g. `Bits::from_dtype("int12", -5)`.
    pub fn from_dtype(key: &str, value: impl Into<Value>) -> Result<Self> {
        Ok(encode_key(Register::global(), key, &value.into(), None)?.into())
    }

    /// Packs `values` into the layout described by `fmt` using the process-wide registry.
    pub fn pack(fmt: &str, values: &[Value]) -> Result<Self> {
        Self::pack_in(Register::global(), fmt, values, &Kwargs::new())
    }

    /// Packs `values` into the layout described by `fmt`.
    ///
    /// Tokens without an `=value` take the next positional value. A token value that
    /// names a keyword argument takes that argument, and `name:key` lengths are looked
    /// up in `kwargs`. `pad` tokens become zero bits.
    pub fn pack_in(register: &Register, fmt: &str, values: &[Value], kwargs: &Kwargs) -> Result<Self> {
        let keys = sorted_keys(kwargs);
        let parsed = tokenparser(fmt, &keys)?;
        let mut positional = values.iter();
        let mut store = BitStore::new();
        for token in &parsed.tokens {
            store.extend_from(&encode_token(register, token, &mut positional, kwargs)?);
        }
        if positional.next().is_some() {
            return Err(Error::InvalidArgument(format!(
                "too many values for format '{fmt}'"
            )));
        }
        Ok(store.into())
    }

    pub fn as_store(&self) -> &BitStore {
        &self.store
    }

    /// Copies out `[start, end)`.
    pub fn slice(&self, start: Option<isize>, end: Option<isize>) -> Result<Self> {
        let (start, end) = self.store.resolve_range(start, end)?;
        Ok(self.store.slice(start, end).into())
    }

    /// The bits in reverse order.
    pub fn reversed(&self) -> Self {
        let mut store = (*self.store).clone();
        store.reverse_range(0, store.len());
        store.into()
    }

    pub(crate) fn into_store(self) -> BitStore {
        Arc::unwrap_or_clone(self.store)
    }
}

impl Deref for Bits {
    type Target = BitStore;

    fn deref(&self) -> &BitStore {
        &self.store
    }
}

impl AsRef<BitStore> for Bits {
    fn as_ref(&self) -> &BitStore {
        &self.store
    }
}

impl From<BitStore> for Bits {
    fn from(store: BitStore) -> Self {
        Self {
            store: Arc::new(store),
        }
    }
}

impl FromStr for Bits {
    type Err = Error;

    /// Parses `"0x..."`, `"0b..."`, `"0o..."` or any fully valued format string.
    fn from_str(s: &str) -> Result<Self> {
        Self::from_format(s)
    }
}

impl Add<&Bits> for &Bits {
    type Output = Bits;

    fn add(self, rhs: &Bits) -> Bits {
        let mut store = (*self.store).clone();
        store.extend_from(&rhs.store);
        store.into()
    }
}

impl fmt::Display for Bits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.store, f)
    }
}

impl fmt::Debug for Bits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bits('{}')", self.store)
    }
}

fn sorted_keys(kwargs: &Kwargs) -> Vec<&str> {
    let mut keys: Vec<&str> = kwargs.keys().map(String::as_str).collect();
    keys.sort_unstable();
    keys
}

/// Encodes `value` for a key like `"uint12"` or `"hex"`. A variable-length family
/// named without a length is encoded with `default_length`.
pub(crate) fn encode_key(
    register: &Register,
    key: &str,
    value: &Value,
    default_length: Option<usize>,
) -> Result<BitStore> {
    let (name, length) = split_key(key);
    if length.is_none() {
        let meta = register.meta_dtype(name)?;
        if meta.length_kind() == LengthKind::Variable {
            return meta.encode(value, default_length);
        }
    }
    register.dtype_from_key(key)?.set(value)
}

fn resolve_length(token: &Token, kwargs: &Kwargs) -> Result<Option<usize>> {
    match &token.length {
        None => Ok(None),
        Some(TokenLength::Bits(n)) => Ok(Some(*n)),
        Some(TokenLength::Keyword(k)) => {
            let value = kwargs.get(k).ok_or_else(|| {
                Error::InvalidArgument(format!("no keyword argument '{k}' for the length of '{token}'"))
            })?;
            usize::try_from(value.to_u128()?)
                .map(Some)
                .map_err(|_| Error::InvalidArgument(format!("length '{k}' is too large")))
        }
    }
}

fn literal_bits(token: &Token) -> Result<BitStore> {
    let digits = token.value.as_deref().unwrap_or_default();
    match token.name.as_str() {
        "0x" => BitStore::from_hex_str(digits),
        "0o" => BitStore::from_oct_str(digits),
        _ => BitStore::from_bin_str(digits),
    }
}

/// Bits for a `bits` token or a keyword-argument token.
fn value_bits(value: &Value) -> Result<BitStore> {
    match value {
        Value::Bits(bits) => Ok(bits.as_store().clone()),
        Value::Text(text) => Ok(Bits::from_format(text)?.into_store()),
        Value::Bytes(bytes) => Ok(BitStore::from_bytes(bytes)),
        Value::Bool(bit) => Ok(BitStore::from_bools([*bit])),
        other => Err(Error::creation(format!("can't make bits from {other:?}"))),
    }
}

fn encode_token<'a>(
    register: &Register,
    token: &Token,
    positional: &mut impl Iterator<Item = &'a Value>,
    kwargs: &Kwargs,
) -> Result<BitStore> {
    if token.length.is_none() && token.value.is_none() {
        if let Some(value) = kwargs.get(&token.name) {
            return value_bits(value);
        }
    }
    if token.is_literal() {
        return literal_bits(token);
    }
    let length = resolve_length(token, kwargs)?;
    if token.name == "pad" {
        return length
            .map(BitStore::zeros)
            .ok_or_else(|| Error::InvalidArgument("pad tokens need a length".to_string()));
    }

    let value = match &token.value {
        Some(text) => kwargs
            .get(text)
            .cloned()
            .unwrap_or_else(|| Value::Text(text.clone())),
        None => positional.next().cloned().ok_or_else(|| {
            Error::InvalidArgument(format!("no value given for '{token}'"))
        })?,
    };

    if token.name == "bits" {
        let bits = value_bits(&value)?;
        return match length {
            Some(n) if n != bits.len() => Err(Error::creation(format!(
                "'{token}' needs {n} bits but the value has {}",
                bits.len()
            ))),
            _ => Ok(bits),
        };
    }

    let meta = register.meta_dtype(&token.name)?;
    match (length, meta.length_kind()) {
        (None, LengthKind::Variable) => meta.encode(&value, None),
        _ => register.get_dtype(&token.name, length)?.set(&value),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Pad,
    Bits,
    Dtype,
    SelfDelimiting,
}

impl BitStore {
    /// Decodes the whole store as `key` (`"uint"`, `"float32"`, `"se"`...) using the
    /// process-wide registry.
    pub fn interpret(&self, key: &str) -> Result<Value> {
        self.interpret_in(Register::global(), key)
    }

    /// Decodes the whole store as `key`. A variable-length family named without a
    /// length takes the store's length; any other length must match it exactly.
    pub fn interpret_in(&self, register: &Register, key: &str) -> Result<Value> {
        let (name, length) = split_key(key);
        let dtype = match length {
            None if register.meta_dtype(name)?.length_kind() == LengthKind::Variable => {
                register.get_dtype(name, Some(self.len()))?
            }
            _ => register.dtype_from_key(key)?,
        };
        let (value, end) = dtype.read(self, 0)?;
        if end != self.len() {
            return Err(InterpretError::InvalidLength {
                dtype: dtype.to_string(),
                length: self.len(),
                reason: "the bitstring is longer than the value",
            }
            .into());
        }
        Ok(value)
    }

    /// Decodes one `key` value at `pos`, returning it and the position after it.
    pub fn read_as(&self, key: &str, pos: usize) -> Result<(Value, usize)> {
        Ok(Register::global().dtype_from_key(key)?.read(self, pos)?)
    }

    /// Unpacks values from the start of the store using the process-wide registry.
    pub fn unpack(&self, fmt: &str) -> Result<Vec<Value>> {
        self.unpack_in(Register::global(), fmt, &Kwargs::new())
    }

    /// Reads each token of `fmt` in turn from the start of the store.
    ///
    /// `pad` tokens are skipped and produce no value; `bits` and literal tokens yield
    /// [`Value::Bits`]. One token may leave its length unspecified: it receives the bits
    /// not claimed by the others, which is only possible when every other length is
    /// known up front.
    pub fn unpack_in(&self, register: &Register, fmt: &str, kwargs: &Kwargs) -> Result<Vec<Value>> {
        let keys = sorted_keys(kwargs);
        let parsed = tokenparser(fmt, &keys)?;

        let mut fields = Vec::with_capacity(parsed.tokens.len());
        for token in &parsed.tokens {
            fields.push(plan_field(register, token, kwargs)?);
        }

        let unknown: Vec<usize> = (0..fields.len())
            .filter(|&i| fields[i].1.is_none() && fields[i].0 != FieldKind::SelfDelimiting)
            .collect();
        if let [index] = unknown.as_slice() {
            let index = *index;
            if fields.iter().any(|f| f.0 == FieldKind::SelfDelimiting) {
                return Err(Error::InvalidArgument(format!(
                    "can't infer the length of '{}' next to self-delimiting codes",
                    parsed.tokens[index]
                )));
            }
            let known: usize = fields.iter().filter_map(|f| f.1).sum();
            let remaining = self.len().checked_sub(known).ok_or_else(|| {
                InterpretError::NotEnoughBits {
                    dtype: parsed.tokens[index].to_string(),
                    pos: self.len(),
                }
            })?;
            fields[index].1 = Some(remaining);
        } else if unknown.len() > 1 {
            return Err(Error::InvalidArgument(format!(
                "only one token of unknown length is allowed in '{fmt}'"
            )));
        }

        let mut values = Vec::new();
        let mut pos = 0;
        for (token, (kind, length)) in parsed.tokens.iter().zip(fields) {
            match kind {
                FieldKind::Pad | FieldKind::Bits => {
                    let n = length.unwrap_or_default();
                    let end = pos + n;
                    if end > self.len() {
                        return Err(InterpretError::NotEnoughBits {
                            dtype: token.to_string(),
                            pos,
                        }
                        .into());
                    }
                    if kind == FieldKind::Bits {
                        values.push(Value::Bits(self.slice(pos, end).into()));
                    }
                    pos = end;
                }
                FieldKind::Dtype | FieldKind::SelfDelimiting => {
                    let dtype = register.get_dtype(&token.name, length)?;
                    let (value, end) = dtype.read(self, pos)?;
                    values.push(value);
                    pos = end;
                }
            }
        }
        Ok(values)
    }
}

/// Kind and (if known) length of the field a token reads.
fn plan_field(register: &Register, token: &Token, kwargs: &Kwargs) -> Result<(FieldKind, Option<usize>)> {
    if token.is_literal() {
        return Ok((FieldKind::Bits, Some(literal_bits(token)?.len())));
    }
    let length = resolve_length(token, kwargs)?;
    match token.name.as_str() {
        "pad" => Ok((FieldKind::Pad, length)),
        "bits" => Ok((FieldKind::Bits, length)),
        name => match register.meta_dtype(name)?.length_kind() {
            LengthKind::Fixed(n) => Ok((FieldKind::Dtype, Some(length.unwrap_or(n)))),
            LengthKind::SelfDelimiting => Ok((FieldKind::SelfDelimiting, None)),
            LengthKind::Variable => Ok((FieldKind::Dtype, length)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str_literals() {
        let bits: Bits = "0x001122".parse().unwrap();
        assert_eq!(bits.len(), 24);
        assert_eq!(bits.to_hex().unwrap(), "001122");
        let bits: Bits = "0b101, 0o7".parse().unwrap();
        assert_eq!(bits.to_bin(), "101111");
        assert!("0xfz".parse::<Bits>().is_err());
    }

    #[test]
    fn test_from_format_with_values() {
        let err = Bits::from_format("uint4=3, bits:4=0b101, int4=-1").unwrap_err();
        assert_eq!(err.kind(), crate::errors::ErrorKind::Creation);
        let bits = Bits::from_format("uint4=3, bits3=0b101, int4=-1").unwrap();
        assert_eq!(bits.to_bin(), "00111011111");
    }

    #[test]
    fn test_pack_positional() {
        let bits = Bits::pack(
            "uint8, hex, float16, bool",
            &[Value::from(7u8), Value::from("a5"), Value::from(1.0f64), Value::from(true)],
        )
        .unwrap();
        assert_eq!(bits.len(), 8 + 8 + 16 + 1);
        assert_eq!(bits.slice(Some(0), Some(16)).unwrap().to_hex().unwrap(), "07a5");
        assert!(Bits::pack("uint8", &[]).is_err());
        assert!(Bits::pack("uint8", &[Value::from(1u8), Value::from(2u8)]).is_err());
    }

    #[test]
    fn test_pack_keywords_and_pad() {
        let mut kwargs = Kwargs::new();
        kwargs.insert("n".into(), Value::from(6u8));
        kwargs.insert("v".into(), Value::from(5u8));
        kwargs.insert("hdr".into(), Value::from("0xf"));
        let register = Register::global();
        let bits = Bits::pack_in(register, "hdr, uint:n=v, pad2", &[], &kwargs).unwrap();
        assert_eq!(bits.to_bin(), "111100010100");
    }

    #[test]
    fn test_from_dtype() {
        assert_eq!(Bits::from_dtype("int12", -5).unwrap().len(), 12);
        assert_eq!(Bits::from_dtype("hex", "ab").unwrap().to_hex().unwrap(), "ab");
        assert_eq!(Bits::from_dtype("ue", 3u8).unwrap().to_bin(), "00100");
        assert!(Bits::from_dtype("uint", 3u8).is_err());
        assert!(Bits::from_dtype("nope8", 3u8).is_err());
    }

    #[test]
    fn test_interpret() {
        let bits: Bits = "0xff".parse().unwrap();
        assert_eq!(bits.interpret("uint").unwrap(), Value::UInt(255));
        assert_eq!(bits.interpret("int8").unwrap(), Value::Int(-1));
        assert_eq!(bits.interpret("hex").unwrap(), Value::Text("ff".into()));
        assert!(bits.interpret("uint4").is_err());
        let code = Bits::from_dtype("se", -2).unwrap();
        assert_eq!(code.interpret("se").unwrap(), Value::Int(-2));
    }

    #[test]
    fn test_unpack() {
        let bits = Bits::pack(
            "uint4, se, hex8, pad3, bool",
            &[Value::from(9u8), Value::from(-3i8), Value::from("c3"), Value::from(true)],
        )
        .unwrap();
        let values = bits.unpack("uint4, se, hex8, pad3, bool").unwrap();
        assert_eq!(
            values,
            vec![Value::UInt(9), Value::Int(-3), Value::Text("c3".into()), Value::Bool(true)]
        );
    }

    #[test]
    fn test_unpack_stretchy() {
        let bits: Bits = "0xabcd".parse().unwrap();
        let values = bits.unpack("uint4, hex, uint4").unwrap();
        assert_eq!(
            values,
            vec![Value::UInt(0xa), Value::Text("bc".into()), Value::UInt(0xd)]
        );
        assert!(bits.unpack("uint, hex").is_err());
        assert!(bits.unpack("ue, hex").is_err());
        assert!(bits.unpack("uint20, hex").is_err());
    }

    #[test]
    fn test_read_as() {
        let bits: Bits = "0x0f".parse().unwrap();
        assert_eq!(bits.read_as("uint4", 4).unwrap(), (Value::UInt(15), 8));
        assert!(bits.read_as("uint8", 4).is_err());
    }

    #[test]
    fn test_from_bytes_with_offset() {
        let bits = Bits::from_bytes_with_offset(&[0xAB, 0xCD], 4, None).unwrap();
        assert_eq!(bits.to_hex().unwrap(), "bcd");
    }

    #[test]
    fn test_clones_share_and_add_copies() {
        let a: Bits = "0b10".parse().unwrap();
        let b = a.clone();
        assert!(std::ptr::eq(a.as_store(), b.as_store()));
        let c = &a + &b;
        assert_eq!(c.to_bin(), "1010");
        assert_eq!(a.to_bin(), "10");
        assert_eq!(c.reversed().to_bin(), "0101");
    }
}
