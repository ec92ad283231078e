//! The mutable bit container and its editing operations.
//!
//! Positions are bit offsets. Ranges are half-open and given as `Option<isize>` pairs:
//! `None` means the start or end of the container and negative values count from the
//! end. Every range goes through [`BitStore::resolve_range`], and every operation
//! validates its arguments before changing any bit.

use std::{fmt, ops::AddAssign, ops::Deref, str::FromStr};

use crate::{
    bitstring::{Bits, encode_key},
    dtypes::Register,
    errors::{Error, Result},
    format::struct_byte_sizes,
    store::BitStore,
    value::Value,
};

/// Group pattern for [`BitArray::byteswap`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ByteswapFormat {
    /// The whole range is one group.
    #[default]
    Whole,
    /// Groups of this many bytes.
    Bytes(usize),
    /// A repeating pattern of group sizes in bytes.
    Groups(Vec<usize>),
}

impl ByteswapFormat {
    fn byte_sizes(&self, range_bits: usize) -> Vec<usize> {
        match self {
            ByteswapFormat::Whole | ByteswapFormat::Bytes(0) => vec![range_bits / 8],
            ByteswapFormat::Bytes(n) => vec![*n],
            ByteswapFormat::Groups(sizes) => sizes.clone(),
        }
    }
}

impl From<usize> for ByteswapFormat {
    fn from(bytes: usize) -> Self {
        if bytes == 0 {
            ByteswapFormat::Whole
        } else {
            ByteswapFormat::Bytes(bytes)
        }
    }
}

impl From<Vec<usize>> for ByteswapFormat {
    fn from(sizes: Vec<usize>) -> Self {
        ByteswapFormat::Groups(sizes)
    }
}

impl FromStr for ByteswapFormat {
    type Err = Error;

    /// Parses comma-separated byte counts (`"2,4"`) or struct codes (`"<hhl"`).
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(ByteswapFormat::Whole);
        }
        if s.chars().all(|c| c.is_ascii_digit() || c == ',' || c.is_whitespace()) {
            let sizes = s
                .split(',')
                .map(|part| {
                    part.trim().parse::<usize>().map_err(|_| {
                        Error::InvalidArgument(format!("invalid byteswap group '{part}' in '{s}'"))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            return Ok(ByteswapFormat::Groups(sizes));
        }
        Ok(ByteswapFormat::Groups(struct_byte_sizes(s)?))
    }
}

/// A mutable sequence of bits that exclusively owns its storage.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct BitArray {
    store: BitStore,
}

impl BitArray {
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

    pub fn as_store(&self) -> &BitStore {
        &self.store
    }

    /// An immutable copy of the current content.
    pub fn to_bits(&self) -> Bits {
        self.store.clone().into()
    }

    /// A separate array with the same content.
    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// Resets to zero length.
    pub fn clear(&mut self) {
        self.store = BitStore::new();
    }

    /// Inserts `bits` so that they start at `pos`.
    pub fn insert(&mut self, bits: impl AsRef<BitStore>, pos: isize) -> Result<()> {
        let pos = self.check_position(pos)?;
        self.store.insert_at(pos, bits.as_ref());
        Ok(())
    }

    /// Writes `bits` over the bits starting at `pos`, growing if they run past the end.
    pub fn overwrite(&mut self, bits: impl AsRef<BitStore>, pos: isize) -> Result<()> {
        let pos = self.check_position(pos)?;
        self.store.overwrite_at(pos, bits.as_ref());
        Ok(())
    }

    pub fn delete(&mut self, start: Option<isize>, end: Option<isize>) -> Result<()> {
        let (start, end) = self.store.resolve_range(start, end)?;
        self.store.delete_range(start, end);
        Ok(())
    }

    /// Replaces `[start, end)` with `bits`, which may have a different length.
    pub fn splice(&mut self, start: Option<isize>, end: Option<isize>, bits: impl AsRef<BitStore>) -> Result<()> {
        let (start, end) = self.store.resolve_range(start, end)?;
        self.store.splice_range(start, end, bits.as_ref());
        Ok(())
    }

    pub fn append(&mut self, bits: impl AsRef<BitStore>) {
        self.store.extend_from(bits.as_ref());
    }

    pub fn prepend(&mut self, bits: impl AsRef<BitStore>) {
        self.store.insert_at(0, bits.as_ref());
    }

    /// Replaces non-overlapping occurrences of `old` with `new` and returns how many
    /// were replaced.
    ///
    /// Occurrences are found left to right in the original content before anything is
    /// replaced, so `new` may differ in length from `old` and is never searched itself.
    /// `count` limits the number of replacements; `None` or a negative count means no
    /// limit.
    pub fn replace(
        &mut self,
        old: impl AsRef<BitStore>,
        new: impl AsRef<BitStore>,
        start: Option<isize>,
        end: Option<isize>,
        count: Option<isize>,
        bytealigned: bool,
    ) -> Result<usize> {
        let (old, new) = (old.as_ref(), new.as_ref());
        if old.is_empty() {
            return Err(Error::EmptyPattern);
        }
        let (start, end) = self.store.resolve_range(start, end)?;
        let limit = match count {
            Some(n) if n >= 0 => n as usize,
            _ => usize::MAX,
        };

        let mut found = Vec::new();
        let mut from = start;
        while found.len() < limit {
            let Some(pos) = self.store.find(old, Some(from as isize), Some(end as isize), bytealigned)? else {
                break;
            };
            found.push(pos);
            from = pos + old.len();
        }
        if found.is_empty() {
            return Ok(0);
        }

        let mut out = BitStore::new();
        let mut copied = 0;
        for &pos in &found {
            out.extend_range(&self.store, copied, pos);
            out.extend_from(new);
            copied = pos + old.len();
        }
        out.extend_range(&self.store, copied, self.store.len());
        self.store = out;
        Ok(found.len())
    }

    /// Reverses the bit order of `[start, end)`.
    pub fn reverse(&mut self, start: Option<isize>, end: Option<isize>) -> Result<()> {
        let (start, end) = self.store.resolve_range(start, end)?;
        self.store.reverse_range(start, end);
        Ok(())
    }

    /// Rotates `[start, end)` left by `n` bits.
    pub fn rol(&mut self, n: isize, start: Option<isize>, end: Option<isize>) -> Result<()> {
        let (start, end, n) = self.rotation(n, start, end, "rotate")?;
        self.store.rotate_left(start, end, n);
        Ok(())
    }

    /// Rotates `[start, end)` right by `n` bits.
    pub fn ror(&mut self, n: isize, start: Option<isize>, end: Option<isize>) -> Result<()> {
        let (start, end, n) = self.rotation(n, start, end, "rotate")?;
        self.store.rotate_right(start, end, n);
        Ok(())
    }

    fn rotation(
        &self,
        n: isize,
        start: Option<isize>,
        end: Option<isize>,
        op: &'static str,
    ) -> Result<(usize, usize, usize)> {
        if n < 0 {
            return Err(Error::NegativeAmount { op, amount: n });
        }
        let (start, end) = self.store.resolve_range(start, end)?;
        let width = end - start;
        Ok((start, end, if width == 0 { 0 } else { n as usize % width }))
    }

    /// Reverses the byte order of each group of `format` across `[start, end)` and
    /// returns the number of times the whole pattern was applied.
    ///
    /// With `repeat` the pattern is tiled across the range; otherwise it is applied at
    /// most once. Bits after the last whole pattern are left alone, and a pattern
    /// totalling zero bytes does nothing.
    pub fn byteswap(
        &mut self,
        format: impl Into<ByteswapFormat>,
        start: Option<isize>,
        end: Option<isize>,
        repeat: bool,
    ) -> Result<usize> {
        let (start, end) = self.store.resolve_range(start, end)?;
        let sizes = format.into().byte_sizes(end - start);
        let pattern_bits = 8 * sizes.iter().sum::<usize>();
        if pattern_bits == 0 {
            return Ok(0);
        }
        let fits = (end - start) / pattern_bits;
        let repeats = if repeat { fits } else { fits.min(1) };
        for i in 0..repeats {
            let mut group_start = start + i * pattern_bits;
            for size in &sizes {
                let group_end = group_start + size * 8;
                self.store.reverse_bytes(group_start, group_end);
                group_start = group_end;
            }
        }
        Ok(repeats)
    }

    /// Sets the bit at `pos` to `value`.
    pub fn set(&mut self, value: bool, pos: isize) -> Result<()> {
        let index = self.store.resolve_index(pos)?;
        self.store.set_bit(index, value);
        Ok(())
    }

    /// Sets every listed bit. Nothing changes if any position is out of range.
    pub fn set_many(&mut self, value: bool, positions: impl IntoIterator<Item = isize>) -> Result<()> {
        for index in self.resolve_all(positions)? {
            self.store.set_bit(index, value);
        }
        Ok(())
    }

    pub fn set_all(&mut self, value: bool) {
        self.store.set_all(value);
    }

    /// Flips the bit at `pos`.
    pub fn invert(&mut self, pos: isize) -> Result<()> {
        let index = self.store.resolve_index(pos)?;
        self.store.invert_bit(index);
        Ok(())
    }

    /// Flips every listed bit. Nothing changes if any position is out of range.
    pub fn invert_many(&mut self, positions: impl IntoIterator<Item = isize>) -> Result<()> {
        for index in self.resolve_all(positions)? {
            self.store.invert_bit(index);
        }
        Ok(())
    }

    pub fn invert_all(&mut self) {
        self.store.invert_all();
    }

    /// Shifts the content left by `n` bits, filling with zeros. `n` is capped at the length.
    pub fn shift_left(&mut self, n: isize) -> Result<()> {
        let n = self.shift_amount(n)?;
        self.store.shift_left(n);
        Ok(())
    }

    /// Shifts the content right by `n` bits, filling with zeros. `n` is capped at the length.
    pub fn shift_right(&mut self, n: isize) -> Result<()> {
        let n = self.shift_amount(n)?;
        self.store.shift_right(n);
        Ok(())
    }

    fn shift_amount(&self, n: isize) -> Result<usize> {
        if self.store.is_empty() {
            return Err(Error::EmptyBitstring("shift"));
        }
        if n < 0 {
            return Err(Error::NegativeAmount {
                op: "shift",
                amount: n,
            });
        }
        Ok((n as usize).min(self.store.len()))
    }

    /// Replaces the content with `n` copies of itself.
    pub fn repeat(&mut self, n: isize) -> Result<()> {
        if n < 0 {
            return Err(Error::NegativeAmount {
                op: "repeat",
                amount: n,
            });
        }
        self.store = self.store.as_bitslice().repeat(n as usize).into();
        Ok(())
    }

    pub fn and_assign(&mut self, other: impl AsRef<BitStore>) -> Result<()> {
        self.combine(other.as_ref(), BitStore::and_with)
    }

    pub fn or_assign(&mut self, other: impl AsRef<BitStore>) -> Result<()> {
        self.combine(other.as_ref(), BitStore::or_with)
    }

    pub fn xor_assign(&mut self, other: impl AsRef<BitStore>) -> Result<()> {
        self.combine(other.as_ref(), BitStore::xor_with)
    }

    fn combine(&mut self, other: &BitStore, op: fn(&mut BitStore, &BitStore)) -> Result<()> {
        if self.store.len() != other.len() {
            return Err(Error::LengthMismatch {
                left: self.store.len(),
                right: other.len(),
            });
        }
        op(&mut self.store, other);
        Ok(())
    }

    /// Replaces the whole content with `value` encoded as `key` (`"uint12"`,
    /// `"float16"`, `"hex"`...), using the process-wide registry.
    pub fn set_field(&mut self, key: &str, value: impl Into<Value>) -> Result<()> {
        self.set_field_in(Register::global(), key, value)
    }

    /// Replaces the whole content with `value` encoded as `key`.
    ///
    /// A variable-length family named without a length uses the current length (text
    /// families such as `hex` take the length of the value instead).
    pub fn set_field_in(&mut self, register: &Register, key: &str, value: impl Into<Value>) -> Result<()> {
        self.store = encode_key(register, key, &value.into(), Some(self.store.len()))?;
        Ok(())
    }

    /// Decodes the whole content as `key`.
    pub fn get_field(&self, key: &str) -> Result<Value> {
        self.store.interpret(key)
    }

    fn check_position(&self, pos: isize) -> Result<usize> {
        if pos < 0 || pos as usize > self.store.len() {
            return Err(Error::PositionOutOfRange {
                pos,
                len: self.store.len(),
            });
        }
        Ok(pos as usize)
    }

    fn resolve_all(&self, positions: impl IntoIterator<Item = isize>) -> Result<Vec<usize>> {
        positions
            .into_iter()
            .map(|pos| self.store.resolve_index(pos))
            .collect()
    }
}

impl Deref for BitArray {
    type Target = BitStore;

    fn deref(&self) -> &BitStore {
        &self.store
    }
}

impl AsRef<BitStore> for BitArray {
    fn as_ref(&self) -> &BitStore {
        &self.store
    }
}

impl From<BitStore> for BitArray {
    fn from(store: BitStore) -> Self {
        Self { store }
    }
}

impl From<&Bits> for BitArray {
    fn from(bits: &Bits) -> Self {
        bits.as_store().clone().into()
    }
}

impl From<Bits> for BitArray {
    fn from(bits: Bits) -> Self {
        bits.into_store().into()
    }
}

impl From<BitArray> for Bits {
    fn from(array: BitArray) -> Self {
        array.store.into()
    }
}

impl FromStr for BitArray {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(Bits::from_format(s)?.into())
    }
}

impl<T: AsRef<BitStore>> AddAssign<T> for BitArray {
    fn add_assign(&mut self, rhs: T) {
        self.append(rhs);
    }
}

impl fmt::Display for BitArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.store, f)
    }
}

impl fmt::Debug for BitArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BitArray('{}')", self.store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    fn array(s: &str) -> BitArray {
        s.parse().unwrap()
    }

    #[test]
    fn test_delete_byte() {
        let mut a = array("0x001122");
        a.delete(Some(8), Some(16)).unwrap();
        assert_eq!(a, array("0x0022"));
    }

    #[test]
    fn test_insert_and_overwrite_bounds() {
        let mut a = array("0b0000");
        a.insert(array("0b11"), 4).unwrap();
        assert_eq!(a.to_bin(), "000011");
        assert_eq!(
            a.insert(array("0b1"), 7).unwrap_err(),
            Error::PositionOutOfRange { pos: 7, len: 6 }
        );
        assert_eq!(a.insert(array("0b1"), -1).unwrap_err().kind(), ErrorKind::Range);
        a.overwrite(array("0b111"), 5).unwrap();
        assert_eq!(a.to_bin(), "00001111");
        a.overwrite(array("0b0"), 0).unwrap();
        assert_eq!(a.len(), 8);
    }

    #[test]
    fn test_append_prepend_splice() {
        let mut a = array("0b1");
        a.append(array("0b00"));
        a.prepend(array("0b0"));
        assert_eq!(a.to_bin(), "0100");
        a.splice(Some(1), Some(3), array("0b111")).unwrap();
        assert_eq!(a.to_bin(), "01110");
        a += array("0b1");
        assert_eq!(a.to_bin(), "011101");
    }

    #[test]
    fn test_replace_with_count() {
        let mut a = array("0x5555");
        let old = array("0b01");
        let new = array("0b10");
        assert_eq!(a.replace(&old, &new, None, None, Some(3), false).unwrap(), 3);
        assert_eq!(a.to_bin(), "1010100101010101");
        let mut a = array("0x5555");
        assert_eq!(a.replace(&old, &new, None, None, Some(-1), false).unwrap(), 8);
        assert_eq!(a.to_hex().unwrap(), "aaaa");
        assert_eq!(a.replace(&old, &new, None, None, Some(0), false).unwrap(), 0);
    }

    #[test]
    fn test_replace_non_overlapping_and_length_changing() {
        let mut a = array("0b1111");
        assert_eq!(a.replace(array("0b11"), array("0b0"), None, None, None, false).unwrap(), 2);
        assert_eq!(a.to_bin(), "00");
        let mut a = array("0b0101");
        assert_eq!(a.replace(array("0b1"), array("0b11"), None, None, None, false).unwrap(), 2);
        assert_eq!(a.to_bin(), "011011");
        assert_eq!(
            a.replace(BitStore::new(), array("0b1"), None, None, None, false).unwrap_err(),
            Error::EmptyPattern
        );
    }

    #[test]
    fn test_replace_in_range_bytealigned() {
        let mut a = array("0xf0f0f0");
        let n = a
            .replace(array("0xf"), array("0x1"), Some(8), None, None, true)
            .unwrap();
        assert_eq!(n, 2);
        assert_eq!(a.to_hex().unwrap(), "f01010");
    }

    #[test]
    fn test_reverse() {
        let mut a = array("0b11001010");
        a.reverse(Some(0), Some(4)).unwrap();
        assert_eq!(a.to_bin(), "00111010");
        let before = a.clone();
        a.reverse(Some(3), Some(3)).unwrap();
        assert_eq!(a, before);
        assert!(a.reverse(Some(5), Some(2)).is_err());
    }

    #[test]
    fn test_rotate() {
        let mut a = array("0b10000");
        a.rol(1, None, None).unwrap();
        assert_eq!(a.to_bin(), "00001");
        a.ror(2, None, None).unwrap();
        assert_eq!(a.to_bin(), "01000");
        a.rol(7, Some(1), Some(4)).unwrap();
        assert_eq!(a.to_bin(), "00010");
        a.rol(3, Some(2), Some(2)).unwrap();
        assert_eq!(a.to_bin(), "00010");
        assert_eq!(
            a.rol(-1, None, None).unwrap_err(),
            Error::NegativeAmount { op: "rotate", amount: -1 }
        );
    }

    #[test]
    fn test_byteswap_two_byte_groups() {
        let mut a = array("0x11223344");
        assert_eq!(a.byteswap(2usize, None, None, true).unwrap(), 2);
        assert_eq!(a.to_hex().unwrap(), "22114433");
    }

    #[test]
    fn test_byteswap_formats() {
        let mut a = array("0x0102030405");
        assert_eq!(a.byteswap(0usize, None, None, true).unwrap(), 1);
        assert_eq!(a.to_hex().unwrap(), "0504030201");

        let mut a = array("0x010203040506070809");
        let format: ByteswapFormat = "1,2".parse().unwrap();
        assert_eq!(a.byteswap(format, None, None, true).unwrap(), 3);
        assert_eq!(a.to_hex().unwrap(), "010302040605070908");

        let mut a = array("0x0102030405060708");
        let format: ByteswapFormat = "<hl".parse().unwrap();
        assert_eq!(format, ByteswapFormat::Groups(vec![2, 4]));
        assert_eq!(a.byteswap(format, None, None, true).unwrap(), 1);
        assert_eq!(a.to_hex().unwrap(), "0201060504030708");
    }

    #[test]
    fn test_byteswap_repeat_and_partial_groups() {
        let mut a = array("0x1122334455");
        assert_eq!(a.byteswap(2usize, None, None, false).unwrap(), 1);
        assert_eq!(a.to_hex().unwrap(), "2211334455");
        let mut a = array("0x1122334455");
        assert_eq!(a.byteswap(2usize, None, None, true).unwrap(), 2);
        assert_eq!(a.to_hex().unwrap(), "2211443355");
        let before = a.clone();
        assert_eq!(a.byteswap(vec![0, 0], None, None, true).unwrap(), 0);
        assert_eq!(a, before);
        assert!("2,x".parse::<ByteswapFormat>().is_err());
    }

    #[test]
    fn test_set_and_invert() {
        let mut a = BitArray::zeros(8);
        a.set(true, 0).unwrap();
        a.set(true, -1).unwrap();
        assert_eq!(a.to_bin(), "10000001");
        a.invert_many([1, 2]).unwrap();
        assert_eq!(a.to_bin(), "11100001");
        a.invert(0).unwrap();
        assert_eq!(a.to_bin(), "01100001");
        assert_eq!(
            a.set(true, 8).unwrap_err(),
            Error::IndexOutOfRange { index: 8, len: 8 }
        );
        let before = a.clone();
        assert!(a.set_many(false, [1, 2, -9]).is_err());
        assert_eq!(a, before);
        a.set_all(true);
        assert!(a.all(true));
        a.invert_all();
        assert!(a.all(false));
    }

    #[test]
    fn test_shifts() {
        let mut a = array("0b10110");
        a.shift_left(2).unwrap();
        assert_eq!(a.to_bin(), "11000");
        a.shift_right(1).unwrap();
        assert_eq!(a.to_bin(), "01100");
        a.shift_left(0).unwrap();
        assert_eq!(a.to_bin(), "01100");
        a.shift_right(99).unwrap();
        assert_eq!(a.to_bin(), "00000");
        assert!(a.shift_left(-1).is_err());
        assert_eq!(
            BitArray::new().shift_left(1).unwrap_err(),
            Error::EmptyBitstring("shift")
        );
    }

    #[test]
    fn test_repeat_and_logic() {
        let mut a = array("0b10");
        a.repeat(3).unwrap();
        assert_eq!(a.to_bin(), "101010");
        assert!(a.repeat(-1).is_err());
        a.and_assign(array("0b110011")).unwrap();
        assert_eq!(a.to_bin(), "100010");
        a.or_assign(array("0b000001")).unwrap();
        assert_eq!(a.to_bin(), "100011");
        a.xor_assign(array("0b111111")).unwrap();
        assert_eq!(a.to_bin(), "011100");
        assert_eq!(
            a.and_assign(array("0b1")).unwrap_err(),
            Error::LengthMismatch { left: 6, right: 1 }
        );
        a.repeat(0).unwrap();
        assert!(a.is_empty());
    }

    #[test]
    fn test_set_field() {
        let mut a = BitArray::zeros(12);
        a.set_field("uint", 7u8).unwrap();
        assert_eq!(a.len(), 12);
        assert_eq!(a.get_field("uint").unwrap(), Value::UInt(7));
        a.set_field("float16", 1.5f64).unwrap();
        assert_eq!(a.len(), 16);
        assert_eq!(a.get_field("float").unwrap(), Value::Float(1.5));
        a.set_field("hex", "abc").unwrap();
        assert_eq!(a.to_hex().unwrap(), "abc");
        a.set_field("e2m1mxfp", 3.0f64).unwrap();
        assert_eq!(a.to_bin(), "0101");
        let err = a.set_field("bin4", "101").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Creation);
        assert_eq!(a.to_bin(), "0101");
        assert!(a.set_field("bogus", 1u8).is_err());
    }

    #[test]
    fn test_conversions_copy_or_move() {
        let bits: Bits = "0xf0".parse().unwrap();
        let mut a = BitArray::from(&bits);
        a.invert_all();
        assert_eq!(bits.to_hex().unwrap(), "f0");
        assert_eq!(a.to_hex().unwrap(), "0f");
        let frozen: Bits = a.copy().into();
        a.clear();
        assert!(a.is_empty());
        assert_eq!(frozen.to_hex().unwrap(), "0f");
    }
}
