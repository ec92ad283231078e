//! Bit storage shared by [`crate::Bits`] and [`crate::BitArray`].
//!
//! A thin owner around `BitVec<u8, Msb0>`: bit 0 is the high bit of the first byte.
//! This module adds signed range resolution, pattern search and the text renderings;
//! the editing primitives are the bit-vector's own.

use std::fmt;

use bitvec::{
    order::Msb0,
    slice::{BitSlice, BitValIter},
    vec::BitVec,
};

use crate::{
    bits::{read_bits_at, write_bits_at},
    errors::{Error, ReadError, Result},
};

/// A growable sequence of bits.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct BitStore {
    bits: BitVec<u8, Msb0>,
}

impl BitStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// `len` zero bits.
    pub fn zeros(len: usize) -> Self {
        BitVec::<u8, Msb0>::repeat(false, len).into()
    }

    /// `len` one bits.
    pub fn ones(len: usize) -> Self {
        BitVec::<u8, Msb0>::repeat(true, len).into()
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        BitVec::<u8, Msb0>::from_slice(bytes).into()
    }

    /// Takes `length` bits (default: all remaining) of `bytes` after skipping `offset` bits.
    pub fn from_bytes_with_offset(bytes: &[u8], offset: usize, length: Option<usize>) -> Result<Self> {
        let full = BitSlice::<u8, Msb0>::from_slice(bytes);
        let out_of_range = |end: Option<usize>| Error::InvalidRange {
            start: to_signed(offset),
            end: end.map_or(isize::MAX, to_signed),
            len: full.len(),
        };
        let available = full.len().checked_sub(offset).ok_or_else(|| out_of_range(Some(full.len())))?;
        let length = length.unwrap_or(available);
        if length > available {
            return Err(out_of_range(offset.checked_add(length)));
        }
        Ok(BitVec::from_bitslice(&full[offset..offset + length]).into())
    }

    pub fn from_bools<I: IntoIterator<Item = bool>>(bits: I) -> Self {
        bits.into_iter().collect::<BitVec<u8, Msb0>>().into()
    }

    /// The low `len` bits of `value`, MSB-first. Higher bits are discarded.
    pub fn from_uint(value: u128, len: usize) -> Self {
        let mut store = Self::zeros(len);
        let n = len.min(128);
        // In range by construction: the field ends at len.
        let _ = write_bits_at(&mut store.bits, len - n, n, value);
        store
    }

    /// Parses binary digits, with an optional `0b` prefix. `_` and whitespace are ignored.
    pub fn from_bin_str(s: &str) -> Result<Self> {
        let digits = strip_prefix(s, "0b");
        let mut store = Self::new();
        for c in digits.chars().filter(|c| *c != '_' && !c.is_whitespace()) {
            match c {
                '0' => store.push(false),
                '1' => store.push(true),
                _ => return Err(Error::creation(format!("invalid binary digit '{c}' in '{s}'"))),
            }
        }
        Ok(store)
    }

    /// Parses hex digits (4 bits each), with an optional `0x` prefix.
    pub fn from_hex_str(s: &str) -> Result<Self> {
        Self::from_radix_str(s, "0x", 16, 4)
    }

    /// Parses octal digits (3 bits each), with an optional `0o` prefix.
    pub fn from_oct_str(s: &str) -> Result<Self> {
        Self::from_radix_str(s, "0o", 8, 3)
    }

    fn from_radix_str(s: &str, prefix: &str, radix: u32, bits_per_digit: usize) -> Result<Self> {
        let digits = strip_prefix(s, prefix);
        let mut store = Self::new();
        for c in digits.chars().filter(|c| *c != '_' && !c.is_whitespace()) {
            let digit = c
                .to_digit(radix)
                .ok_or_else(|| Error::creation(format!("invalid digit '{c}' in '{s}'")))?;
            store.extend_from(&Self::from_uint(digit as u128, bits_per_digit));
        }
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// The bit at `index`, or `None` past the end.
    pub fn get(&self, index: usize) -> Option<bool> {
        self.bits.get(index).map(|bit| *bit)
    }

    /// The bit at a signed `index`; negative indices count from the end.
    pub fn bit(&self, index: isize) -> Result<bool> {
        Ok(self.bits[self.resolve_index(index)?])
    }

    pub fn iter(&self) -> BitValIter<'_, u8, Msb0> {
        self.bits.iter().by_vals()
    }

    /// The content as a bit slice.
    pub fn as_bitslice(&self) -> &BitSlice<u8, Msb0> {
        &self.bits
    }

    /// Content as bytes, with the last byte zero-padded if needed.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bits = self.bits.clone();
        bits.force_align();
        bits.set_uninitialized(false);
        bits.into_vec()
    }

    /// Reads `n` bits from `start` as an unsigned integer (`n <= 128`).
    pub fn uint_at(&self, start: usize, n: usize) -> Result<u128, ReadError> {
        read_bits_at(&self.bits, start, n)
    }

    /// Copies out `[start, end)`. Callers validate the range first.
    pub fn slice(&self, start: usize, end: usize) -> BitStore {
        BitVec::from_bitslice(&self.bits[start..end]).into()
    }

    pub fn count(&self, value: bool) -> usize {
        if value { self.bits.count_ones() } else { self.bits.count_zeros() }
    }

    /// True if every bit equals `value`. Vacuously true when empty.
    pub fn all(&self, value: bool) -> bool {
        if value { self.bits.all() } else { self.bits.not_any() }
    }

    pub fn any(&self, value: bool) -> bool {
        if value { self.bits.any() } else { self.bits.not_all() }
    }

    pub fn starts_with(&self, prefix: &BitStore) -> bool {
        self.bits.starts_with(prefix.as_bitslice())
    }

    pub fn ends_with(&self, suffix: &BitStore) -> bool {
        self.bits.ends_with(suffix.as_bitslice())
    }

    /// Resolves an optional, possibly negative `[start, end)` pair against this length.
    ///
    /// Every range-taking operation goes through here so error behaviour is uniform.
    pub fn resolve_range(&self, start: Option<isize>, end: Option<isize>) -> Result<(usize, usize)> {
        let len = to_signed(self.len());
        let mut start = start.unwrap_or(0);
        let mut end = end.unwrap_or(len);
        if start < 0 {
            start += len;
        }
        if end < 0 {
            end += len;
        }
        if start < 0 || end > len || end < start {
            return Err(Error::InvalidRange {
                start,
                end,
                len: self.len(),
            });
        }
        Ok((start as usize, end as usize))
    }

    /// Resolves a signed bit index, accepting `[-len, len)`.
    pub fn resolve_index(&self, index: isize) -> Result<usize> {
        let len = to_signed(self.len());
        if index < -len || index >= len {
            return Err(Error::IndexOutOfRange {
                index,
                len: self.len(),
            });
        }
        Ok(if index < 0 { index + len } else { index } as usize)
    }

    /// First position of `pattern` inside `[start, end)`.
    pub fn find(
        &self,
        pattern: &BitStore,
        start: Option<isize>,
        end: Option<isize>,
        bytealigned: bool,
    ) -> Result<Option<usize>> {
        Ok(self.findall(pattern, start, end, Some(1), bytealigned)?.first().copied())
    }

    /// Last position of `pattern` inside `[start, end)`.
    pub fn rfind(
        &self,
        pattern: &BitStore,
        start: Option<isize>,
        end: Option<isize>,
        bytealigned: bool,
    ) -> Result<Option<usize>> {
        let (start, end) = self.search_range(pattern, start, end)?;
        Ok(self.bits[start..end]
            .windows(pattern.len())
            .enumerate()
            .rev()
            .map(|(i, window)| (start + i, window))
            .find(|(pos, window)| (!bytealigned || pos % 8 == 0) && *window == pattern.as_bitslice())
            .map(|(pos, _)| pos))
    }

    /// Every (possibly overlapping) position of `pattern` inside `[start, end)`, up
    /// to `count` results.
    pub fn findall(
        &self,
        pattern: &BitStore,
        start: Option<isize>,
        end: Option<isize>,
        count: Option<usize>,
        bytealigned: bool,
    ) -> Result<Vec<usize>> {
        let (start, end) = self.search_range(pattern, start, end)?;
        if end - start < pattern.len() {
            return Ok(Vec::new());
        }
        Ok(self.bits[start..end]
            .windows(pattern.len())
            .enumerate()
            .map(|(i, window)| (start + i, window))
            .filter(|(pos, window)| (!bytealigned || pos % 8 == 0) && *window == pattern.as_bitslice())
            .map(|(pos, _)| pos)
            .take(count.unwrap_or(usize::MAX))
            .collect())
    }

    fn search_range(&self, pattern: &BitStore, start: Option<isize>, end: Option<isize>) -> Result<(usize, usize)> {
        if pattern.is_empty() {
            return Err(Error::EmptyPattern);
        }
        self.resolve_range(start, end)
    }

    /// Binary digits without a prefix.
    pub fn to_bin(&self) -> String {
        self.iter().map(|b| if b { '1' } else { '0' }).collect()
    }

    /// Hex digits without a prefix. Length must be a multiple of 4.
    pub fn to_hex(&self) -> Result<String> {
        self.to_radix(4, "hex")
    }

    /// Octal digits without a prefix. Length must be a multiple of 3.
    pub fn to_oct(&self) -> Result<String> {
        self.to_radix(3, "oct")
    }

    fn to_radix(&self, bits_per_digit: usize, name: &str) -> Result<String> {
        if self.len() % bits_per_digit != 0 {
            return Err(Error::InvalidArgument(format!(
                "can't represent {} bits as {name}: not a multiple of {bits_per_digit}",
                self.len()
            )));
        }
        let radix = 1u32 << bits_per_digit;
        (0..self.len())
            .step_by(bits_per_digit)
            .map(|pos| {
                let digit = self.uint_at(pos, bits_per_digit)? as u32;
                char::from_digit(digit, radix).ok_or(Error::Read(ReadError::OutOfBounds))
            })
            .collect()
    }

    pub(crate) fn push(&mut self, bit: bool) {
        self.bits.push(bit);
    }

    pub(crate) fn extend_from(&mut self, other: &BitStore) {
        self.bits.extend_from_bitslice(&other.bits);
    }

    /// Appends `other[start..end]`.
    pub(crate) fn extend_range(&mut self, other: &BitStore, start: usize, end: usize) {
        self.bits.extend_from_bitslice(&other.bits[start..end]);
    }

    pub(crate) fn set_bit(&mut self, index: usize, bit: bool) {
        self.bits.set(index, bit);
    }

    pub(crate) fn invert_bit(&mut self, index: usize) {
        let bit = self.bits[index];
        self.bits.set(index, !bit);
    }

    pub(crate) fn set_all(&mut self, value: bool) {
        self.bits.fill(value);
    }

    pub(crate) fn invert_all(&mut self) {
        self.bits = !std::mem::take(&mut self.bits);
    }

    pub(crate) fn insert_at(&mut self, pos: usize, other: &BitStore) {
        self.splice_range(pos, pos, other);
    }

    pub(crate) fn delete_range(&mut self, start: usize, end: usize) {
        self.bits.drain(start..end);
    }

    /// Writes `other` from `pos`, growing when it runs past the end.
    pub(crate) fn overwrite_at(&mut self, pos: usize, other: &BitStore) {
        let overlap = other.len().min(self.len() - pos);
        self.bits[pos..pos + overlap].copy_from_bitslice(&other.bits[..overlap]);
        self.bits.extend_from_bitslice(&other.bits[overlap..]);
    }

    /// Replaces `[start, end)` with `other`.
    pub(crate) fn splice_range(&mut self, start: usize, end: usize, other: &BitStore) {
        let tail = self.bits.split_off(end);
        self.bits.truncate(start);
        self.bits.extend_from_bitslice(&other.bits);
        self.bits.extend_from_bitslice(&tail);
    }

    pub(crate) fn reverse_range(&mut self, start: usize, end: usize) {
        self.bits[start..end].reverse();
    }

    /// Reverses the order of the whole bytes in `[start, end)`, keeping each byte's bits.
    pub(crate) fn reverse_bytes(&mut self, start: usize, end: usize) {
        let group = &mut self.bits[start..end];
        group.reverse();
        for byte in group.chunks_exact_mut(8) {
            byte.reverse();
        }
    }

    pub(crate) fn rotate_left(&mut self, start: usize, end: usize, n: usize) {
        self.bits[start..end].rotate_left(n);
    }

    pub(crate) fn rotate_right(&mut self, start: usize, end: usize, n: usize) {
        self.bits[start..end].rotate_right(n);
    }

    /// Moves every bit `n` places towards index 0, zero-filling the tail.
    pub(crate) fn shift_left(&mut self, n: usize) {
        if n >= self.len() {
            self.bits.fill(false);
        } else {
            self.bits.shift_left(n);
        }
    }

    /// Moves every bit `n` places towards the end, zero-filling the head.
    pub(crate) fn shift_right(&mut self, n: usize) {
        if n >= self.len() {
            self.bits.fill(false);
        } else {
            self.bits.shift_right(n);
        }
    }

    pub(crate) fn and_with(&mut self, other: &BitStore) {
        *self.bits.as_mut_bitslice() &= other.bits.as_bitslice();
    }

    pub(crate) fn or_with(&mut self, other: &BitStore) {
        *self.bits.as_mut_bitslice() |= other.bits.as_bitslice();
    }

    pub(crate) fn xor_with(&mut self, other: &BitStore) {
        *self.bits.as_mut_bitslice() ^= other.bits.as_bitslice();
    }
}

fn to_signed(n: usize) -> isize {
    isize::try_from(n).unwrap_or(isize::MAX)
}

fn strip_prefix<'a>(s: &'a str, prefix: &str) -> &'a str {
    let s = s.trim();
    match s.get(..prefix.len()) {
        Some(head) if head.eq_ignore_ascii_case(prefix) => &s[prefix.len()..],
        _ => s,
    }
}

impl From<BitVec<u8, Msb0>> for BitStore {
    fn from(bits: BitVec<u8, Msb0>) -> Self {
        Self { bits }
    }
}

impl AsRef<BitStore> for BitStore {
    fn as_ref(&self) -> &BitStore {
        self
    }
}

impl fmt::Display for BitStore {
    /// Hex when the length allows it, binary otherwise.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_hex() {
            Ok(hex) if !self.is_empty() => write!(f, "0x{hex}"),
            _ => write!(f, "0b{}", self.to_bin()),
        }
    }
}

impl fmt::Debug for BitStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BitStore({self})")
    }
}

impl<'a> IntoIterator for &'a BitStore {
    type Item = bool;
    type IntoIter = BitValIter<'a, u8, Msb0>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
