//! Integer field access on MSB-first bit slices.
//!
//! Bit 0 is the high bit of the first byte, so a field reads as the number it spells.

use bitvec::{field::BitField, order::Msb0, slice::BitSlice};

use crate::errors::ReadError;

/// Reads `n` bits starting at `bit_pos` as an unsigned value (max 128 bits).
pub fn read_bits_at(data: &BitSlice<u8, Msb0>, bit_pos: usize, n: usize) -> Result<u128, ReadError> {
    let field = field(data, bit_pos, n)?;
    Ok(if n == 0 { 0 } else { field.load_be::<u128>() })
}

/// Writes the low `n` bits of `value` starting at `bit_pos`.
pub fn write_bits_at(data: &mut BitSlice<u8, Msb0>, bit_pos: usize, n: usize, value: u128) -> Result<(), ReadError> {
    field(data, bit_pos, n)?;
    if n > 0 {
        data[bit_pos..bit_pos + n].store_be(value);
    }
    Ok(())
}

fn field(data: &BitSlice<u8, Msb0>, bit_pos: usize, n: usize) -> Result<&BitSlice<u8, Msb0>, ReadError> {
    if n > 128 {
        return Err(ReadError::TooManyBitsRead);
    }
    let end = bit_pos
        .checked_add(n)
        .filter(|end| *end <= data.len())
        .ok_or(ReadError::OutOfBounds)?;
    Ok(&data[bit_pos..end])
}

/// Sign-extends the low `bits` of `value` to a full `i128`.
pub fn sign_extend(value: u128, bits: usize) -> i128 {
    if bits == 0 {
        return 0;
    }
    let shift = 128 - bits;
    ((value << shift) as i128) >> shift
}

#[cfg(test)]
mod tests {
    use bitvec::{bits, bitvec};

    use super::*;

    #[test]
    fn test_read_bits_at() {
        let data = bits![u8, Msb0; 1, 1, 1, 1, 1, 1, 1, 1];
        assert_eq!(read_bits_at(data, 0, 8).unwrap(), 0b11111111);
    }

    #[test]
    fn test_read_bits_unaligned() {
        let data = BitSlice::<u8, Msb0>::from_slice(&[0b0000_1111, 0b0101_0000]);
        assert_eq!(read_bits_at(data, 4, 8).unwrap(), 0b1111_0101);
        assert_eq!(read_bits_at(data, 3, 0).unwrap(), 0);
    }

    #[test]
    fn test_read_bits_out_of_bounds() {
        let data = BitSlice::<u8, Msb0>::from_slice(&[0xFF]);
        assert_eq!(read_bits_at(data, 0, 9).unwrap_err(), ReadError::OutOfBounds);
        assert_eq!(read_bits_at(data, usize::MAX, 2).unwrap_err(), ReadError::OutOfBounds);
    }

    #[test]
    fn test_read_bits_more_than_128() {
        let data = BitSlice::<u8, Msb0>::from_slice(&[0u8; 32]);
        assert_eq!(read_bits_at(data, 0, 129).unwrap_err(), ReadError::TooManyBitsRead);
    }

    #[test]
    fn test_write_bits_at() {
        let mut data = bitvec![u8, Msb0; 0; 16];
        write_bits_at(&mut data, 4, 8, 0xAB).unwrap();
        assert_eq!(data.as_raw_slice(), &[0x0A, 0xB0]);
        assert_eq!(write_bits_at(&mut data, 10, 8, 0).unwrap_err(), ReadError::OutOfBounds);
    }

    #[test]
    fn test_wide_field_round_trip() {
        let mut data = bitvec![u8, Msb0; 0; 140];
        write_bits_at(&mut data, 5, 128, u128::MAX - 6).unwrap();
        assert_eq!(read_bits_at(&data, 5, 128).unwrap(), u128::MAX - 6);
        assert_eq!(read_bits_at(&data, 0, 5).unwrap(), 0);
    }

    #[test]
    fn test_sign_extend() {
        assert_eq!(sign_extend(0b11111111, 8), -1);
        assert_eq!(sign_extend(0b01111111, 8), 127);
        assert_eq!(sign_extend(u128::MAX, 128), -1);
    }
}
