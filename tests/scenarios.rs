//! End-to-end behaviour through the public API.

use std::sync::Arc;

use bitshape::{
    BitArray, BitStore, Bits, DtypeTraits, ErrorKind, Kwargs, MetaDtype, MxfpOverflow, Options, Register, Value,
    errors::InterpretError, fp8::P4BINARY8,
};

#[test]
fn test_delete_middle_byte() {
    let mut a: BitArray = "0x001122".parse().unwrap();
    assert_eq!(a.len(), 24);
    a.delete(Some(8), Some(16)).unwrap();
    assert_eq!(a, "0x0022".parse().unwrap());
}

#[test]
fn test_replace_stops_at_count() {
    let mut a: BitArray = "0x0f0f0f0f".parse().unwrap();
    let old = Bits::from_format("0b01").unwrap();
    let new = Bits::from_format("0b10").unwrap();
    assert_eq!(a.findall(&old, None, None, None, false).unwrap().len(), 4);

    let mut b = BitArray::from(Bits::from_format("0x5555").unwrap());
    assert_eq!(b.findall(&old, None, None, None, false).unwrap().len(), 8);
    assert_eq!(b.replace(&old, &new, None, None, Some(3), false).unwrap(), 3);
    assert_eq!(b.findall(&new, Some(0), Some(6), None, false).unwrap(), vec![0, 2, 4]);

    assert_eq!(a.replace(&old, &new, None, None, None, true).unwrap(), 0);
}

#[test]
fn test_byteswap_pairs() {
    let mut a: BitArray = "0xa1b2c3d4".parse().unwrap();
    assert_eq!(a.byteswap(2usize, None, None, true).unwrap(), 2);
    assert_eq!(a.to_hex().unwrap(), "b2a1d4c3");
}

#[test]
fn test_binary8_specials() {
    assert_eq!(P4BINARY8.encode(0.0), 0x00);
    assert_eq!(P4BINARY8.encode(f64::NAN), 0xFF);
    assert_eq!(P4BINARY8.encode(f64::NEG_INFINITY), 0x80 | 0x7F);
    assert_eq!(Bits::from_dtype("p4binary", f64::NAN).unwrap().to_hex().unwrap(), "ff");
}

#[test]
fn test_registry_lookup() {
    let dtype = Register::global().get_dtype("uint", Some(8)).unwrap();
    assert_eq!(dtype.to_string(), "uint8");
    assert_eq!(dtype.get(&BitStore::zeros(8), 0).unwrap(), Value::UInt(0));

    let err = Register::global().get_dtype("bogus", Some(8)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Value);
}

#[test]
fn test_error_kinds() {
    let mut a = BitArray::zeros(4);
    assert_eq!(a.insert(Bits::ones(1), 5).unwrap_err().kind(), ErrorKind::Range);
    assert_eq!(a.set(true, 4).unwrap_err().kind(), ErrorKind::Index);
    assert_eq!(a.rol(-2, None, None).unwrap_err().kind(), ErrorKind::Value);
    assert_eq!(a.set_field("uint3", 9u8).unwrap_err().kind(), ErrorKind::Creation);
    assert_eq!(
        Register::global().get_dtype("float", Some(12)).unwrap_err().kind(),
        ErrorKind::Value
    );
    assert_eq!(a.get_field("float16").unwrap_err().kind(), ErrorKind::Interpret);
}

#[test]
fn test_private_registry_options() {
    let register = Register::with_builtins(&Options::default().with_mxfp_overflow(MxfpOverflow::Overflow)).unwrap();
    let big = [Value::from(1e6f64)];
    let overflowed = Bits::pack_in(&register, "e5m2mxfp", &big, &Kwargs::new()).unwrap();
    assert_eq!(overflowed.to_hex().unwrap(), "7c");
    let saturated = Bits::pack("e5m2mxfp", &big).unwrap();
    assert_eq!(saturated.to_hex().unwrap(), "7b");
}

fn gray_code() -> MetaDtype {
    MetaDtype::new(
        "gray",
        DtypeTraits {
            is_integer: true,
            ..Default::default()
        },
        None,
        Arc::new(|value: &Value, length: Option<usize>| -> bitshape::Result<BitStore> {
            let n = length.unwrap_or_default();
            let v = value.to_u128()?;
            if n < 128 && v >> n != 0 {
                return Err(bitshape::Error::Creation(format!("{v} doesn't fit in {n} bits")));
            }
            Ok(BitStore::from_uint(v ^ (v >> 1), n))
        }),
        Arc::new(
            |store: &BitStore, start: usize, length: Option<usize>| -> Result<(Value, usize), InterpretError> {
                let n = length.unwrap_or(store.len().saturating_sub(start));
                let mut v = store.uint_at(start, n).map_err(|_| InterpretError::NotEnoughBits {
                    dtype: "gray".into(),
                    pos: start,
                })?;
                let mut shift = v >> 1;
                while shift != 0 {
                    v ^= shift;
                    shift >>= 1;
                }
                Ok((Value::UInt(v), start + n))
            },
        ),
    )
    .unwrap()
}

#[test]
fn test_user_family() {
    let mut register = Register::with_builtins(&Options::default()).unwrap();
    register.add_meta_dtype(gray_code());
    register.add_meta_dtype_alias("gray", "reflected").unwrap();

    let bits = Bits::pack_in(&register, "gray4, reflected4", &[Value::from(5u8), Value::from(15u8)], &Kwargs::new())
        .unwrap();
    assert_eq!(bits.to_bin(), "01111000");
    assert_eq!(
        bits.unpack_in(&register, "gray4, gray", &Kwargs::new()).unwrap(),
        vec![Value::UInt(5), Value::UInt(15)]
    );
    assert!(register.get_dtype("gray", Some(200)).is_err());
    assert!(register.get_dtype("gray", None).is_err());
    assert!(Register::global().get_dtype("gray", Some(4)).is_err());
}

#[test]
fn test_keyword_lengths_and_values() {
    let mut kwargs = Kwargs::new();
    kwargs.insert("n".into(), Value::from(6u8));
    kwargs.insert("flag".into(), Value::from(true));
    let bits = Bits::pack_in(Register::global(), "uint:n, bool=flag, 2*(0b1)", &[Value::from(33u8)], &kwargs).unwrap();
    assert_eq!(bits.to_bin(), "100001111");
    let values = bits.unpack_in(Register::global(), "uint:n, bool, bits", &kwargs).unwrap();
    assert_eq!(values[0], Value::UInt(33));
    assert_eq!(values[1], Value::Bool(true));
    assert_eq!(values[2], Value::Bits("0b11".parse().unwrap()));
}

#[test]
fn test_immutable_to_mutable_copies() {
    let frozen = Bits::from_dtype("int12", -5i8).unwrap();
    let mut edit = BitArray::from(&frozen);
    edit.invert_all();
    assert_eq!(frozen.interpret("int").unwrap(), Value::Int(-5));
    assert_eq!(edit.get_field("int").unwrap(), Value::Int(4));
    let back: Bits = edit.into();
    assert_eq!(back.interpret("uint12").unwrap(), Value::UInt(4));
}

#[test]
fn test_offset_reads_reject_impossible_lengths() {
    let err = Bits::from_bytes_with_offset(&[0u8], 1, Some(usize::MAX)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Range);
    let bits = Bits::from_bytes_with_offset(&[0xA5, 0x0F], 4, None).unwrap();
    assert_eq!(bits.to_hex().unwrap(), "50f");
}
