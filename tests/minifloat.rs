//! Exact code points of the 8-bit and MX micro-float formats.

use bitshape::{
    Bits, Value,
    fp8::{P3BINARY8, P4BINARY8},
    mxfp::{E2M1, E2M3, E3M2, E4M3_SATURATE, E5M2_OVERFLOW, E5M2_SATURATE},
};
use rstest::rstest;

#[rstest]
#[case("p4binary", 1.0, 0x40)]
#[case("p4binary", 2.0, 0x48)]
#[case("p4binary", 0.5, 0x38)]
#[case("p4binary", -1.0, 0xC0)]
#[case("p3binary", 1.0, 0x40)]
#[case("p3binary", 2.0, 0x44)]
#[case("p3binary", 0.5, 0x3C)]
#[case("e4m3mxfp", 1.0, 0x38)]
#[case("e4m3mxfp", 448.0, 0x7E)]
#[case("e4m3mxfp", 0.001953125, 0x01)]
#[case("e5m2mxfp", 1.0, 0x3C)]
#[case("e5m2mxfp", 57344.0, 0x7B)]
#[case("e5m2mxfp", -2.0, 0xC0)]
fn test_byte_formats(#[case] key: &str, #[case] value: f64, #[case] code: u8) {
    let bits = Bits::from_dtype(key, value).unwrap();
    assert_eq!(bits.to_bytes(), vec![code]);
    assert_eq!(bits.interpret(key).unwrap(), Value::Float(value));
}

#[rstest]
#[case("e3m2mxfp", 1.0, "001100")]
#[case("e3m2mxfp", 28.0, "011111")]
#[case("e3m2mxfp", 0.0625, "000001")]
#[case("e2m3mxfp", 1.0, "001000")]
#[case("e2m3mxfp", 7.5, "011111")]
#[case("e2m3mxfp", 0.125, "000001")]
#[case("e2m1mxfp", 0.5, "0001")]
#[case("e2m1mxfp", 3.0, "0101")]
#[case("e2m1mxfp", -6.0, "1111")]
fn test_narrow_formats(#[case] key: &str, #[case] value: f64, #[case] bin: &str) {
    let bits = Bits::from_dtype(key, value).unwrap();
    assert_eq!(bits.to_bin(), bin);
    assert_eq!(bits.interpret(key).unwrap(), Value::Float(value));
}

#[rstest]
#[case(1.1, 1.0)]
#[case(1.3, 1.5)]
#[case(5.0, 4.0)]
#[case(100.0, 6.0)]
#[case(-100.0, -6.0)]
fn test_e2m1_rounds_to_nearest(#[case] value: f64, #[case] expected: f64) {
    assert_eq!(E2M1.decode(E2M1.encode(value)), expected);
}

#[test]
fn test_power_of_two_boundaries() {
    for e in -6..=8 {
        let f = 2f64.powi(e);
        assert_eq!(E4M3_SATURATE.decode(E4M3_SATURATE.encode(f)), f, "e4m3 2^{e}");
    }
    for e in -14..=15 {
        let f = 2f64.powi(e);
        assert_eq!(E5M2_SATURATE.decode(E5M2_SATURATE.encode(f)), f, "e5m2 2^{e}");
    }
    for e in -7..=6 {
        let f = 2f64.powi(e);
        assert_eq!(P4BINARY8.decode(P4BINARY8.encode(f)), f, "p4 2^{e}");
    }
    for e in -15..=14 {
        let f = 2f64.powi(e);
        assert_eq!(P3BINARY8.decode(P3BINARY8.encode(f)), f, "p3 2^{e}");
    }
    assert_eq!(E3M2.decode(E3M2.encode(16.0)), 16.0);
    assert_eq!(E2M3.decode(E2M3.encode(4.0)), 4.0);
}

#[test]
fn test_overflow_policy() {
    assert_eq!(E5M2_SATURATE.encode(f64::INFINITY), 0x7B);
    assert_eq!(E5M2_OVERFLOW.encode(f64::INFINITY), 0x7C);
    assert!(E5M2_OVERFLOW.decode(0x7C).is_infinite());
    assert_eq!(E5M2_OVERFLOW.encode(E5M2_OVERFLOW.decode(0xFC)), 0xFC);
    assert!(E4M3_SATURATE.decode(0x7F).is_nan());
}

#[test]
fn test_lookup_tables_match_direct_decode() {
    let table = P4BINARY8.decode_table();
    assert_eq!(table.len(), 256);
    for code in [0x00u8, 0x01, 0x40, 0x77, 0xC0] {
        assert_eq!(table[code as usize] as f64, P4BINARY8.decode(code));
    }
    assert_eq!(E2M1.decode_table().len(), 16);
}

/// Every finite code decodes to a value that encodes back to the same code. Negative
/// zero is skipped since zero always encodes as the all-zeros code.
#[rstest]
#[case("p4binary", 8)]
#[case("p3binary", 8)]
#[case("e4m3mxfp", 8)]
#[case("e5m2mxfp", 8)]
#[case("e3m2mxfp", 6)]
#[case("e2m3mxfp", 6)]
#[case("e2m1mxfp", 4)]
fn test_every_finite_code_round_trips(#[case] key: &str, #[case] width: usize) {
    let mut checked = 0;
    for code in 0..1u128 << width {
        let bits = Bits::from_dtype(&format!("uint{width}"), code).unwrap();
        let Value::Float(value) = bits.interpret(key).unwrap() else {
            panic!("{key} didn't decode to a float");
        };
        if !value.is_finite() || (value == 0.0 && code != 0) {
            continue;
        }
        assert_eq!(
            Bits::from_dtype(key, value).unwrap().to_bin(),
            bits.to_bin(),
            "{key} code {code:#x} ({value})"
        );
        checked += 1;
    }
    assert!(checked > (1 << width) / 2);
}

#[rstest]
#[case(1.0f32, 0x3F80)]
#[case(-2.5f32, 0xC020)]
#[case(std::f32::consts::PI, 0x4049)]
#[case(f32::MAX, 0x7F7F)]
#[case(f32::MIN_POSITIVE, 0x0080)]
#[case(1.0f32 + f32::EPSILON, 0x3F80)]
#[case(f32::INFINITY, 0x7F80)]
fn test_bfloat_keeps_high_half(#[case] value: f32, #[case] high: u16) {
    assert_eq!(value.to_bits() >> 16, high as u32);
    let bits = Bits::from_dtype("bfloat", value).unwrap();
    assert_eq!(bits.to_bytes(), high.to_be_bytes());
    let truncated = f32::from_bits((high as u32) << 16) as f64;
    assert_eq!(bits.interpret("bfloat").unwrap(), Value::Float(truncated));
}
