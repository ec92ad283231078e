//! # bitshape
//!
//! Bit-precise construction, interpretation and editing of binary data.
//!
//! [`Bits`] is an immutable, cheaply cloned sequence of bits and [`BitArray`] is its
//! mutable counterpart. Values are encoded and decoded through named dtypes
//! (`uint12`, `floatle32`, `se`, `e4m3mxfp`...) held in a [`Register`], and whole
//! layouts are described by comma-separated format strings.
//!
//! ## Example
//!
//! ```
//! use bitshape::{BitArray, Bits, Value};
//!
//! let header = Bits::pack(
//!     "uint4, int4, hex8",
//!     &[Value::from(3u8), Value::from(-2i8), Value::from("a5")],
//! )
//! .unwrap();
//! assert_eq!(header.to_hex().unwrap(), "3ea5");
//!
//! let values = header.unpack("uint4, int4, hex").unwrap();
//! assert_eq!(values, vec![Value::UInt(3), Value::Int(-2), Value::from("a5")]);
//!
//! let mut edit = BitArray::from(&header);
//! edit.byteswap(2usize, None, None, true).unwrap();
//! assert_eq!(edit.to_hex().unwrap(), "a53e");
//! ```

pub mod bitarray;
pub mod bits;
pub mod bitstring;
mod codecs;
pub mod dtypes;
pub mod errors;
pub mod float16;
pub mod format;
pub mod fp8;
pub mod minifloat;
pub mod mxfp;
pub mod options;
#[cfg(feature = "serde")]
pub mod serde;
pub mod store;
pub mod value;

pub use bitarray::{BitArray, ByteswapFormat};
pub use bitstring::{Bits, Kwargs};
pub use dtypes::{Dtype, DtypeTraits, LengthKind, MetaDtype, Register};
pub use errors::{Error, ErrorKind, Result};
pub use format::{ParsedFormat, Token, TokenLength, expand_brackets, structparser, tokenparser};
pub use fp8::Binary8Format;
pub use mxfp::{MxfpFormat, MxfpOverflow};
pub use options::Options;
pub use store::BitStore;
pub use value::Value;
