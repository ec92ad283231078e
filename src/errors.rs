//! Error types for bit storage, dtype resolution, format parsing and editing.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors produced when reading raw bits out of a byte buffer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadError {
    /// Requested bit range is beyond the end of the data.
    #[error("bit range out of bounds")]
    OutOfBounds,
    /// More than 128 bits were requested in a single read.
    #[error("too many bits requested in a single read")]
    TooManyBitsRead,
}

/// A bit pattern could not be interpreted as the requested type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InterpretError {
    /// The length is not valid for this interpretation (e.g. a 12-bit `float`).
    #[error("{dtype} can't be interpreted from {length} bits: {reason}")]
    InvalidLength {
        dtype: String,
        length: usize,
        reason: &'static str,
    },
    /// Not enough bits remain after `pos` to read the value.
    #[error("not enough bits to read {dtype} at position {pos}")]
    NotEnoughBits { dtype: String, pos: usize },
    /// A self-delimiting code ran off the end of the data.
    #[error("{0} code is not terminated before the end of the data")]
    Unterminated(String),
    /// The bits decoded but the result is not representable (e.g. invalid UTF-8).
    #[error("{0}")]
    Invalid(String),
}

/// Errors produced by the format-string tokenizer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    /// A token does not match any of the token forms.
    #[error("can't parse token '{0}'")]
    InvalidToken(String),
    /// The multiplicative factor before '*' is not a non-negative integer.
    #[error("invalid repeat factor '{0}'")]
    InvalidFactor(String),
    /// An explicit length is not a non-negative integer.
    #[error("invalid length '{0}'")]
    InvalidLength(String),
    /// Parentheses don't pair up.
    #[error("unbalanced brackets in '{0}'")]
    UnbalancedBrackets(String),
    /// A struct-style format code string is malformed.
    #[error("invalid struct format '{0}'")]
    InvalidStructFormat(String),
}

/// Semantic class of an [`Error`], independent of the exact variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Position or slice outside valid bounds.
    Range,
    /// Single bit index outside `[-len, len)`.
    Index,
    /// Configuration or argument error (unknown dtype, negative amount, bad format...).
    Value,
    /// A bit pattern can't be interpreted as the requested type.
    Interpret,
    /// A value can't be encoded into bits as requested.
    Creation,
}

/// Crate error type.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("position {pos} is out of range for a bitstring of length {len}")]
    PositionOutOfRange { pos: isize, len: usize },
    #[error("invalid range [{start}, {end}) for a bitstring of length {len}")]
    InvalidRange { start: isize, end: isize, len: usize },
    #[error("bit index {index} is out of range for a bitstring of length {len}")]
    IndexOutOfRange { index: isize, len: usize },
    #[error("can't {op} by a negative amount ({amount})")]
    NegativeAmount { op: &'static str, amount: isize },
    #[error("can't {0} an empty bitstring")]
    EmptyBitstring(&'static str),
    #[error("can't search for or replace an empty bitstring")]
    EmptyPattern,
    #[error("bitstrings must have the same length ({left} != {right})")]
    LengthMismatch { left: usize, right: usize },
    #[error("unknown dtype name '{0}'")]
    UnknownDtype(String),
    #[error("invalid length {length:?} for dtype '{name}': {reason}")]
    InvalidDtypeLength {
        name: String,
        length: Option<usize>,
        reason: &'static str,
    },
    /// The registry self-check rejected a dtype.
    #[error("invalid dtype '{name}': {source}")]
    InvalidDtype {
        name: String,
        #[source]
        source: InterpretError,
    },
    #[error("invalid meta dtype '{name}': {reason}")]
    InvalidMetaDtype { name: String, reason: &'static str },
    #[error("invalid format: {0}")]
    Format(#[from] FormatError),
    #[error("{0}")]
    InvalidArgument(String),
    #[error(transparent)]
    Interpret(#[from] InterpretError),
    #[error("can't create bits: {0}")]
    Creation(String),
    #[error(transparent)]
    Read(#[from] ReadError),
}

impl Error {
    /// Returns the semantic class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::PositionOutOfRange { .. } | Error::InvalidRange { .. } | Error::Read(_) => {
                ErrorKind::Range
            }
            Error::IndexOutOfRange { .. } => ErrorKind::Index,
            Error::Interpret(_) => ErrorKind::Interpret,
            Error::Creation(_) => ErrorKind::Creation,
            Error::NegativeAmount { .. }
            | Error::EmptyBitstring(_)
            | Error::EmptyPattern
            | Error::LengthMismatch { .. }
            | Error::UnknownDtype(_)
            | Error::InvalidDtypeLength { .. }
            | Error::InvalidDtype { .. }
            | Error::InvalidMetaDtype { .. }
            | Error::Format(_)
            | Error::InvalidArgument(_) => ErrorKind::Value,
        }
    }

    pub(crate) fn creation(msg: impl Into<String>) -> Self {
        Error::Creation(msg.into())
    }
}
