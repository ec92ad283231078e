//! JSON-deserializable descriptions of formats and registry options.
//!
//! A layout can be shipped as data instead of as a format string: deserialize a
//! [`FormatDef`], convert it into a [`crate::format::ParsedFormat`] and use its
//! `Display` rendering wherever a format string is accepted.

use serde::{Deserialize, Serialize};

/// Overflow policy of the wide MX element formats.
#[derive(Debug, Deserialize, Serialize, Default, Clone, Copy)]
pub enum MxfpOverflowDef {
    #[default]
    /// Clamp to the largest finite value.
    Saturate,
    /// Produce the format's overflow code.
    Overflow,
}

/// Settings used when populating a registry.
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct OptionsDef {
    #[serde(default)]
    pub mxfp_overflow: MxfpOverflowDef,
}

/// Length of a token: a bit count or the name of a keyword argument.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(untagged)]
pub enum TokenLengthDef {
    Bits(usize),
    Keyword(String),
}

/// One element of a layout.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TokenDef {
    /// Family name, `bits`, `pad`, or a literal marker (`0x`, `0o`, `0b`).
    pub name: String,
    #[serde(default)]
    pub length: Option<TokenLengthDef>,
    /// Initializer, or the digits of a literal.
    #[serde(default)]
    pub value: Option<String>,
}

/// A whole layout, in order.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FormatDef {
    pub tokens: Vec<TokenDef>,
    /// Whether the layout takes whatever bits remain after its tokens.
    #[serde(default)]
    pub stretchy: bool,
}
