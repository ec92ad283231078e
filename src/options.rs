//! Library-wide settings read when a [`crate::Register`] is populated.

use crate::mxfp::MxfpOverflow;

/// Options for building the built-in dtype registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Options {
    /// Overflow policy of the `e4m3mxfp` and `e5m2mxfp` families.
    pub mxfp_overflow: MxfpOverflow,
}

impl Options {
    pub fn with_mxfp_overflow(mut self, policy: MxfpOverflow) -> Self {
        self.mxfp_overflow = policy;
        self
    }
}

#[cfg(feature = "serde")]
impl From<crate::serde::OptionsDef> for Options {
    fn from(value: crate::serde::OptionsDef) -> Self {
        Options::default().with_mxfp_overflow(match value.mxfp_overflow {
            crate::serde::MxfpOverflowDef::Saturate => MxfpOverflow::Saturate,
            crate::serde::MxfpOverflowDef::Overflow => MxfpOverflow::Overflow,
        })
    }
}
