// Copyright 2026 the Execution Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Resource bounds and decoder text options.

/// Resource bounds applied while encoding or decoding.
///
/// The defaults accept anything a conforming encoder produces except absurdly deep nesting.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Limits {
    /// Maximum container nesting while encoding.
    pub max_depth: usize,
    /// Maximum operand-stack height while decoding.
    pub max_stack: usize,
    /// Maximum number of memo entries while decoding.
    pub max_memo: usize,
    /// Maximum frame payload and length-prefixed argument size while decoding.
    pub max_frame_len: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_depth: 256,
            max_stack: usize::MAX,
            max_memo: usize::MAX,
            max_frame_len: u64::MAX,
        }
    }
}

/// How protocol 0-2 byte strings (`STRING`, `BINSTRING`, `SHORT_BINSTRING`) are decoded.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum StringEncoding {
    /// Decode as ASCII text.
    #[default]
    Ascii,
    /// Decode as Latin-1 text; never fails.
    Latin1,
    /// Decode as UTF-8 text.
    Utf8,
    /// Keep the raw bytes as [`Value::Bytes`](crate::Value::Bytes).
    Bytes,
}

impl StringEncoding {
    pub(crate) fn text(self) -> Option<crate::text::Encoding> {
        match self {
            Self::Ascii => Some(crate::text::Encoding::Ascii),
            Self::Latin1 => Some(crate::text::Encoding::Latin1),
            Self::Utf8 => Some(crate::text::Encoding::Utf8),
            Self::Bytes => None,
        }
    }
}
