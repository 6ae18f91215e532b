// Copyright 2026 the Execution Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Text codecs used by the string opcodes.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

/// A supported byte encoding for text.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Encoding {
    /// 7-bit ASCII.
    Ascii,
    /// ISO-8859-1; every code point below 256 maps to one byte.
    Latin1,
    /// UTF-8.
    Utf8,
}

impl Encoding {
    /// Looks up an encoding by one of its common names, ignoring case, `-` and `_`.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let mut key = [0_u8; 16];
        let mut len = 0;
        for b in name.bytes().filter(|b| *b != b'-' && *b != b'_') {
            if len == key.len() {
                return None;
            }
            key[len] = b.to_ascii_lowercase();
            len += 1;
        }
        match &key[..len] {
            b"ascii" | b"usascii" => Some(Self::Ascii),
            b"latin1" | b"latin" | b"iso88591" | b"l1" => Some(Self::Latin1),
            b"utf8" | b"u8" => Some(Self::Utf8),
            _ => None,
        }
    }

    /// Returns the canonical name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Ascii => "ascii",
            Self::Latin1 => "latin-1",
            Self::Utf8 => "utf-8",
        }
    }
}

/// A character that the target encoding cannot represent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodeError {
    /// Encoding that was requested.
    pub encoding: Encoding,
    /// Offending character.
    pub ch: char,
    /// Character index in the input.
    pub position: usize,
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} codec can't encode character {:?} in position {}",
            self.encoding.name(),
            self.ch,
            self.position
        )
    }
}

impl core::error::Error for EncodeError {}

/// Encodes `text`, failing on the first unrepresentable character.
pub fn encode(text: &str, encoding: Encoding) -> Result<Vec<u8>, EncodeError> {
    let limit = match encoding {
        Encoding::Utf8 => return Ok(text.as_bytes().to_vec()),
        Encoding::Ascii => 0x80,
        Encoding::Latin1 => 0x100,
    };
    let mut out = Vec::with_capacity(text.len());
    for (position, ch) in text.chars().enumerate() {
        let code = u32::from(ch);
        match u8::try_from(code) {
            Ok(byte) if code < limit => out.push(byte),
            _ => {
                return Err(EncodeError {
                    encoding,
                    ch,
                    position,
                });
            }
        }
    }
    Ok(out)
}

/// Decodes `bytes`, returning `None` if they are invalid in `encoding`.
#[must_use]
pub fn decode(bytes: &[u8], encoding: Encoding) -> Option<String> {
    match encoding {
        Encoding::Utf8 => core::str::from_utf8(bytes).ok().map(String::from),
        Encoding::Ascii => bytes
            .is_ascii()
            .then(|| bytes.iter().map(|&b| char::from(b)).collect()),
        Encoding::Latin1 => Some(bytes.iter().map(|&b| char::from(b)).collect()),
    }
}

/// Malformed escape sequence in [`escape_decode`] input.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct EscapeError {
    /// Byte offset of the backslash that starts the bad sequence.
    pub offset: usize,
}

impl fmt::Display for EscapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid \\x escape at position {}", self.offset)
    }
}

impl core::error::Error for EscapeError {}

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Decodes backslash escapes in a byte-string literal body.
///
/// Unknown escapes are kept verbatim, octal escapes take up to three digits, and `\x` requires
/// exactly two hex digits.
pub fn escape_decode(bytes: &[u8]) -> Result<Vec<u8>, EscapeError> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b != b'\\' {
            out.push(b);
            i += 1;
            continue;
        }
        let start = i;
        i += 1;
        let Some(&esc) = bytes.get(i) else {
            return Err(EscapeError { offset: start });
        };
        i += 1;
        match esc {
            b'\n' => {}
            b'\\' => out.push(b'\\'),
            b'\'' => out.push(b'\''),
            b'"' => out.push(b'"'),
            b'a' => out.push(0x07),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0c),
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'v' => out.push(0x0b),
            b'0'..=b'7' => {
                let mut value = u32::from(esc - b'0');
                for _ in 0..2 {
                    match bytes.get(i) {
                        Some(&d @ b'0'..=b'7') => {
                            value = value * 8 + u32::from(d - b'0');
                            i += 1;
                        }
                        _ => break,
                    }
                }
                out.push(value.to_le_bytes()[0]);
            }
            b'x' => {
                let hi = bytes.get(i).copied().and_then(hex_val);
                let lo = bytes.get(i + 1).copied().and_then(hex_val);
                let (Some(hi), Some(lo)) = (hi, lo) else {
                    return Err(EscapeError { offset: start });
                };
                out.push((hi << 4) | lo);
                i += 2;
            }
            other => {
                out.push(b'\\');
                out.push(other);
            }
        }
    }
    Ok(out)
}

/// Encodes `text` with the raw-unicode-escape codec.
///
/// Code points below 256 are written as single bytes; everything else becomes `\uXXXX` or
/// `\UXXXXXXXX`.
pub fn raw_unicode_escape_encode(text: &str, out: &mut Vec<u8>) {
    for ch in text.chars() {
        push_raw_unicode_escape(ch, out);
    }
}

pub(crate) fn push_raw_unicode_escape(ch: char, out: &mut Vec<u8>) {
    use core::fmt::Write as _;
    let code = u32::from(ch);
    if let Ok(byte) = u8::try_from(code) {
        out.push(byte);
        return;
    }
    let mut buf = String::new();
    // Writing into a String cannot fail.
    let _ = if code < 0x1_0000 {
        write!(buf, "\\u{code:04x}")
    } else {
        write!(buf, "\\U{code:08x}")
    };
    out.extend_from_slice(buf.as_bytes());
}

/// Decodes raw-unicode-escape bytes; `None` on a malformed or out-of-range escape.
#[must_use]
pub fn raw_unicode_escape_decode(bytes: &[u8]) -> Option<String> {
    let mut out = String::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'\\' {
            out.push(char::from(bytes[i]));
            i += 1;
            continue;
        }
        let run_start = i;
        while i < bytes.len() && bytes[i] == b'\\' {
            i += 1;
        }
        let run = i - run_start;
        let digits = match bytes.get(i) {
            Some(b'u') if run % 2 == 1 => 4,
            Some(b'U') if run % 2 == 1 => 8,
            _ => {
                out.extend(core::iter::repeat_n('\\', run));
                continue;
            }
        };
        out.extend(core::iter::repeat_n('\\', run - 1));
        let hex = bytes.get(i + 1..i + 1 + digits)?;
        let mut code = 0_u32;
        for &h in hex {
            code = code * 16 + u32::from(hex_val(h)?);
        }
        out.push(char::from_u32(code)?);
        i += 1 + digits;
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding_names() {
        assert_eq!(Encoding::from_name("ASCII"), Some(Encoding::Ascii));
        assert_eq!(Encoding::from_name("latin-1"), Some(Encoding::Latin1));
        assert_eq!(Encoding::from_name("ISO-8859-1"), Some(Encoding::Latin1));
        assert_eq!(Encoding::from_name("utf_8"), Some(Encoding::Utf8));
        assert_eq!(Encoding::from_name("koi8-r"), None);
        assert_eq!(Encoding::from_name("a-very-long-unknown-codec-name"), None);
    }

    #[test]
    fn strict_encoding() {
        assert_eq!(encode("abc", Encoding::Ascii).unwrap(), b"abc");
        assert_eq!(encode("é", Encoding::Latin1).unwrap(), [0xe9]);
        assert_eq!(encode("é", Encoding::Utf8).unwrap(), [0xc3, 0xa9]);
        let err = encode("aé", Encoding::Ascii).unwrap_err();
        assert_eq!(err.ch, 'é');
        assert_eq!(err.position, 1);
        assert!(encode("€", Encoding::Latin1).is_err());
    }

    #[test]
    fn decoding() {
        assert_eq!(decode(&[0xe9], Encoding::Latin1).as_deref(), Some("é"));
        assert_eq!(decode(&[0xe9], Encoding::Ascii), None);
        assert_eq!(decode(&[0xe9], Encoding::Utf8), None);
    }

    #[test]
    fn escapes() {
        assert_eq!(escape_decode(br"a\nb").unwrap(), b"a\nb");
        assert_eq!(escape_decode(br"\x41\101\0").unwrap(), b"AA\0");
        assert_eq!(escape_decode(br"\'\q").unwrap(), b"'\\q");
        assert_eq!(escape_decode(b"line\\\ncont").unwrap(), b"linecont");
        assert_eq!(escape_decode(br"\x4").unwrap_err().offset, 0);
        assert!(escape_decode(b"trailing\\").is_err());
    }

    #[test]
    fn raw_unicode_escape() {
        let mut out = alloc::vec::Vec::new();
        raw_unicode_escape_encode("aé€\u{1f600}", &mut out);
        assert_eq!(out, b"a\xe9\\u20ac\\U0001f600");
        assert_eq!(
            raw_unicode_escape_decode(&out).as_deref(),
            Some("aé€\u{1f600}")
        );
        assert_eq!(raw_unicode_escape_decode(br"\\u0041").as_deref(), Some(r"\\u0041"));
        assert_eq!(raw_unicode_escape_decode(br"\\A").as_deref(), Some(r"\\A"));
        assert_eq!(raw_unicode_escape_decode(br"\u12"), None);
        assert_eq!(raw_unicode_escape_decode(br"\UFFFFFFFF"), None);
    }
}
