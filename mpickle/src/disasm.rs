// Copyright 2026 the Execution Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Opcode-stream listing for debugging and tests.
//!
//! Frames are listed as ordinary instructions; nothing is executed.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::{self, Write as _};

use num_bigint::BigInt;

use crate::error::{PickleError, UnpicklingError};
use crate::format::long::{decode_long, read_long_i64};
use crate::opcode::{ArgKind, Opcode};
use crate::text;

/// A decoded inline argument.
#[derive(Clone, Debug, PartialEq)]
pub enum Arg {
    /// The opcode takes no argument.
    None,
    /// A signed integer argument.
    Int(i64),
    /// An unsigned integer argument (lengths, memo ids, extension codes).
    Uint(u64),
    /// A `LONG1`/`LONG4` integer too wide for `i64`.
    Long(BigInt),
    /// A binary float.
    Float(f64),
    /// A text argument (line arguments and unicode payloads).
    Text(String),
    /// A `module`/`name` pair from `GLOBAL`/`INST`.
    Global {
        /// Module line.
        module: String,
        /// Name line.
        name: String,
    },
    /// A raw byte payload.
    Bytes(Vec<u8>),
}

/// One decoded instruction.
#[derive(Clone, Debug, PartialEq)]
pub struct Instr {
    /// Offset of the opcode byte.
    pub offset: u64,
    /// The opcode.
    pub opcode: Opcode,
    /// Its inline argument.
    pub arg: Arg,
}

/// Decodes `data` up to and including the first `STOP`.
///
/// Bytes after `STOP` are ignored. Input that ends before `STOP` is [`PickleError::Eof`].
pub fn disassemble(data: &[u8]) -> Result<Vec<Instr>, PickleError> {
    let mut cursor = Cursor { data, pos: 0 };
    let mut out = Vec::new();
    loop {
        let offset = cursor.pos as u64;
        let Some(byte) = cursor.next() else {
            return Err(PickleError::Eof);
        };
        let opcode = Opcode::from_u8(byte).ok_or(UnpicklingError::UnknownOpcode { byte, offset })?;
        let arg = cursor.arg(opcode)?;
        out.push(Instr {
            offset,
            opcode,
            arg,
        });
        if opcode == Opcode::Stop {
            return Ok(out);
        }
    }
}

/// Renders a listing, one instruction per line.
#[must_use]
pub fn render(instrs: &[Instr]) -> String {
    let mut out = String::new();
    for instr in instrs {
        // Writing to a `String` cannot fail.
        let _ = writeln!(out, "{instr}");
    }
    out
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn next(&mut self) -> Option<u8> {
        let b = *self.data.get(self.pos)?;
        self.pos += 1;
        Some(b)
    }

    fn take(&mut self, n: u64, op: Opcode) -> Result<&'a [u8], UnpicklingError> {
        let truncated = UnpicklingError::Truncated { opcode: op };
        let n = usize::try_from(n).map_err(|_| truncated.clone())?;
        let end = self.pos.checked_add(n).ok_or(truncated.clone())?;
        let bytes = self.data.get(self.pos..end).ok_or(truncated)?;
        self.pos = end;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self, op: Opcode) -> Result<[u8; N], UnpicklingError> {
        let mut out = [0_u8; N];
        out.copy_from_slice(self.take(N as u64, op)?);
        Ok(out)
    }

    fn line(&mut self, op: Opcode) -> Result<&'a [u8], UnpicklingError> {
        let rest = self.data.get(self.pos..).unwrap_or_default();
        let end = rest
            .iter()
            .position(|&b| b == b'\n')
            .ok_or(UnpicklingError::Truncated { opcode: op })?;
        self.pos += end + 1;
        Ok(&rest[..end])
    }

    fn arg(&mut self, op: Opcode) -> Result<Arg, UnpicklingError> {
        Ok(match op.arg_kind() {
            ArgKind::None => Arg::None,
            ArgKind::U8 => Arg::Uint(self.array::<1>(op)?[0].into()),
            ArgKind::U16 => Arg::Uint(u16::from_le_bytes(self.array(op)?).into()),
            ArgKind::I32 => Arg::Int(i32::from_le_bytes(self.array(op)?).into()),
            ArgKind::U32 => Arg::Uint(u32::from_le_bytes(self.array(op)?).into()),
            ArgKind::U64 => Arg::Uint(u64::from_le_bytes(self.array(op)?)),
            ArgKind::F64 => Arg::Float(f64::from_be_bytes(self.array(op)?)),
            ArgKind::Line => {
                let line = self.line(op)?;
                let text = match op {
                    Opcode::Unicode => text::raw_unicode_escape_decode(line),
                    _ => None,
                };
                Arg::Text(text.unwrap_or_else(|| String::from_utf8_lossy(line).into_owned()))
            }
            ArgKind::TwoLines => {
                let module = String::from_utf8_lossy(self.line(op)?).into_owned();
                let name = String::from_utf8_lossy(self.line(op)?).into_owned();
                Arg::Global { module, name }
            }
            ArgKind::Bytes1 => {
                let [n] = self.array(op)?;
                self.payload(n.into(), op)?
            }
            ArgKind::Bytes4 => {
                let n = u32::from_le_bytes(self.array(op)?);
                self.payload(n.into(), op)?
            }
            ArgKind::SignedBytes4 => {
                let n = i32::from_le_bytes(self.array(op)?);
                let n = u64::try_from(n).map_err(|_| UnpicklingError::NegativeLength { opcode: op })?;
                self.payload(n, op)?
            }
            ArgKind::Bytes8 => {
                let n = u64::from_le_bytes(self.array(op)?);
                self.payload(n, op)?
            }
        })
    }

    fn payload(&mut self, n: u64, op: Opcode) -> Result<Arg, UnpicklingError> {
        let bytes = self.take(n, op)?;
        Ok(match op {
            Opcode::Long1 | Opcode::Long4 => match read_long_i64(bytes) {
                Some(i) => Arg::Int(i),
                None => Arg::Long(decode_long(bytes)),
            },
            Opcode::ShortBinUnicode | Opcode::BinUnicode | Opcode::BinUnicode8 => {
                Arg::Text(String::from_utf8_lossy(bytes).into_owned())
            }
            _ => Arg::Bytes(bytes.to_vec()),
        })
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => Ok(()),
            Self::Int(i) => write!(f, "{i}"),
            Self::Uint(u) => write!(f, "{u}"),
            Self::Long(b) => write!(f, "{b}"),
            Self::Float(x) => write!(f, "{x:?}"),
            Self::Text(s) => write!(f, "{s:?}"),
            Self::Global { module, name } => write!(f, "'{module} {name}'"),
            Self::Bytes(b) => {
                f.write_str("b'")?;
                for &byte in b {
                    match byte {
                        b'\\' | b'\'' => write!(f, "\\{}", char::from(byte))?,
                        0x20..=0x7e => f.write_char(char::from(byte))?,
                        _ => write!(f, "\\x{byte:02x}")?,
                    }
                }
                f.write_char('\'')
            }
        }
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let byte = self.opcode.byte();
        write!(f, "{:>5}: ", self.offset)?;
        if byte.is_ascii_graphic() {
            write!(f, "{:<4} ", char::from(byte))?;
        } else {
            write!(f, "\\x{byte:02x} ")?;
        }
        if matches!(self.arg, Arg::None) {
            f.write_str(self.opcode.name())
        } else {
            write!(f, "{:<16} {}", self.opcode.name(), self.arg)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn lists_framed_stream() {
        let data = b"\x80\x04\x95\x05\0\0\0\0\0\0\0\x8c\x02hi\x94.";
        let instrs = disassemble(data).unwrap();
        let ops: Vec<_> = instrs.iter().map(|i| i.opcode).collect();
        assert_eq!(
            ops,
            vec![
                Opcode::Proto,
                Opcode::Frame,
                Opcode::ShortBinUnicode,
                Opcode::Memoize,
                Opcode::Stop
            ]
        );
        assert_eq!(instrs[1].arg, Arg::Uint(5));
        assert_eq!(instrs[2].offset, 11);
        assert_eq!(instrs[2].arg, Arg::Text("hi".into()));
    }

    #[test]
    fn text_arguments() {
        let instrs = disassemble(b"ccollections\nOrderedDict\n(I12\nVa\\u00e9\nt.").unwrap();
        assert_eq!(
            instrs[0].arg,
            Arg::Global {
                module: "collections".into(),
                name: "OrderedDict".into()
            }
        );
        assert_eq!(instrs[2].arg, Arg::Text("12".into()));
        assert_eq!(instrs[3].arg, Arg::Text("a\u{e9}".into()));
    }

    #[test]
    fn longs_and_bytes() {
        let instrs = disassemble(b"\x80\x03\x8a\x02\x00\x80C\x02a\x00\x86.").unwrap();
        assert_eq!(instrs[1].arg, Arg::Int(-32768));
        assert_eq!(instrs[2].arg, Arg::Bytes(vec![b'a', 0]));
    }

    #[test]
    fn malformed_streams() {
        assert_eq!(disassemble(b""), Err(PickleError::Eof));
        assert_eq!(disassemble(b"N"), Err(PickleError::Eof));
        assert_eq!(
            disassemble(b"\xff"),
            Err(PickleError::Unpickling(UnpicklingError::UnknownOpcode {
                byte: 0xff,
                offset: 0
            }))
        );
        assert_eq!(
            disassemble(b"X\x05\0\0\0ab"),
            Err(PickleError::Unpickling(UnpicklingError::Truncated {
                opcode: Opcode::BinUnicode
            }))
        );
    }

    #[test]
    fn listing() {
        let instrs = disassemble(b"\x80\x02K\x07.").unwrap();
        let text = render(&instrs);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "    0: \\x80 PROTO            2");
        assert_eq!(lines[1], "    2: K    BININT1          7");
        assert_eq!(lines[2], "    4: .    STOP");
    }
}
