// Copyright 2026 the Execution Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error taxonomy for encoding and decoding.
//!
//! Every failure surfaces as a [`PickleError`]. Encode-side failures carry a [`PicklingError`],
//! decode-side failures an [`UnpicklingError`]; running out of input before an opcode byte could
//! be read is reported separately as [`PickleError::Eof`] so streaming callers can tell
//! "incomplete" apart from "corrupt".

use alloc::boxed::Box;
use alloc::string::String;
use core::fmt;

use crate::opcode::Opcode;

/// Root error type for the codec.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PickleError {
    /// Encoding failed.
    Pickling(PicklingError),
    /// Decoding failed on invalid input.
    Unpickling(UnpicklingError),
    /// The byte source was exhausted where an opcode was expected.
    Eof,
    /// A protocol outside `0..=HIGHEST_PROTOCOL` was requested.
    InvalidProtocol {
        /// The rejected protocol number.
        protocol: i32,
    },
    /// The caller-supplied source or sink failed.
    Io(IoError),
}

impl fmt::Display for PickleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pickling(e) => write!(f, "pickling error: {e}"),
            Self::Unpickling(e) => write!(f, "unpickling error: {e}"),
            Self::Eof => write!(f, "ran out of input"),
            Self::InvalidProtocol { protocol } => {
                write!(
                    f,
                    "pickle protocol must be <= {}, got {protocol}",
                    crate::format::HIGHEST_PROTOCOL
                )
            }
            Self::Io(e) => write!(f, "i/o error: {e}"),
        }
    }
}

impl core::error::Error for PickleError {}

impl From<PicklingError> for PickleError {
    fn from(e: PicklingError) -> Self {
        Self::Pickling(e)
    }
}

impl From<UnpicklingError> for PickleError {
    fn from(e: UnpicklingError) -> Self {
        Self::Unpickling(e)
    }
}

impl From<IoError> for PickleError {
    fn from(e: IoError) -> Self {
        Self::Io(e)
    }
}

/// Encode-side failures.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PicklingError {
    /// The value has neither a reduce hook nor a registry entry.
    Unsupported {
        /// Type name of the value.
        type_name: Box<str>,
    },
    /// A reduction record did not have 2 through 6 elements.
    BadReductionArity {
        /// Number of elements found.
        len: usize,
    },
    /// A reduction record was not a tuple at all.
    ReductionNotTuple,
    /// The constructor-argument slot of a reduction was not a tuple.
    ArgsNotTuple,
    /// The callable slot of a reduction was not a global reference.
    CallableNotGlobal,
    /// A global reference could not be resolved to a qualified name.
    UnresolvableGlobal {
        /// Module the name was looked up in.
        module: Box<str>,
        /// Qualified name within the module.
        qualname: Box<str>,
    },
    /// A global name cannot be written as ASCII for protocols < 3.
    NonAsciiGlobal {
        /// Offending qualified name.
        qualname: Box<str>,
    },
    /// Encoder recursion exceeded [`Limits::max_depth`](crate::Limits::max_depth).
    RecursionLimit,
    /// A `__newobj__`-style reduction had malformed arguments.
    BadNewObjArgs,
    /// Text could not be encoded in the requested codec.
    Encode(crate::text::EncodeError),
    /// Protocol 0 persistent ids must be ASCII text.
    PersistentIdNotAscii,
    /// A reduce hook reported a failure.
    Reduce {
        /// Type name of the value being reduced.
        type_name: Box<str>,
        /// Message from the hook.
        message: Box<str>,
    },
    /// More objects were memoized than a four-byte memo id can name.
    MemoOverflow,
    /// A value is too large for every opcode the protocol offers.
    TooLarge {
        /// Kind of value.
        type_name: &'static str,
    },
}

impl fmt::Display for PicklingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsupported { type_name } => write!(f, "cannot pickle {type_name} object"),
            Self::BadReductionArity { len } => write!(
                f,
                "tuple returned by reduce must contain 2 through 6 elements, got {len}"
            ),
            Self::ReductionNotTuple => write!(f, "reduce must return a tuple"),
            Self::ArgsNotTuple => write!(f, "second item of the reduction must be a tuple"),
            Self::CallableNotGlobal => {
                write!(f, "first item of the reduction must be a global reference")
            }
            Self::UnresolvableGlobal { module, qualname } => {
                write!(f, "cannot pickle {qualname}: it's not found as {module}.{qualname}")
            }
            Self::NonAsciiGlobal { qualname } => {
                write!(f, "cannot pickle {qualname}: name is not ASCII for protocol < 3")
            }
            Self::RecursionLimit => write!(f, "maximum recursion depth exceeded while pickling"),
            Self::BadNewObjArgs => write!(f, "__newobj__ arglist must start with a class"),
            Self::Encode(e) => write!(f, "{e}"),
            Self::PersistentIdNotAscii => {
                write!(f, "persistent ids in protocol 0 must be ASCII strings")
            }
            Self::Reduce { type_name, message } => {
                write!(f, "reducing {type_name} failed: {message}")
            }
            Self::MemoOverflow => write!(f, "memo id exceeds the 4-byte range"),
            Self::TooLarge { type_name } => {
                write!(f, "cannot serialize a {type_name} larger than 4 GiB with this protocol")
            }
        }
    }
}

impl core::error::Error for PicklingError {}

/// Why a global reference failed to resolve.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MissingName {
    /// No module with that path exists.
    Module,
    /// The module exists but lacks the attribute.
    Attribute,
}

/// Decode-side failures.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UnpicklingError {
    /// An opcode byte with no handler.
    UnknownOpcode {
        /// The byte read.
        byte: u8,
        /// Stream offset of the byte.
        offset: u64,
    },
    /// A handler needed more stack items than were present.
    StackUnderflow {
        /// Opcode being executed.
        opcode: Opcode,
    },
    /// A mark-delimited opcode found no mark.
    MarkNotFound {
        /// Opcode being executed.
        opcode: Opcode,
    },
    /// The input ended inside an opcode argument.
    Truncated {
        /// Opcode being executed.
        opcode: Opcode,
    },
    /// A frame ended before the data it promised.
    FrameExhausted,
    /// A new frame started while the previous one still had data.
    FrameOverlap,
    /// A memo get referenced an id that was never stored.
    MissingMemo {
        /// The id requested.
        id: u64,
    },
    /// A global could not be resolved.
    UnresolvedGlobal {
        /// Module path.
        module: Box<str>,
        /// Qualified name.
        qualname: Box<str>,
        /// Which segment was missing.
        missing: MissingName,
    },
    /// The protocol announced by the stream is not supported.
    UnsupportedProtocol {
        /// Protocol byte.
        protocol: u8,
    },
    /// A textual literal could not be parsed.
    BadLiteral {
        /// Opcode being executed.
        opcode: Opcode,
    },
    /// Text was not valid in the declared encoding.
    BadText {
        /// Opcode being executed.
        opcode: Opcode,
    },
    /// A length prefix was negative.
    NegativeLength {
        /// Opcode being executed.
        opcode: Opcode,
    },
    /// An operand had the wrong kind.
    WrongType {
        /// Opcode being executed.
        opcode: Opcode,
        /// What the handler expected.
        expected: &'static str,
    },
    /// A dictionary key or set element was unhashable.
    Unhashable {
        /// Type name of the value.
        type_name: &'static str,
    },
    /// A reconstructor or state setter failed.
    Call {
        /// Name of the callable.
        callable: Box<str>,
        /// Message from the callable.
        message: Box<str>,
    },
    /// The stream uses persistent ids but no loader was configured.
    NoPersistentLoad,
    /// The stream references out-of-band data but no buffer was left to satisfy it.
    NoBuffers,
    /// An extension code has no registration.
    UnregisteredExtension {
        /// The code.
        code: u32,
    },
    /// A configured [`Limits`](crate::Limits) bound was exceeded.
    LimitExceeded {
        /// Name of the limit.
        limit: &'static str,
    },
}

impl fmt::Display for UnpicklingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownOpcode { byte, offset } => {
                write!(f, "invalid load key 0x{byte:02x} at offset {offset}")
            }
            Self::StackUnderflow { opcode } => {
                write!(f, "unpickling stack underflow in {}", opcode.name())
            }
            Self::MarkNotFound { opcode } => {
                write!(f, "could not find MARK for {}", opcode.name())
            }
            Self::Truncated { opcode } => write!(f, "truncated argument for {}", opcode.name()),
            Self::FrameExhausted => write!(f, "pickle exhausted before end of frame"),
            Self::FrameOverlap => {
                write!(f, "beginning of a new frame before end of current frame")
            }
            Self::MissingMemo { id } => write!(f, "memo value not found at index {id}"),
            Self::UnresolvedGlobal {
                module,
                qualname,
                missing,
            } => match missing {
                MissingName::Module => write!(f, "no module named {module} (for {qualname})"),
                MissingName::Attribute => {
                    write!(f, "module {module} has no attribute {qualname}")
                }
            },
            Self::UnsupportedProtocol { protocol } => {
                write!(f, "unsupported pickle protocol: {protocol}")
            }
            Self::BadLiteral { opcode } => write!(f, "malformed literal for {}", opcode.name()),
            Self::BadText { opcode } => write!(f, "undecodable text for {}", opcode.name()),
            Self::NegativeLength { opcode } => {
                write!(f, "negative byte count for {}", opcode.name())
            }
            Self::WrongType { opcode, expected } => {
                write!(f, "{} expected {expected}", opcode.name())
            }
            Self::Unhashable { type_name } => write!(f, "unhashable type: {type_name}"),
            Self::Call { callable, message } => write!(f, "calling {callable} failed: {message}"),
            Self::NoPersistentLoad => write!(
                f,
                "a load persistent id instruction was encountered, but no persistent_load hook was set"
            ),
            Self::NoBuffers => write!(
                f,
                "pickle stream refers to out-of-band data but no buffer is available"
            ),
            Self::UnregisteredExtension { code } => {
                write!(f, "unregistered extension code {code}")
            }
            Self::LimitExceeded { limit } => write!(f, "limit exceeded: {limit}"),
        }
    }
}

impl core::error::Error for UnpicklingError {}

/// A failure reported by a [`Source`](crate::io::Source) or [`Sink`](crate::io::Sink).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IoError {
    message: Box<str>,
}

impl IoError {
    /// Creates an i/o error carrying `message`.
    #[must_use]
    pub fn new(message: impl Into<Box<str>>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl core::error::Error for IoError {}

#[cfg(feature = "std")]
impl From<std::io::Error> for IoError {
    fn from(e: std::io::Error) -> Self {
        use alloc::string::ToString;
        Self::new(e.to_string())
    }
}

/// Failure returned by user callables (reconstructors, state setters, builtins).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallError {
    message: Box<str>,
}

impl CallError {
    /// Creates a call error carrying `message`.
    #[must_use]
    pub fn new(message: impl Into<Box<str>>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl core::error::Error for CallError {}

impl From<String> for CallError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for CallError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Registration misuse, detected when an entry is added.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistryError {
    /// A qualified name or module was empty.
    EmptyName,
    /// A dotted reconstructor path had no module part.
    BadReconstructorPath {
        /// The rejected path.
        path: Box<str>,
    },
    /// Only one of the remote module/qualname pair was given.
    PartialRemoteName,
    /// Extension codes must be in `1..=0x7fff_ffff`.
    BadExtensionCode {
        /// The rejected code.
        code: u32,
    },
    /// The extension code or name is already bound to something else.
    ExtensionConflict {
        /// The code.
        code: u32,
    },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyName => write!(f, "registered names must be non-empty"),
            Self::BadReconstructorPath { path } => {
                write!(f, "reconstructor path {path:?} must be a dotted module.name")
            }
            Self::PartialRemoteName => {
                write!(f, "remote module and qualified name must be given together")
            }
            Self::BadExtensionCode { code } => write!(f, "extension code {code} out of range"),
            Self::ExtensionConflict { code } => {
                write!(f, "extension code {code} conflicts with an existing registration")
            }
        }
    }
}

impl core::error::Error for RegistryError {}
