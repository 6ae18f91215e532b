// Copyright 2026 the Execution Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Optional instrumentation hooks.
//!
//! A [`TraceSink`] attached to a [`Pickler`](crate::Pickler) or [`Unpickler`](crate::Unpickler)
//! receives one callback per opcode and paired enter/exit callbacks around frames, reconstructor
//! calls and reductions. The codec checks [`TraceSink::mask`] once per operation, so a sink that
//! reports [`TraceMask::NONE`] costs a branch per opcode.
//!
//! The decoder reports offsets in the raw input, frame headers included. The encoder reports
//! offsets in the unframed opcode stream.

use core::ops::BitOr;

use crate::opcode::Opcode;

/// Which callbacks a sink wants.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct TraceMask(u8);

impl TraceMask {
    /// No callbacks.
    pub const NONE: Self = Self(0);
    /// [`TraceSink::opcode`] for every opcode.
    pub const OPCODE: Self = Self(1 << 0);
    /// Scopes around frames.
    pub const FRAME: Self = Self(1 << 1);
    /// Scopes around reconstructor and state-setter calls.
    pub const CALL: Self = Self(1 << 2);
    /// Scopes around reductions of host objects.
    pub const REDUCE: Self = Self(1 << 3);

    /// Returns `true` if every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` if no bit is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for TraceMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Kind of a traced scope.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    /// A `FRAME` region.
    Frame,
    /// A call to a reconstructor or state setter.
    Call,
    /// A reduction of a host object.
    Reduce,
}

impl ScopeKind {
    pub(crate) const fn mask(self) -> TraceMask {
        match self {
            Self::Frame => TraceMask::FRAME,
            Self::Call => TraceMask::CALL,
            Self::Reduce => TraceMask::REDUCE,
        }
    }
}

/// Receives trace callbacks.
pub trait TraceSink {
    /// Returns the callbacks this sink wants.
    fn mask(&self) -> TraceMask;

    /// Called before each opcode is executed (decoding) or after it is written (encoding).
    ///
    /// `depth` is the operand-stack height when decoding and the nesting depth when encoding.
    fn opcode(&mut self, _offset: u64, _op: Opcode, _depth: usize) {}

    /// Called when a scope opens.
    fn scope_enter(&mut self, _kind: ScopeKind, _label: &str, _offset: u64) {}

    /// Called when the innermost scope of `kind` closes.
    fn scope_exit(&mut self, _kind: ScopeKind, _offset: u64) {}
}

/// A [`TraceSink`] paired with its cached mask.
pub(crate) struct Tracer<'a> {
    sink: Option<&'a mut dyn TraceSink>,
    mask: TraceMask,
}

impl<'a> Tracer<'a> {
    pub(crate) fn new(sink: Option<&'a mut dyn TraceSink>) -> Self {
        let mask = sink.as_ref().map_or(TraceMask::NONE, |s| s.mask());
        Self { sink, mask }
    }

    #[inline]
    pub(crate) fn wants(&self, mask: TraceMask) -> bool {
        !mask.is_empty() && self.mask.contains(mask)
    }

    #[inline]
    pub(crate) fn opcode(&mut self, offset: u64, op: Opcode, depth: usize) {
        if self.wants(TraceMask::OPCODE)
            && let Some(sink) = self.sink.as_mut()
        {
            sink.opcode(offset, op, depth);
        }
    }

    pub(crate) fn enter(&mut self, kind: ScopeKind, label: &str, offset: u64) {
        if self.wants(kind.mask())
            && let Some(sink) = self.sink.as_mut()
        {
            sink.scope_enter(kind, label, offset);
        }
    }

    pub(crate) fn exit(&mut self, kind: ScopeKind, offset: u64) {
        if self.wants(kind.mask())
            && let Some(sink) = self.sink.as_mut()
        {
            sink.scope_exit(kind, offset);
        }
    }
}

impl core::fmt::Debug for Tracer<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tracer")
            .field("attached", &self.sink.is_some())
            .field("mask", &self.mask)
            .finish()
    }
}
