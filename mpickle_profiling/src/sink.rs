// Copyright 2026 the Execution Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::resolver::{
    DefaultLabelResolver, LabelResolver, default_call_label, default_reduce_label, frame_label,
};
use mpickle::{ScopeKind, TraceMask, TraceSink};
use std::string::String;
use std::vec::Vec;

type BackendGuard = tracy_client::Span;

struct ScopeEntry {
    kind: ScopeKind,
    // Keep the label alive for backends that may borrow it.
    label: String,
    guard: Option<BackendGuard>,
}

/// A `TraceSink` that emits Tracy zones via `tracy-client`.
///
/// Frames, reconstructor calls and host-object reductions each become one zone. The zone's line
/// number is the stream offset where the scope opened, saturated to `u32`.
pub struct ProfilingTraceSink<R = DefaultLabelResolver> {
    resolver: R,
    stack: Vec<ScopeEntry>,
}

impl ProfilingTraceSink<DefaultLabelResolver> {
    /// Create a new sink with the codec's own labels.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl<R: LabelResolver> ProfilingTraceSink<R> {
    /// Create a new sink with a custom label resolver.
    #[must_use]
    pub fn with_resolver(resolver: R) -> Self {
        Self {
            resolver,
            stack: Vec::new(),
        }
    }

    /// Number of zones currently open.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    fn on_scope_enter(&mut self, kind: ScopeKind, label: &str, offset: u64) {
        let label = self.resolve_label(kind, label, offset);
        let guard = self.start_scope(kind, &label, offset);
        self.stack.push(ScopeEntry { kind, label, guard });
    }

    fn on_scope_exit(&mut self, kind: ScopeKind) {
        if let Some(top) = self.stack.last()
            && top.kind == kind
        {
            if let Some(entry) = self.stack.pop() {
                let ScopeEntry {
                    label: _label,
                    guard: _guard,
                    ..
                } = entry;
                let _ = (_label, _guard);
            }
            return;
        }
        // If the stack got out of sync, drop any active scopes to avoid leaking.
        self.drop_active_scopes();
    }

    fn resolve_label(&mut self, kind: ScopeKind, label: &str, offset: u64) -> String {
        match kind {
            ScopeKind::Frame => frame_label(offset),
            ScopeKind::Call => self
                .resolver
                .call_label(label)
                .unwrap_or_else(|| default_call_label(label)),
            ScopeKind::Reduce => self
                .resolver
                .reduce_label(label)
                .unwrap_or_else(|| default_reduce_label(label)),
        }
    }

    fn start_scope(&self, kind: ScopeKind, label: &str, offset: u64) -> Option<BackendGuard> {
        let function_name = match kind {
            ScopeKind::Frame => "mpickle.frame",
            ScopeKind::Call => "mpickle.call",
            ScopeKind::Reduce => "mpickle.reduce",
        };
        let line = u32::try_from(offset).unwrap_or(u32::MAX);
        let client = tracy_client::Client::running()?;
        Some(client.span_alloc(Some(label), function_name, "mpickle", line, 0))
    }

    // Drop in LIFO order so nested spans close inner-to-outer.
    fn drop_active_scopes(&mut self) {
        while let Some(entry) = self.stack.pop() {
            let ScopeEntry {
                label: _label,
                guard: _guard,
                ..
            } = entry;
            let _ = (_label, _guard);
        }
    }
}

impl<R: LabelResolver> TraceSink for ProfilingTraceSink<R> {
    fn mask(&self) -> TraceMask {
        TraceMask::FRAME | TraceMask::CALL | TraceMask::REDUCE
    }

    fn scope_enter(&mut self, kind: ScopeKind, label: &str, offset: u64) {
        self.on_scope_enter(kind, label, offset);
    }

    fn scope_exit(&mut self, kind: ScopeKind, _offset: u64) {
        self.on_scope_exit(kind);
    }
}

impl<R> Default for ProfilingTraceSink<R>
where
    R: LabelResolver + Default,
{
    fn default() -> Self {
        Self::with_resolver(R::default())
    }
}

impl<R> std::fmt::Debug for ProfilingTraceSink<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfilingTraceSink")
            .field("stack_depth", &self.stack.len())
            .finish_non_exhaustive()
    }
}
