// Copyright 2026 the Execution Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The encoder.
//!
//! [`Pickler`] walks a [`Value`] graph depth-first and writes the opcode stream for the
//! configured protocol. Shared containers are memoized by identity before their contents are
//! written, so a container that (directly or indirectly) contains itself is written once and
//! referenced afterwards.
//!
//! Opcode selection always picks the most compact form the protocol allows: small integers use
//! `BININT1`/`BININT2`, short text uses `SHORT_BINUNICODE` from protocol 4, tuples of up to three
//! elements use `TUPLE1`..`TUPLE3` from protocol 2, and so on. Containers are written in batches
//! of [`BATCH_SIZE`] items so that a reader never needs more than one batch on its stack.

use alloc::boxed::Box;
use alloc::format;
use alloc::rc::Rc;
use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt;

use num_bigint::BigInt;
use num_traits::ToPrimitive;

use crate::aggregates::{Dict, Set};
use crate::compat;
use crate::error::{PickleError, PicklingError};
use crate::format::frame::Framer;
use crate::format::long::{encode_long, write_long_i64};
use crate::format::{FRAME_SIZE_TARGET, check_protocol};
use crate::io::Sink;
use crate::limits::Limits;
use crate::memo::PickleMemo;
use crate::namespace::Lookup;
use crate::opcode::Opcode;
use crate::registry::Registry;
use crate::text::push_raw_unicode_escape;
use crate::trace::{ScopeKind, TraceSink, Tracer};
use crate::value::{ClassDef, Global, Instance, Object, Reduction, Value, short_type_name};

/// Number of items written per `APPENDS`/`SETITEMS`/`ADDITEMS` batch.
pub const BATCH_SIZE: usize = 1000;

/// Hook mapping a value to its persistent id, or `None` to encode it normally.
pub type PersistentIdFn<'a> = Box<dyn FnMut(&Value) -> Option<Value> + 'a>;

/// Writes values to a [`Sink`] as a pickle stream.
///
/// The memo survives across [`Pickler::dump`] calls, so values shared between dumps are written
/// once; call [`Pickler::clear_memo`] to start over.
pub struct Pickler<'a, W> {
    framer: Framer<W>,
    protocol: u8,
    registry: Registry,
    memo: PickleMemo,
    limits: Limits,
    fix_imports: bool,
    persistent_id: Option<PersistentIdFn<'a>>,
    tracer: Tracer<'a>,
    depth: usize,
    offset: u64,
    scratch: Vec<u8>,
}

impl<'a, W: Sink> Pickler<'a, W> {
    /// Creates a pickler that resolves names through `registry`.
    ///
    /// `protocol` defaults to [`DEFAULT_PROTOCOL`](crate::DEFAULT_PROTOCOL).
    pub fn with_registry(
        sink: W,
        protocol: Option<i32>,
        registry: Registry,
    ) -> Result<Self, PickleError> {
        let protocol = check_protocol(protocol)?;
        Ok(Self {
            framer: Framer::new(sink),
            protocol,
            registry,
            memo: PickleMemo::default(),
            limits: Limits::default(),
            fix_imports: true,
            persistent_id: None,
            tracer: Tracer::new(None),
            depth: 0,
            offset: 0,
            scratch: Vec::new(),
        })
    }

    /// Creates a pickler using this thread's default registry.
    #[cfg(feature = "std")]
    pub fn new(sink: W, protocol: Option<i32>) -> Result<Self, PickleError> {
        Self::with_registry(sink, protocol, crate::registry::default_registry())
    }

    /// Sets resource limits.
    #[must_use]
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Controls whether protocol 0-2 streams use the legacy module names (default on).
    #[must_use]
    pub fn with_fix_imports(mut self, fix_imports: bool) -> Self {
        self.fix_imports = fix_imports;
        self
    }

    /// Installs a persistent-id hook.
    #[must_use]
    pub fn with_persistent_id(mut self, f: impl FnMut(&Value) -> Option<Value> + 'a) -> Self {
        self.persistent_id = Some(Box::new(f));
        self
    }

    /// Attaches a trace sink.
    #[must_use]
    pub fn with_trace(mut self, sink: &'a mut dyn TraceSink) -> Self {
        self.tracer = Tracer::new(Some(sink));
        self
    }

    /// Returns the protocol being written.
    #[must_use]
    pub fn protocol(&self) -> u8 {
        self.protocol
    }

    /// Returns the registry names are resolved through.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Writes one complete pickle of `value`, terminated by `STOP`.
    pub fn dump(&mut self, value: &Value) -> Result<(), PickleError> {
        if self.protocol >= 2 {
            self.emit(Opcode::Proto, &[self.protocol])?;
        }
        if self.protocol >= 4 {
            self.framer.start_framing();
        }
        self.depth = 0;
        self.save(value)?;
        self.emit(Opcode::Stop, &[])?;
        self.framer.end_framing()
    }

    /// Forgets every memoized value.
    pub fn clear_memo(&mut self) {
        self.memo.clear();
    }

    /// Returns the wrapped sink.
    pub fn into_inner(self) -> W {
        self.framer.into_inner()
    }

    fn is_binary(&self) -> bool {
        self.protocol >= 1
    }

    fn emit(&mut self, op: Opcode, arg: &[u8]) -> Result<(), PickleError> {
        self.scratch.clear();
        self.scratch.push(op.byte());
        self.scratch.extend_from_slice(arg);
        self.framer.write(&self.scratch)?;
        self.advance(op, 1 + arg.len());
        Ok(())
    }

    /// Emits `op` + `prefix` + `payload`, keeping large payloads out of frames.
    fn emit_payload(&mut self, op: Opcode, prefix: &[u8], payload: &[u8]) -> Result<(), PickleError> {
        if payload.len() >= FRAME_SIZE_TARGET {
            self.scratch.clear();
            self.scratch.push(op.byte());
            self.scratch.extend_from_slice(prefix);
            self.framer.write_large_bytes(&self.scratch, payload)?;
            self.advance(op, 1 + prefix.len() + payload.len());
            return Ok(());
        }
        self.scratch.clear();
        self.scratch.push(op.byte());
        self.scratch.extend_from_slice(prefix);
        self.scratch.extend_from_slice(payload);
        self.framer.write(&self.scratch)?;
        self.advance(op, self.scratch.len());
        Ok(())
    }

    fn advance(&mut self, op: Opcode, len: usize) {
        let at = self.offset;
        self.offset += len as u64;
        self.tracer.opcode(at, op, self.depth);
    }

    fn emit_put(&mut self, id: u32) -> Result<(), PickleError> {
        if self.protocol >= 4 {
            self.emit(Opcode::Memoize, &[])
        } else if self.is_binary() {
            match u8::try_from(id) {
                Ok(id) => self.emit(Opcode::BinPut, &[id]),
                Err(_) => self.emit(Opcode::LongBinPut, &id.to_le_bytes()),
            }
        } else {
            self.emit(Opcode::Put, format!("{id}\n").as_bytes())
        }
    }

    fn emit_get(&mut self, id: u32) -> Result<(), PickleError> {
        if self.is_binary() {
            match u8::try_from(id) {
                Ok(id) => self.emit(Opcode::BinGet, &[id]),
                Err(_) => self.emit(Opcode::LongBinGet, &id.to_le_bytes()),
            }
        } else {
            self.emit(Opcode::Get, format!("{id}\n").as_bytes())
        }
    }

    fn memoize(&mut self, value: &Value) -> Result<(), PickleError> {
        match value.identity() {
            Some(identity) => {
                let id = self.memo.insert(identity, value)?;
                self.emit_put(id)
            }
            None => Ok(()),
        }
    }

    fn save(&mut self, value: &Value) -> Result<(), PickleError> {
        self.save_with(value, true)
    }

    fn save_with(&mut self, value: &Value, persistent: bool) -> Result<(), PickleError> {
        if self.depth >= self.limits.max_depth {
            return Err(PicklingError::RecursionLimit.into());
        }
        self.depth += 1;
        let result = self.save_value(value, persistent);
        self.depth -= 1;
        result
    }

    fn save_value(&mut self, value: &Value, persistent: bool) -> Result<(), PickleError> {
        self.framer.commit_frame(false)?;

        if persistent
            && let Some(hook) = self.persistent_id.as_mut()
            && let Some(pid) = hook(value)
        {
            return self.save_persistent_id(&pid);
        }

        if let Some(identity) = value.identity()
            && let Some(id) = self.memo.get(identity)
        {
            return self.emit_get(id);
        }

        match value {
            Value::None => self.emit(Opcode::None, &[]),
            Value::Bool(b) => self.save_bool(*b),
            Value::Int(i) => self.save_int(*i),
            Value::Long(b) => self.save_long(b),
            Value::Float(f) => self.save_float(*f),
            Value::Complex(c) => {
                self.save_builtin_reduce("complex", vec![c.re.into(), c.im.into()], None)
            }
            Value::Str(s) => self.save_str(s),
            Value::Bytes(b) => self.save_bytes(b),
            Value::ByteArray(b) => self.save_bytearray(value, b),
            Value::List(items) => self.save_list(value, items),
            Value::Tuple(items) => self.save_tuple(value, items),
            Value::Dict(d) => self.save_dict(value, d),
            Value::Set(s) => self.save_set(value, s),
            Value::FrozenSet(s) => self.save_frozenset(value, s),
            Value::Global(g) => self.save_global(value, g),
            Value::Instance(inst) => self.save_instance(value, inst),
            Value::Object(obj) => self.save_object(value, obj),
        }
    }

    fn save_persistent_id(&mut self, pid: &Value) -> Result<(), PickleError> {
        if self.is_binary() {
            self.save_with(pid, false)?;
            return self.emit(Opcode::BinPersId, &[]);
        }
        let text = pid
            .as_str()
            .filter(|s| s.is_ascii() && !s.contains('\n'))
            .ok_or(PicklingError::PersistentIdNotAscii)?;
        let mut line = Vec::with_capacity(text.len() + 1);
        line.extend_from_slice(text.as_bytes());
        line.push(b'\n');
        self.emit(Opcode::PersId, &line)
    }

    fn save_bool(&mut self, b: bool) -> Result<(), PickleError> {
        match (self.protocol >= 2, b) {
            (true, true) => self.emit(Opcode::NewTrue, &[]),
            (true, false) => self.emit(Opcode::NewFalse, &[]),
            (false, true) => self.emit(Opcode::Int, b"01\n"),
            (false, false) => self.emit(Opcode::Int, b"00\n"),
        }
    }

    fn save_int(&mut self, i: i64) -> Result<(), PickleError> {
        if self.is_binary() {
            if let Ok(b) = u8::try_from(i) {
                return self.emit(Opcode::BinInt1, &[b]);
            }
            if let Ok(w) = u16::try_from(i) {
                return self.emit(Opcode::BinInt2, &w.to_le_bytes());
            }
            if let Ok(d) = i32::try_from(i) {
                return self.emit(Opcode::BinInt, &d.to_le_bytes());
            }
        }
        if self.protocol >= 2 {
            let mut encoded = Vec::with_capacity(8);
            write_long_i64(&mut encoded, i);
            return self.save_long_bytes(&encoded);
        }
        if i32::try_from(i).is_ok() {
            self.emit(Opcode::Int, format!("{i}\n").as_bytes())
        } else {
            self.emit(Opcode::Long, format!("{i}L\n").as_bytes())
        }
    }

    fn save_long(&mut self, b: &BigInt) -> Result<(), PickleError> {
        if let Some(i) = b.to_i64() {
            return self.save_int(i);
        }
        if self.protocol >= 2 {
            return self.save_long_bytes(&encode_long(b));
        }
        self.emit(Opcode::Long, format!("{b}L\n").as_bytes())
    }

    /// Integer payloads always stay inside the current frame, whatever their size.
    fn save_long_bytes(&mut self, encoded: &[u8]) -> Result<(), PickleError> {
        let (op, mut arg) = match u8::try_from(encoded.len()) {
            Ok(n) => (Opcode::Long1, vec![n]),
            Err(_) => {
                let n = i32::try_from(encoded.len())
                    .map_err(|_| PicklingError::TooLarge { type_name: "int" })?;
                (Opcode::Long4, n.to_le_bytes().to_vec())
            }
        };
        arg.extend_from_slice(encoded);
        self.emit(op, &arg)
    }

    fn save_float(&mut self, f: f64) -> Result<(), PickleError> {
        if self.is_binary() {
            return self.emit(Opcode::BinFloat, &f.to_be_bytes());
        }
        let mut line = float_repr(f);
        line.push('\n');
        self.emit(Opcode::Float, line.as_bytes())
    }

    fn save_str(&mut self, s: &str) -> Result<(), PickleError> {
        if !self.is_binary() {
            let mut line = Vec::with_capacity(s.len() + 1);
            for ch in s.chars() {
                match ch {
                    // Characters the line-oriented reader would misinterpret.
                    '\\' | '\0' | '\n' | '\r' | '\x1a' => {
                        line.extend_from_slice(format!("\\u{:04x}", u32::from(ch)).as_bytes());
                    }
                    _ => push_raw_unicode_escape(ch, &mut line),
                }
            }
            line.push(b'\n');
            return self.emit(Opcode::Unicode, &line);
        }
        let bytes = s.as_bytes();
        if self.protocol >= 4 {
            if let Ok(n) = u8::try_from(bytes.len()) {
                return self.emit_payload(Opcode::ShortBinUnicode, &[n], bytes);
            }
            if u32::try_from(bytes.len()).is_err() {
                return self.emit_payload(
                    Opcode::BinUnicode8,
                    &(bytes.len() as u64).to_le_bytes(),
                    bytes,
                );
            }
        }
        let n = u32::try_from(bytes.len()).map_err(|_| PicklingError::TooLarge { type_name: "str" })?;
        self.emit_payload(Opcode::BinUnicode, &n.to_le_bytes(), bytes)
    }

    fn save_bytes(&mut self, b: &[u8]) -> Result<(), PickleError> {
        if self.protocol < 3 {
            if b.is_empty() {
                return self.save_builtin_reduce("bytes", Vec::new(), None);
            }
            let latin1: String = b.iter().map(|&c| char::from(c)).collect();
            let reduction = Reduction::new(
                Value::global("_codecs", "encode"),
                vec![latin1.into(), "latin1".into()],
            );
            return self.save_reduce(reduction, None);
        }
        if let Ok(n) = u8::try_from(b.len()) {
            return self.emit_payload(Opcode::ShortBinBytes, &[n], b);
        }
        match u32::try_from(b.len()) {
            Ok(n) => self.emit_payload(Opcode::BinBytes, &n.to_le_bytes(), b),
            Err(_) if self.protocol >= 4 => {
                self.emit_payload(Opcode::BinBytes8, &(b.len() as u64).to_le_bytes(), b)
            }
            Err(_) => Err(PicklingError::TooLarge { type_name: "bytes" }.into()),
        }
    }

    fn save_bytearray(&mut self, value: &Value, b: &RefCell<Vec<u8>>) -> Result<(), PickleError> {
        let data = b.borrow().clone();
        if self.protocol < 5 {
            let args = if data.is_empty() {
                Vec::new()
            } else {
                vec![Value::bytes(&data)]
            };
            return self.save_builtin_reduce("bytearray", args, Some(value));
        }
        self.emit_payload(Opcode::ByteArray8, &(data.len() as u64).to_le_bytes(), &data)?;
        self.memoize(value)
    }

    fn save_list(&mut self, value: &Value, items: &RefCell<Vec<Value>>) -> Result<(), PickleError> {
        if self.is_binary() {
            self.emit(Opcode::EmptyList, &[])?;
        } else {
            self.emit(Opcode::Mark, &[])?;
            self.emit(Opcode::List, &[])?;
        }
        self.memoize(value)?;
        let items = items.borrow().clone();
        self.batch_appends(items.into_iter())
    }

    fn batch_appends(&mut self, items: impl Iterator<Item = Value>) -> Result<(), PickleError> {
        let mut items = items;
        if !self.is_binary() {
            for item in items {
                self.save(&item)?;
                self.emit(Opcode::Append, &[])?;
            }
            return Ok(());
        }
        loop {
            let batch: Vec<Value> = items.by_ref().take(BATCH_SIZE).collect();
            match batch.as_slice() {
                [] => {}
                [item] => {
                    self.save(item)?;
                    self.emit(Opcode::Append, &[])?;
                }
                _ => {
                    self.emit(Opcode::Mark, &[])?;
                    for item in &batch {
                        self.save(item)?;
                    }
                    self.emit(Opcode::Appends, &[])?;
                }
            }
            if batch.len() < BATCH_SIZE {
                return Ok(());
            }
        }
    }

    fn save_tuple(&mut self, value: &Value, items: &[Value]) -> Result<(), PickleError> {
        if items.is_empty() {
            if self.is_binary() {
                return self.emit(Opcode::EmptyTuple, &[]);
            }
            self.emit(Opcode::Mark, &[])?;
            return self.emit(Opcode::Tuple, &[]);
        }
        let n = items.len();
        if n <= 3 && self.protocol >= 2 {
            for item in items {
                self.save(item)?;
            }
            // A member referenced the tuple itself, so it is already in the memo.
            if let Some(id) = self.memoized(value) {
                for _ in 0..n {
                    self.emit(Opcode::Pop, &[])?;
                }
                return self.emit_get(id);
            }
            let op = [Opcode::Tuple1, Opcode::Tuple2, Opcode::Tuple3][n - 1];
            self.emit(op, &[])?;
            return self.memoize(value);
        }

        self.emit(Opcode::Mark, &[])?;
        for item in items {
            self.save(item)?;
        }
        if let Some(id) = self.memoized(value) {
            if self.is_binary() {
                self.emit(Opcode::PopMark, &[])?;
            } else {
                for _ in 0..=n {
                    self.emit(Opcode::Pop, &[])?;
                }
            }
            return self.emit_get(id);
        }
        self.emit(Opcode::Tuple, &[])?;
        self.memoize(value)
    }

    fn memoized(&self, value: &Value) -> Option<u32> {
        self.memo.get(value.identity()?)
    }

    fn save_dict(&mut self, value: &Value, d: &RefCell<Dict>) -> Result<(), PickleError> {
        if self.is_binary() {
            self.emit(Opcode::EmptyDict, &[])?;
        } else {
            self.emit(Opcode::Mark, &[])?;
            self.emit(Opcode::Dict, &[])?;
        }
        self.memoize(value)?;
        let pairs: Vec<(Value, Value)> = d
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        self.batch_setitems(pairs.into_iter())
    }

    fn batch_setitems(
        &mut self,
        items: impl Iterator<Item = (Value, Value)>,
    ) -> Result<(), PickleError> {
        let mut items = items;
        if !self.is_binary() {
            for (k, v) in items {
                self.save(&k)?;
                self.save(&v)?;
                self.emit(Opcode::SetItem, &[])?;
            }
            return Ok(());
        }
        loop {
            let batch: Vec<(Value, Value)> = items.by_ref().take(BATCH_SIZE).collect();
            match batch.as_slice() {
                [] => {}
                [(k, v)] => {
                    self.save(k)?;
                    self.save(v)?;
                    self.emit(Opcode::SetItem, &[])?;
                }
                _ => {
                    self.emit(Opcode::Mark, &[])?;
                    for (k, v) in &batch {
                        self.save(k)?;
                        self.save(v)?;
                    }
                    self.emit(Opcode::SetItems, &[])?;
                }
            }
            if batch.len() < BATCH_SIZE {
                return Ok(());
            }
        }
    }

    fn save_set(&mut self, value: &Value, s: &RefCell<Set>) -> Result<(), PickleError> {
        let items: Vec<Value> = s.borrow().iter().cloned().collect();
        if self.protocol < 4 {
            return self.save_builtin_reduce("set", vec![Value::list(items)], Some(value));
        }
        self.emit(Opcode::EmptySet, &[])?;
        self.memoize(value)?;
        let mut items = items.into_iter();
        loop {
            let batch: Vec<Value> = items.by_ref().take(BATCH_SIZE).collect();
            if !batch.is_empty() {
                self.emit(Opcode::Mark, &[])?;
                for item in &batch {
                    self.save(item)?;
                }
                self.emit(Opcode::AddItems, &[])?;
            }
            if batch.len() < BATCH_SIZE {
                return Ok(());
            }
        }
    }

    fn save_frozenset(&mut self, value: &Value, s: &Set) -> Result<(), PickleError> {
        let items: Vec<Value> = s.iter().cloned().collect();
        if self.protocol < 4 {
            return self.save_builtin_reduce("frozenset", vec![Value::list(items)], Some(value));
        }
        self.emit(Opcode::Mark, &[])?;
        for item in &items {
            self.save(item)?;
        }
        if let Some(id) = self.memoized(value) {
            self.emit(Opcode::PopMark, &[])?;
            return self.emit_get(id);
        }
        self.emit(Opcode::FrozenSet, &[])?;
        self.memoize(value)
    }

    fn save_global(&mut self, value: &Value, g: &Global) -> Result<(), PickleError> {
        let (module, qualname) = self.wire_name(g)?;
        if self.write_global(&module, &qualname)? {
            self.memoize(value)?;
        }
        Ok(())
    }

    /// Determines the `(module, qualname)` a global is written as, verifying it resolves.
    fn wire_name(&self, g: &Global) -> Result<(String, String), PickleError> {
        let unresolvable = |module: String| PicklingError::UnresolvableGlobal {
            module: module.into(),
            qualname: g.qualname().into(),
        };
        if let Some(type_id) = g.type_id() {
            return match self.registry.find(type_id) {
                Some(entry) => Ok(entry.type_wire_name()),
                None => Err(unresolvable(self.registry.module_of(g)).into()),
            };
        }
        let module = self.registry.module_of(g);
        if let Some(symbol) = g.symbol() {
            let same = match self.registry.resolve(&module, g.qualname()) {
                Lookup::Found(found) => found.ptr_eq(symbol),
                Lookup::MissingModule | Lookup::MissingAttribute => false,
            };
            if !same && self.registry.decode_global(&module, g.qualname()).is_none() {
                return Err(unresolvable(module).into());
            }
        }
        Ok((module, g.qualname().to_string()))
    }

    /// Writes a global reference; returns whether it should be memoized.
    fn write_global(&mut self, module: &str, qualname: &str) -> Result<bool, PickleError> {
        if self.protocol >= 2
            && let Some(code) = self.registry.extension_code(module, qualname)
        {
            if let Ok(c) = u8::try_from(code) {
                self.emit(Opcode::Ext1, &[c])?;
            } else if let Ok(c) = u16::try_from(code) {
                self.emit(Opcode::Ext2, &c.to_le_bytes())?;
            } else {
                self.emit(Opcode::Ext4, &code.to_le_bytes())?;
            }
            return Ok(false);
        }

        if self.protocol >= 4 {
            self.save_str(module)?;
            self.save_str(qualname)?;
            self.emit(Opcode::StackGlobal, &[])?;
        } else if let Some((parent, last)) = qualname.rsplit_once('.') {
            // GLOBAL cannot name a nested attribute; spell it `getattr(parent, last)`.
            let args = Value::tuple(vec![Value::global(module, parent), last.into()]);
            self.save(&Value::global("builtins", "getattr"))?;
            self.save(&args)?;
            self.emit(Opcode::Reduce, &[])?;
        } else {
            let (module, qualname) = if self.protocol < 3 && self.fix_imports {
                compat::to_legacy(module, qualname)
            } else {
                (module, qualname)
            };
            if self.protocol < 3 && !(module.is_ascii() && qualname.is_ascii()) {
                return Err(PicklingError::NonAsciiGlobal {
                    qualname: qualname.into(),
                }
                .into());
            }
            let mut lines = Vec::with_capacity(module.len() + qualname.len() + 2);
            lines.extend_from_slice(module.as_bytes());
            lines.push(b'\n');
            lines.extend_from_slice(qualname.as_bytes());
            lines.push(b'\n');
            self.emit(Opcode::Global, &lines)?;
        }
        Ok(true)
    }

    /// Writes the class of an instance, memoized by class identity.
    fn save_class(&mut self, class: &Rc<ClassDef>) -> Result<(), PickleError> {
        let identity = Rc::as_ptr(class).addr();
        if let Some(id) = self.memo.get(identity) {
            return self.emit_get(id);
        }
        let global = Global::from_class(class);
        let (module, qualname) = self.wire_name(&global)?;
        if self.write_global(&module, &qualname)? {
            let id = self.memo.insert(identity, &Value::Global(Rc::new(global)))?;
            self.emit_put(id)?;
        }
        Ok(())
    }

    fn save_instance(
        &mut self,
        value: &Value,
        inst: &RefCell<Instance>,
    ) -> Result<(), PickleError> {
        let (class, state) = {
            let inst = inst.borrow();
            let class = inst.class().clone();
            let state = match class.get_state_fn() {
                Some(get_state) => Some(get_state(&*inst)).filter(|s| !s.is_none()),
                None if inst.attrs().is_empty() => None,
                None => Some(Value::Dict(Rc::new(RefCell::new(inst.attrs().clone())))),
            };
            (class, state)
        };

        if self.protocol >= 2 {
            self.save_class(&class)?;
            self.save(&Value::tuple(Vec::new()))?;
            self.emit(Opcode::NewObj, &[])?;
        } else {
            self.save(&Value::global("copyreg", "_reconstructor"))?;
            self.emit(Opcode::Mark, &[])?;
            self.save_class(&class)?;
            self.save(&Value::global("builtins", "object"))?;
            self.emit(Opcode::None, &[])?;
            self.emit(Opcode::Tuple, &[])?;
            self.emit(Opcode::Reduce, &[])?;
        }
        self.memoize(value)?;

        if let Some(state) = state {
            self.save(&state)?;
            self.emit(Opcode::Build, &[])?;
        }
        Ok(())
    }

    fn save_object(&mut self, value: &Value, obj: &Object) -> Result<(), PickleError> {
        let entry = self.registry.find(obj.type_id());
        let label = short_type_name(obj.type_name());
        let protocol = self.protocol;

        self.tracer.enter(ScopeKind::Reduce, label, self.offset);
        let reduced = match entry.as_ref().and_then(|e| e.reduce(obj, protocol)) {
            Some(result) => Some(result),
            None => obj.with_dyn(|o| o.reduce(protocol)).flatten(),
        };
        self.tracer.exit(ScopeKind::Reduce, self.offset);

        let reduction = match reduced {
            Some(Ok(reduction)) => reduction,
            Some(Err(e)) => {
                return Err(PicklingError::Reduce {
                    type_name: label.into(),
                    message: e.message().into(),
                }
                .into());
            }
            None => {
                return Err(PicklingError::Unsupported {
                    type_name: label.into(),
                }
                .into());
            }
        };

        self.save_reduce(reduction, Some(value))
    }

    fn save_builtin_reduce(
        &mut self,
        name: &str,
        args: Vec<Value>,
        obj: Option<&Value>,
    ) -> Result<(), PickleError> {
        self.save_reduce(Reduction::new(Value::global("builtins", name), args), obj)
    }

    fn save_reduce(&mut self, reduction: Reduction, obj: Option<&Value>) -> Result<(), PickleError> {
        let Reduction {
            callable,
            args,
            state,
            list_items,
            dict_items,
            state_setter,
        } = reduction;
        let Value::Global(func) = &callable else {
            return Err(PicklingError::CallableNotGlobal.into());
        };
        let Value::Tuple(arg_items) = &args else {
            return Err(PicklingError::ArgsNotTuple.into());
        };

        if self.protocol >= 2 && func.qualname() == "__newobj_ex__" {
            let [cls, cls_args, kwargs] = &arg_items[..] else {
                return Err(PicklingError::BadNewObjArgs.into());
            };
            check_newobj_class(cls, obj)?;
            if !matches!(cls_args, Value::Tuple(_)) {
                return Err(PicklingError::BadNewObjArgs.into());
            }
            let no_kwargs = match kwargs {
                Value::Dict(d) => d.borrow().is_empty(),
                Value::None => true,
                _ => return Err(PicklingError::BadNewObjArgs.into()),
            };
            self.save(cls)?;
            self.save(cls_args)?;
            if self.protocol >= 4 {
                self.save(kwargs)?;
                self.emit(Opcode::NewObjEx, &[])?;
            } else if no_kwargs {
                self.emit(Opcode::NewObj, &[])?;
            } else {
                return Err(PicklingError::BadNewObjArgs.into());
            }
        } else if self.protocol >= 2 && func.qualname() == "__newobj__" {
            let Some((cls, rest)) = arg_items.split_first() else {
                return Err(PicklingError::BadNewObjArgs.into());
            };
            check_newobj_class(cls, obj)?;
            self.save(cls)?;
            self.save(&Value::tuple(rest.to_vec()))?;
            self.emit(Opcode::NewObj, &[])?;
        } else {
            let callable = self
                .reconstructor_for(func)
                .unwrap_or_else(|| callable.clone());
            self.save(&callable)?;
            self.save(&args)?;
            self.emit(Opcode::Reduce, &[])?;
        }

        if let Some(obj) = obj
            && let Some(identity) = obj.identity()
        {
            // The arguments may have referenced `obj` (through its state), in which case it is
            // already memoized and the freshly built copy is discarded.
            match self.memo.get(identity) {
                Some(id) => {
                    self.emit(Opcode::Pop, &[])?;
                    self.emit_get(id)?;
                }
                None => self.memoize(obj)?,
            }
        }

        if let Some(items) = list_items {
            self.batch_appends(items)?;
        }
        if let Some(items) = dict_items {
            self.batch_setitems(items)?;
        }
        if let Some(state) = state {
            match state_setter {
                None => {
                    self.save(&state)?;
                    self.emit(Opcode::Build, &[])?;
                }
                Some(setter) => {
                    self.save(&setter)?;
                    self.save(obj.unwrap_or(&Value::None))?;
                    self.save(&state)?;
                    self.emit(Opcode::Tuple2, &[])?;
                    self.emit(Opcode::Reduce, &[])?;
                    self.emit(Opcode::Pop, &[])?;
                }
            }
        }
        Ok(())
    }

    /// A host-type global in callable position names the type's reconstructor instead.
    fn reconstructor_for(&self, func: &Global) -> Option<Value> {
        let entry = self.registry.find(func.type_id()?)?;
        let (module, qualname) = entry.callable_wire_name()?;
        Some(Value::global(&module, &qualname))
    }
}

fn check_newobj_class(cls: &Value, obj: Option<&Value>) -> Result<(), PicklingError> {
    let Value::Global(g) = cls else {
        return Err(PicklingError::BadNewObjArgs);
    };
    if let Some(Value::Instance(inst)) = obj
        && let Some(class) = g.class()
        && !Rc::ptr_eq(class, inst.borrow().class())
    {
        return Err(PicklingError::BadNewObjArgs);
    }
    Ok(())
}

impl<W> fmt::Debug for Pickler<'_, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pickler")
            .field("protocol", &self.protocol)
            .field("memo", &self.memo.len())
            .field("limits", &self.limits)
            .field("fix_imports", &self.fix_imports)
            .field("persistent_id", &self.persistent_id.is_some())
            .field("tracer", &self.tracer)
            .finish_non_exhaustive()
    }
}

/// Formats `f` the way the text protocol expects: shortest round-trip digits, positional
/// notation for exponents in `-4..16`, and `e+XX`/`e-XX` otherwise.
pub(crate) fn float_repr(f: f64) -> String {
    if f.is_nan() {
        return String::from("nan");
    }
    if f.is_infinite() {
        return String::from(if f > 0.0 { "inf" } else { "-inf" });
    }
    let sci = format!("{f:e}");
    let (mantissa, exp) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let (sign, mantissa) = match mantissa.strip_prefix('-') {
        Some(m) => ("-", m),
        None => ("", mantissa),
    };
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();

    let mut out = String::from(sign);
    if (-4..16).contains(&exp) {
        let point = exp + 1;
        if point <= 0 {
            out.push_str("0.");
            out.extend(core::iter::repeat_n('0', point.unsigned_abs() as usize));
            out.push_str(&digits);
        } else {
            let point = point.unsigned_abs() as usize;
            if point >= digits.len() {
                out.push_str(&digits);
                out.extend(core::iter::repeat_n('0', point - digits.len()));
                out.push_str(".0");
            } else {
                out.push_str(&digits[..point]);
                out.push('.');
                out.push_str(&digits[point..]);
            }
        }
    } else {
        out.push_str(&digits[..1]);
        if digits.len() > 1 {
            out.push('.');
            out.push_str(&digits[1..]);
        }
        let exp_sign = if exp < 0 { '-' } else { '+' };
        out.push_str(&format!("e{exp_sign}{:02}", exp.unsigned_abs()));
    }
    out
}
