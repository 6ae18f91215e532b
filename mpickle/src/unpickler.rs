// Copyright 2026 the Execution Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The decoder.
//!
//! [`Unpickler`] is a stack machine. `MARK` saves the current operand stack and starts an empty
//! one; mark-delimited opcodes (`TUPLE`, `APPENDS`, `SETITEMS`, ...) take the whole current stack
//! and restore the saved one. Frames are reassembled transparently by
//! [`Unframer`](crate::format::frame::Unframer), so handlers never see frame boundaries.
//!
//! Global references resolve through the [`Registry`]: registered wire names first, then the
//! namespace. Protocol 0-2 streams have legacy module names mapped to their current spelling
//! unless `fix_imports` is turned off.

use alloc::boxed::Box;
use alloc::format;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt;
use core::mem;

use num_bigint::BigInt;

use crate::aggregates::{Dict, Set, Unhashable};
use crate::builtins;
use crate::compat;
use crate::error::{CallError, MissingName, PickleError, UnpicklingError};
use crate::format::HIGHEST_PROTOCOL;
use crate::format::frame::Unframer;
use crate::format::long::{decode_long, read_long_i64};
use crate::io::Source;
use crate::limits::{Limits, StringEncoding};
use crate::memo::UnpickleMemo;
use crate::namespace::Lookup;
use crate::opcode::Opcode;
use crate::registry::Registry;
use crate::text::{self, Encoding};
use crate::trace::{ScopeKind, TraceSink, Tracer};
use crate::value::{Global, Instance, Object, Value, short_type_name};

/// Hook resolving a persistent id to the value it stands for.
pub type PersistentLoadFn<'a> = Box<dyn FnMut(Value) -> Result<Value, CallError> + 'a>;

type Result<T, E = PickleError> = core::result::Result<T, E>;

/// Reads values from a [`Source`] holding a pickle stream.
pub struct Unpickler<'a, S> {
    input: Unframer<S>,
    registry: Registry,
    memo: UnpickleMemo,
    stack: Vec<Value>,
    marks: Vec<Vec<Value>>,
    marked: usize,
    limits: Limits,
    string_encoding: StringEncoding,
    fix_imports: bool,
    persistent_load: Option<PersistentLoadFn<'a>>,
    buffers: Option<Box<dyn Iterator<Item = Value> + 'a>>,
    tracer: Tracer<'a>,
    protocol: u8,
    in_frame: bool,
    buf: Vec<u8>,
}

impl<'a, S: Source> Unpickler<'a, S> {
    /// Creates an unpickler that resolves names through `registry`.
    pub fn with_registry(source: S, registry: Registry) -> Self {
        Self {
            input: Unframer::new(source),
            registry,
            memo: UnpickleMemo::default(),
            stack: Vec::new(),
            marks: Vec::new(),
            marked: 0,
            limits: Limits::default(),
            string_encoding: StringEncoding::default(),
            fix_imports: true,
            persistent_load: None,
            buffers: None,
            tracer: Tracer::new(None),
            protocol: 0,
            in_frame: false,
            buf: Vec::new(),
        }
    }

    /// Creates an unpickler using this thread's default registry.
    #[cfg(feature = "std")]
    pub fn new(source: S) -> Self {
        Self::with_registry(source, crate::registry::default_registry())
    }

    /// Sets resource limits.
    #[must_use]
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Sets how protocol 0-2 byte strings are decoded (ASCII by default).
    #[must_use]
    pub fn with_string_encoding(mut self, encoding: StringEncoding) -> Self {
        self.string_encoding = encoding;
        self
    }

    /// Controls whether legacy module names in protocol 0-2 streams are mapped (default on).
    #[must_use]
    pub fn with_fix_imports(mut self, fix_imports: bool) -> Self {
        self.fix_imports = fix_imports;
        self
    }

    /// Installs the persistent-id resolver.
    #[must_use]
    pub fn with_persistent_load(
        mut self,
        f: impl FnMut(Value) -> Result<Value, CallError> + 'a,
    ) -> Self {
        self.persistent_load = Some(Box::new(f));
        self
    }

    /// Supplies out-of-band buffers consumed by `NEXT_BUFFER`, in order.
    #[must_use]
    pub fn with_buffers(mut self, buffers: impl IntoIterator<Item = Value> + 'a) -> Self {
        self.buffers = Some(Box::new(buffers.into_iter()));
        self
    }

    /// Attaches a trace sink.
    #[must_use]
    pub fn with_trace(mut self, sink: &'a mut dyn TraceSink) -> Self {
        self.tracer = Tracer::new(Some(sink));
        self
    }

    /// Offset of the next unread input byte.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.input.position()
    }

    /// Forgets every memoized value, so the next stream starts a fresh session.
    pub fn clear_memo(&mut self) {
        self.memo.clear();
    }

    /// Returns the wrapped source.
    pub fn into_inner(self) -> S {
        self.input.into_inner()
    }

    /// Reads one complete pickle and returns its value.
    ///
    /// Returns [`PickleError::Eof`] if the input ends where an opcode is expected.
    pub fn load(&mut self) -> Result<Value> {
        self.stack.clear();
        self.marks.clear();
        self.marked = 0;
        self.protocol = 0;
        let result = self.run();
        if self.in_frame {
            self.in_frame = false;
            self.tracer.exit(ScopeKind::Frame, self.input.position());
        }
        result
    }

    fn run(&mut self) -> Result<Value> {
        loop {
            let offset = self.input.position();
            self.buf.clear();
            if self.input.read(1, &mut self.buf)? == 0 {
                return Err(PickleError::Eof);
            }
            let byte = self.buf[0];
            let op =
                Opcode::from_u8(byte).ok_or(UnpicklingError::UnknownOpcode { byte, offset })?;
            self.tracer.opcode(offset, op, self.height());
            if op == Opcode::Stop {
                return self.pop(op);
            }
            self.dispatch(op)?;
        }
    }

    fn height(&self) -> usize {
        self.stack.len() + self.marked
    }

    fn dispatch(&mut self, op: Opcode) -> Result<()> {
        match op {
            Opcode::Proto => {
                let [p] = self.read_array(op)?;
                if p > HIGHEST_PROTOCOL {
                    return Err(UnpicklingError::UnsupportedProtocol { protocol: p }.into());
                }
                self.protocol = p;
            }
            Opcode::Frame => {
                let len = u64::from_le_bytes(self.read_array(op)?);
                if len > self.limits.max_frame_len {
                    return Err(limit("frame length"));
                }
                let at = self.input.position();
                self.input.load_frame(len)?;
                if self.in_frame {
                    self.tracer.exit(ScopeKind::Frame, at);
                }
                self.in_frame = true;
                self.tracer.enter(ScopeKind::Frame, "frame", at);
            }
            Opcode::PersId => {
                let line = self.read_line(op)?;
                let pid = text::decode(&line, Encoding::Ascii)
                    .ok_or(UnpicklingError::BadText { opcode: op })?;
                let value = self.persistent_load(pid.into())?;
                self.push(value)?;
            }
            Opcode::BinPersId => {
                let pid = self.pop(op)?;
                let value = self.persistent_load(pid)?;
                self.push(value)?;
            }

            Opcode::None => self.push(Value::None)?,
            Opcode::NewFalse => self.push(Value::Bool(false))?,
            Opcode::NewTrue => self.push(Value::Bool(true))?,
            Opcode::Int => {
                let line = self.read_line(op)?;
                let value = match line.as_slice() {
                    b"00" => Value::Bool(false),
                    b"01" => Value::Bool(true),
                    digits => parse_int(digits).ok_or(UnpicklingError::BadLiteral { opcode: op })?,
                };
                self.push(value)?;
            }
            Opcode::BinInt => {
                let v = i32::from_le_bytes(self.read_array(op)?);
                self.push(Value::Int(v.into()))?;
            }
            Opcode::BinInt1 => {
                let [v] = self.read_array(op)?;
                self.push(Value::Int(v.into()))?;
            }
            Opcode::BinInt2 => {
                let v = u16::from_le_bytes(self.read_array(op)?);
                self.push(Value::Int(v.into()))?;
            }
            Opcode::Long => {
                let mut line = self.read_line(op)?;
                if line.last() == Some(&b'L') {
                    line.pop();
                }
                let value = parse_int(&line).ok_or(UnpicklingError::BadLiteral { opcode: op })?;
                self.push(value)?;
            }
            Opcode::Long1 => {
                let [n] = self.read_array(op)?;
                let bytes = self.read_bytes(n.into(), op)?;
                self.push(long_value(&bytes))?;
            }
            Opcode::Long4 => {
                let n = self.read_signed_len(op)?;
                let bytes = self.read_bytes(n, op)?;
                self.push(long_value(&bytes))?;
            }
            Opcode::Float => {
                let line = self.read_line(op)?;
                let value = core::str::from_utf8(&line)
                    .ok()
                    .and_then(|s| s.trim().parse::<f64>().ok())
                    .ok_or(UnpicklingError::BadLiteral { opcode: op })?;
                self.push(Value::Float(value))?;
            }
            Opcode::BinFloat => {
                let v = f64::from_be_bytes(self.read_array(op)?);
                self.push(Value::Float(v))?;
            }

            Opcode::String => {
                let line = self.read_line(op)?;
                let quoted = match line.as_slice() {
                    [q, inner @ .., end] if q == end && (*q == b'"' || *q == b'\'') => inner,
                    _ => return Err(UnpicklingError::BadLiteral { opcode: op }.into()),
                };
                let raw = text::escape_decode(quoted)
                    .map_err(|_| UnpicklingError::BadLiteral { opcode: op })?;
                let value = self.decode_string(&raw, op)?;
                self.push(value)?;
            }
            Opcode::BinString => {
                let n = self.read_signed_len(op)?;
                let raw = self.read_bytes(n, op)?;
                let value = self.decode_string(&raw, op)?;
                self.push(value)?;
            }
            Opcode::ShortBinString => {
                let [n] = self.read_array(op)?;
                let raw = self.read_bytes(n.into(), op)?;
                let value = self.decode_string(&raw, op)?;
                self.push(value)?;
            }
            Opcode::BinBytes => {
                let n = u32::from_le_bytes(self.read_array(op)?);
                let raw = self.read_bytes(n.into(), op)?;
                self.push(Value::Bytes(raw.into()))?;
            }
            Opcode::ShortBinBytes => {
                let [n] = self.read_array(op)?;
                let raw = self.read_bytes(n.into(), op)?;
                self.push(Value::Bytes(raw.into()))?;
            }
            Opcode::BinBytes8 => {
                let n = u64::from_le_bytes(self.read_array(op)?);
                let raw = self.read_bytes(n, op)?;
                self.push(Value::Bytes(raw.into()))?;
            }
            Opcode::ByteArray8 => {
                let n = u64::from_le_bytes(self.read_array(op)?);
                let raw = self.read_bytes(n, op)?;
                self.push(Value::bytearray(raw))?;
            }
            Opcode::Unicode => {
                let line = self.read_line(op)?;
                let s = text::raw_unicode_escape_decode(&line)
                    .ok_or(UnpicklingError::BadText { opcode: op })?;
                self.push(s.into())?;
            }
            Opcode::BinUnicode => {
                let n = u32::from_le_bytes(self.read_array(op)?);
                let s = self.read_utf8(n.into(), op)?;
                self.push(s.into())?;
            }
            Opcode::ShortBinUnicode => {
                let [n] = self.read_array(op)?;
                let s = self.read_utf8(n.into(), op)?;
                self.push(s.into())?;
            }
            Opcode::BinUnicode8 => {
                let n = u64::from_le_bytes(self.read_array(op)?);
                let s = self.read_utf8(n, op)?;
                self.push(s.into())?;
            }
            Opcode::NextBuffer => {
                let buffers = self.buffers.as_mut().ok_or(UnpicklingError::NoBuffers)?;
                let buffer = buffers.next().ok_or(UnpicklingError::NoBuffers)?;
                self.push(buffer)?;
            }
            Opcode::ReadOnlyBuffer => {
                let top = self.top_mut(op)?;
                if let Value::ByteArray(b) = top {
                    let frozen = Value::bytes(&b.borrow());
                    *top = frozen;
                }
            }

            Opcode::EmptyTuple => self.push(Value::tuple(Vec::new()))?,
            Opcode::Tuple => {
                let items = self.pop_mark(op)?;
                self.push(Value::tuple(items))?;
            }
            Opcode::Tuple1 | Opcode::Tuple2 | Opcode::Tuple3 => {
                let n = match op {
                    Opcode::Tuple1 => 1,
                    Opcode::Tuple2 => 2,
                    _ => 3,
                };
                if self.stack.len() < n {
                    return Err(UnpicklingError::StackUnderflow { opcode: op }.into());
                }
                let items = self.stack.split_off(self.stack.len() - n);
                self.push(Value::tuple(items))?;
            }
            Opcode::EmptyList => self.push(Value::list(Vec::new()))?,
            Opcode::List => {
                let items = self.pop_mark(op)?;
                self.push(Value::list(items))?;
            }
            Opcode::EmptyDict => self.push(Value::Dict(Rc::new(RefCell::new(Dict::new()))))?,
            Opcode::Dict => {
                let items = self.pop_mark(op)?;
                let pairs = pairs(items, op)?;
                let dict = Value::dict(pairs).map_err(unhashable)?;
                self.push(dict)?;
            }
            Opcode::EmptySet => self.push(Value::Set(Rc::new(RefCell::new(Set::new()))))?,
            Opcode::FrozenSet => {
                let items = self.pop_mark(op)?;
                let set = Value::frozenset(items).map_err(unhashable)?;
                self.push(set)?;
            }

            Opcode::Append => {
                let item = self.pop(op)?;
                self.append(vec_of(item), op)?;
            }
            Opcode::Appends => {
                let items = self.pop_mark(op)?;
                self.append(items, op)?;
            }
            Opcode::SetItem => {
                let value = self.pop(op)?;
                let key = self.pop(op)?;
                self.set_items(vec_of((key, value)), op)?;
            }
            Opcode::SetItems => {
                let items = self.pop_mark(op)?;
                let pairs = pairs(items, op)?;
                self.set_items(pairs, op)?;
            }
            Opcode::AddItems => {
                let items = self.pop_mark(op)?;
                let Value::Set(set) = self.top(op)? else {
                    return Err(wrong_type(op, "set"));
                };
                let mut set = set.borrow_mut();
                for item in items {
                    set.insert(item).map_err(unhashable)?;
                }
            }

            Opcode::Global => {
                let module = self.read_name_line(op)?;
                let name = self.read_name_line(op)?;
                let global = self.find_class(&module, &name)?;
                self.push(global)?;
            }
            Opcode::StackGlobal => {
                let name = self.pop(op)?;
                let module = self.pop(op)?;
                let (Some(module), Some(name)) = (module.as_str(), name.as_str()) else {
                    return Err(wrong_type(op, "str"));
                };
                let global = self.find_class(module, name)?;
                self.push(global)?;
            }
            Opcode::Ext1 => {
                let [code] = self.read_array(op)?;
                self.load_extension(code.into(), op)?;
            }
            Opcode::Ext2 => {
                let code = u16::from_le_bytes(self.read_array(op)?);
                self.load_extension(code.into(), op)?;
            }
            Opcode::Ext4 => {
                let code = i32::from_le_bytes(self.read_array(op)?);
                let code =
                    u32::try_from(code).map_err(|_| UnpicklingError::BadLiteral { opcode: op })?;
                self.load_extension(code, op)?;
            }

            Opcode::Reduce => {
                let args = self.pop(op)?;
                let func = self.pop(op)?;
                let Value::Tuple(args) = args else {
                    return Err(wrong_type(op, "tuple"));
                };
                let value = self.call(&func, args.to_vec(), op)?;
                self.push(value)?;
            }
            Opcode::NewObj => {
                let args = self.pop(op)?;
                let cls = self.pop(op)?;
                let Value::Tuple(args) = args else {
                    return Err(wrong_type(op, "tuple"));
                };
                let value = self.instantiate(&cls, args.to_vec())?;
                self.push(value)?;
            }
            Opcode::NewObjEx => {
                let kwargs = self.pop(op)?;
                let args = self.pop(op)?;
                let cls = self.pop(op)?;
                let Value::Tuple(args) = args else {
                    return Err(wrong_type(op, "tuple"));
                };
                let Value::Dict(kwargs) = kwargs else {
                    return Err(wrong_type(op, "dict"));
                };
                if !kwargs.borrow().is_empty() && !is_class(&cls) {
                    return Err(call_failed(
                        &cls,
                        CallError::new("keyword arguments are not supported"),
                    ));
                }
                let value = self.instantiate(&cls, args.to_vec())?;
                self.push(value)?;
            }
            Opcode::Obj => {
                let mut items = self.pop_mark(op)?;
                if items.is_empty() {
                    return Err(UnpicklingError::StackUnderflow { opcode: op }.into());
                }
                let cls = items.remove(0);
                let value = self.instantiate_or_call(&cls, items, op)?;
                self.push(value)?;
            }
            Opcode::Inst => {
                let module = self.read_name_line(op)?;
                let name = self.read_name_line(op)?;
                let cls = self.find_class(&module, &name)?;
                let args = self.pop_mark(op)?;
                let value = self.instantiate_or_call(&cls, args, op)?;
                self.push(value)?;
            }
            Opcode::Build => {
                let state = self.pop(op)?;
                let target = self.top(op)?.clone();
                self.build(target, state, op)?;
            }

            Opcode::Mark => {
                self.marked += self.stack.len();
                self.marks.push(mem::take(&mut self.stack));
            }
            Opcode::Pop => {
                if self.stack.pop().is_none() {
                    self.pop_mark(op)?;
                }
            }
            Opcode::PopMark => {
                self.pop_mark(op)?;
            }
            Opcode::Dup => {
                let top = self.top(op)?.clone();
                self.push(top)?;
            }

            Opcode::Get => {
                let id = self.read_decimal(op)?;
                self.get(id)?;
            }
            Opcode::BinGet => {
                let [id] = self.read_array(op)?;
                self.get(id.into())?;
            }
            Opcode::LongBinGet => {
                let id = u32::from_le_bytes(self.read_array(op)?);
                self.get(id.into())?;
            }
            Opcode::Put => {
                let id = self.read_decimal(op)?;
                self.put(id, op)?;
            }
            Opcode::BinPut => {
                let [id] = self.read_array(op)?;
                self.put(id.into(), op)?;
            }
            Opcode::LongBinPut => {
                let id = u32::from_le_bytes(self.read_array(op)?);
                self.put(id.into(), op)?;
            }
            Opcode::Memoize => {
                let id = u64::try_from(self.memo.len()).map_err(|_| limit("memo size"))?;
                self.put(id, op)?;
            }

            Opcode::Stop => {}
        }
        Ok(())
    }

    fn push(&mut self, value: Value) -> Result<()> {
        if self.height() >= self.limits.max_stack {
            return Err(limit("stack height"));
        }
        self.stack.push(value);
        Ok(())
    }

    fn pop(&mut self, op: Opcode) -> Result<Value> {
        self.stack
            .pop()
            .ok_or_else(|| UnpicklingError::StackUnderflow { opcode: op }.into())
    }

    fn top(&self, op: Opcode) -> Result<&Value> {
        self.stack
            .last()
            .ok_or_else(|| UnpicklingError::StackUnderflow { opcode: op }.into())
    }

    fn top_mut(&mut self, op: Opcode) -> Result<&mut Value> {
        self.stack
            .last_mut()
            .ok_or_else(|| UnpicklingError::StackUnderflow { opcode: op }.into())
    }

    fn pop_mark(&mut self, op: Opcode) -> Result<Vec<Value>> {
        let saved = self
            .marks
            .pop()
            .ok_or(UnpicklingError::MarkNotFound { opcode: op })?;
        self.marked -= saved.len();
        Ok(mem::replace(&mut self.stack, saved))
    }

    fn read_array<const N: usize>(&mut self, op: Opcode) -> Result<[u8; N]> {
        self.buf.clear();
        if self.input.read(N, &mut self.buf)? < N {
            return Err(UnpicklingError::Truncated { opcode: op }.into());
        }
        let mut out = [0_u8; N];
        out.copy_from_slice(&self.buf[..N]);
        Ok(out)
    }

    fn read_bytes(&mut self, n: u64, op: Opcode) -> Result<Vec<u8>> {
        if n > self.limits.max_frame_len {
            return Err(limit("argument length"));
        }
        let n = usize::try_from(n).map_err(|_| limit("argument length"))?;
        let mut out = Vec::with_capacity(n.min(crate::format::FRAME_SIZE_TARGET));
        if self.input.read(n, &mut out)? < n {
            return Err(UnpicklingError::Truncated { opcode: op }.into());
        }
        Ok(out)
    }

    fn read_signed_len(&mut self, op: Opcode) -> Result<u64> {
        let n = i32::from_le_bytes(self.read_array(op)?);
        u64::try_from(n).map_err(|_| UnpicklingError::NegativeLength { opcode: op }.into())
    }

    fn read_utf8(&mut self, n: u64, op: Opcode) -> Result<String> {
        let raw = self.read_bytes(n, op)?;
        String::from_utf8(raw).map_err(|_| UnpicklingError::BadText { opcode: op }.into())
    }

    /// Reads a newline-terminated argument, without the newline.
    fn read_line(&mut self, op: Opcode) -> Result<Vec<u8>> {
        let mut line = Vec::new();
        self.input.read_line(&mut line)?;
        if line.pop() != Some(b'\n') {
            return Err(UnpicklingError::Truncated { opcode: op }.into());
        }
        Ok(line)
    }

    fn read_name_line(&mut self, op: Opcode) -> Result<String> {
        let line = self.read_line(op)?;
        String::from_utf8(line).map_err(|_| UnpicklingError::BadText { opcode: op }.into())
    }

    fn read_decimal(&mut self, op: Opcode) -> Result<u64> {
        let line = self.read_line(op)?;
        core::str::from_utf8(&line)
            .ok()
            .and_then(|s| s.trim().parse::<u64>().ok())
            .ok_or_else(|| UnpicklingError::BadLiteral { opcode: op }.into())
    }

    fn decode_string(&self, raw: &[u8], op: Opcode) -> Result<Value> {
        match self.string_encoding.text() {
            None => Ok(Value::bytes(raw)),
            Some(encoding) => text::decode(raw, encoding)
                .map(Value::from)
                .ok_or_else(|| UnpicklingError::BadText { opcode: op }.into()),
        }
    }

    fn get(&mut self, id: u64) -> Result<()> {
        let value = self
            .memo
            .get(id)
            .cloned()
            .ok_or(UnpicklingError::MissingMemo { id })?;
        self.push(value)
    }

    fn put(&mut self, id: u64, op: Opcode) -> Result<()> {
        let value = self.top(op)?.clone();
        if self.memo.get(id).is_none() && self.memo.len() >= self.limits.max_memo {
            return Err(limit("memo size"));
        }
        self.memo.put(id, value);
        Ok(())
    }

    fn persistent_load(&mut self, pid: Value) -> Result<Value> {
        let hook = self
            .persistent_load
            .as_mut()
            .ok_or(UnpicklingError::NoPersistentLoad)?;
        hook(pid).map_err(|e| {
            UnpicklingError::Call {
                callable: "persistent_load".into(),
                message: e.message().into(),
            }
            .into()
        })
    }

    fn find_class(&self, module: &str, name: &str) -> Result<Value> {
        let (module, name) = if self.protocol < 3 && self.fix_imports {
            compat::to_current(module, name)
        } else {
            (module, name)
        };
        if let Some(global) = self.registry.decode_global(module, name) {
            return Ok(Value::Global(Rc::new(global)));
        }
        let missing = match self.registry.resolve(module, name) {
            Lookup::Found(symbol) => {
                return Ok(Value::Global(Rc::new(Global::resolved(
                    module,
                    name,
                    None,
                    Some(symbol),
                ))));
            }
            Lookup::MissingModule => MissingName::Module,
            Lookup::MissingAttribute => MissingName::Attribute,
        };
        Err(UnpicklingError::UnresolvedGlobal {
            module: module.into(),
            qualname: name.into(),
            missing,
        }
        .into())
    }

    fn load_extension(&mut self, code: u32, op: Opcode) -> Result<()> {
        if code == 0 {
            return Err(UnpicklingError::BadLiteral { opcode: op }.into());
        }
        let (module, name) = self
            .registry
            .extension(code)
            .ok_or(UnpicklingError::UnregisteredExtension { code })?;
        let global = self.find_class(&module, &name)?;
        self.push(global)
    }

    fn call(&mut self, func: &Value, args: Vec<Value>, op: Opcode) -> Result<Value> {
        let Value::Global(g) = func else {
            return Err(wrong_type(op, "callable"));
        };
        let Some(symbol) = g.symbol() else {
            return Err(call_failed(func, builtins::not_callable(g)));
        };
        let at = self.input.position();
        self.tracer.enter(ScopeKind::Call, g.qualname(), at);
        let result = symbol.call(args);
        self.tracer.exit(ScopeKind::Call, self.input.position());
        result.map_err(|e| call_failed(func, e))
    }

    fn instantiate(&mut self, cls: &Value, args: Vec<Value>) -> Result<Value> {
        let label = match cls {
            Value::Global(g) => g.qualname(),
            other => other.type_name(),
        };
        let at = self.input.position();
        self.tracer.enter(ScopeKind::Call, label, at);
        let result = builtins::instantiate(cls, args);
        self.tracer.exit(ScopeKind::Call, self.input.position());
        result.map_err(|e| call_failed(cls, e))
    }

    /// `INST`/`OBJ`: classes are instantiated without arguments, anything else is called.
    fn instantiate_or_call(&mut self, cls: &Value, args: Vec<Value>, op: Opcode) -> Result<Value> {
        if is_class(cls) && args.is_empty() {
            self.instantiate(cls, args)
        } else {
            self.call(cls, args, op)
        }
    }

    fn append(&mut self, items: Vec<Value>, op: Opcode) -> Result<()> {
        match self.top(op)? {
            Value::List(list) => {
                list.borrow_mut().extend(items);
                Ok(())
            }
            Value::Object(obj) => {
                let obj = obj.clone();
                for item in items {
                    native_hook(&obj, op, |o| o.append(item))
                        .map_err(|e| call_failed(&Value::Object(obj.clone()), e))?;
                }
                Ok(())
            }
            _ => Err(wrong_type(op, "list")),
        }
    }

    fn set_items(&mut self, pairs: Vec<(Value, Value)>, op: Opcode) -> Result<()> {
        match self.top(op)? {
            Value::Dict(dict) => {
                let mut dict = dict.borrow_mut();
                for (k, v) in pairs {
                    dict.insert(k, v).map_err(unhashable)?;
                }
                Ok(())
            }
            Value::Object(obj) => {
                let obj = obj.clone();
                for (k, v) in pairs {
                    native_hook(&obj, op, |o| o.set_item(k, v))
                        .map_err(|e| call_failed(&Value::Object(obj.clone()), e))?;
                }
                Ok(())
            }
            _ => Err(wrong_type(op, "dict")),
        }
    }

    fn build(&mut self, target: Value, state: Value, op: Opcode) -> Result<()> {
        match &target {
            Value::Object(obj) => self.build_object(&target, obj, state, op),
            Value::Instance(inst) => {
                let class = inst.borrow().class().clone();
                let at = self.input.position();
                if let Some(set_state) = class.set_state_fn() {
                    self.tracer.enter(ScopeKind::Call, class.qualname(), at);
                    let result = set_state(&mut *inst.borrow_mut(), state);
                    self.tracer.exit(ScopeKind::Call, self.input.position());
                    return result.map_err(|e| call_failed(&target, e));
                }
                let mut inst = inst.borrow_mut();
                match state {
                    Value::Tuple(parts) if parts.len() == 2 => {
                        merge_state(&mut inst, &parts[0], op)?;
                        merge_state(&mut inst, &parts[1], op)
                    }
                    state => merge_state(&mut inst, &state, op),
                }
            }
            _ => Err(wrong_type(op, "object with settable state")),
        }
    }

    fn build_object(&mut self, target: &Value, obj: &Object, state: Value, op: Opcode) -> Result<()> {
        let label = short_type_name(obj.type_name());
        let at = self.input.position();
        self.tracer.enter(ScopeKind::Call, label, at);
        let result = match self.registry.find(obj.type_id()).filter(|e| e.has_state_hook()) {
            Some(entry) => entry.apply_state(obj, state).unwrap_or(Ok(None)),
            None => native_hook(obj, op, |o| o.set_state(state)).map(|()| None),
        };
        self.tracer.exit(ScopeKind::Call, self.input.position());
        let replacement = result.map_err(|e| call_failed(target, e))?;
        if let Some(replacement) = replacement {
            if let Some(old) = target.identity() {
                self.memo.replace_identity(old, &replacement);
            }
            *self.top_mut(op)? = replacement;
        }
        Ok(())
    }
}

/// Runs a [`NativeObject`](crate::NativeObject) hook, treating an absent hook as a type error.
fn native_hook(
    obj: &Object,
    op: Opcode,
    f: impl FnOnce(&mut dyn crate::value::NativeObject) -> Option<Result<(), CallError>>,
) -> Result<(), CallError> {
    match obj.with_dyn_mut(f) {
        Some(Some(result)) => result,
        Some(None) => Err(CallError::new(format!(
            "{} does not support {}",
            short_type_name(obj.type_name()),
            op.name()
        ))),
        None => Err(CallError::new(format!(
            "{} is already borrowed",
            short_type_name(obj.type_name())
        ))),
    }
}

fn merge_state(inst: &mut Instance, state: &Value, op: Opcode) -> Result<()> {
    match state {
        Value::None => Ok(()),
        Value::Dict(d) => {
            for (k, v) in d.borrow().iter() {
                inst.attrs_mut()
                    .insert(k.clone(), v.clone())
                    .map_err(unhashable)?;
            }
            Ok(())
        }
        _ => Err(wrong_type(op, "dict")),
    }
}

fn is_class(v: &Value) -> bool {
    v.as_global().is_some_and(|g| g.class().is_some())
}

fn vec_of<T>(item: T) -> Vec<T> {
    vec![item]
}

fn pairs(items: Vec<Value>, op: Opcode) -> Result<Vec<(Value, Value)>> {
    if !items.len().is_multiple_of(2) {
        return Err(UnpicklingError::StackUnderflow { opcode: op }.into());
    }
    let mut out = Vec::with_capacity(items.len() / 2);
    let mut it = items.into_iter();
    while let (Some(k), Some(v)) = (it.next(), it.next()) {
        out.push((k, v));
    }
    Ok(out)
}

fn parse_int(digits: &[u8]) -> Option<Value> {
    let s = core::str::from_utf8(digits).ok()?.trim();
    if let Ok(i) = s.parse::<i64>() {
        return Some(Value::Int(i));
    }
    BigInt::parse_bytes(s.as_bytes(), 10).map(Value::from)
}

fn long_value(bytes: &[u8]) -> Value {
    match read_long_i64(bytes) {
        Some(i) => Value::Int(i),
        None => Value::from(decode_long(bytes)),
    }
}

fn limit(name: &'static str) -> PickleError {
    UnpicklingError::LimitExceeded { limit: name }.into()
}

fn wrong_type(op: Opcode, expected: &'static str) -> PickleError {
    UnpicklingError::WrongType {
        opcode: op,
        expected,
    }
    .into()
}

fn unhashable(e: Unhashable) -> PickleError {
    UnpicklingError::Unhashable {
        type_name: e.type_name,
    }
    .into()
}

fn call_failed(callable: &Value, e: CallError) -> PickleError {
    let callable = match callable {
        Value::Global(g) => format!("{}.{}", g.module().unwrap_or("?"), g.qualname()),
        Value::Object(o) => String::from(short_type_name(o.type_name())),
        Value::Instance(i) => String::from(i.borrow().class().qualname()),
        other => String::from(other.type_name()),
    };
    UnpicklingError::Call {
        callable: callable.into(),
        message: e.message().into(),
    }
    .into()
}

impl<S> fmt::Debug for Unpickler<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unpickler")
            .field("protocol", &self.protocol)
            .field("stack", &self.stack.len())
            .field("marks", &self.marks.len())
            .field("memo", &self.memo.len())
            .field("limits", &self.limits)
            .field("string_encoding", &self.string_encoding)
            .field("fix_imports", &self.fix_imports)
            .field("persistent_load", &self.persistent_load.is_some())
            .field("buffers", &self.buffers.is_some())
            .field("tracer", &self.tracer)
            .finish_non_exhaustive()
    }
}
