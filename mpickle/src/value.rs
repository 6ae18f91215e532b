// Copyright 2026 the Execution Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The value model.
//!
//! [`Value`] is a closed set of variants covering every kind the wire format can describe
//! natively. Everything else enters through one of two open extension points:
//!
//! - [`Instance`]: a generic attribute bag whose class is a [`ClassDef`] declared in a
//!   [`Registry`](crate::Registry) namespace.
//! - [`Object`]: a host value implementing [`NativeObject`], encoded through a registry entry or
//!   its own [`NativeObject::reduce`] hook.
//!
//! Mutable containers are shared through `Rc<RefCell<..>>`, so identity is pointer identity and
//! cloning a `Value` never deep-copies. Equality follows the wire format's equivalence rules:
//! `True == 1 == 1.0 == (1+0j)`, `b"a" == bytearray(b"a")`, and dictionaries and sets compare
//! independent of order.
//!
//! Cyclic graphs are representable. `Rc` cannot reclaim them, and comparing two distinct cyclic
//! graphs for equality does not terminate.

use alloc::boxed::Box;
use alloc::format;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::any::{Any, TypeId};
use core::cell::{Ref, RefCell, RefMut};
use core::fmt;
use core::hash::Hasher;

use num_bigint::BigInt;
use num_traits::{FromPrimitive, ToPrimitive};

use crate::aggregates::{Dict, Set, Unhashable};
use crate::error::{CallError, PicklingError};

/// A complex number.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Complex {
    /// Real part.
    pub re: f64,
    /// Imaginary part.
    pub im: f64,
}

/// A decoded or encodable value.
#[derive(Clone)]
pub enum Value {
    /// `None`.
    None,
    /// `True` / `False`.
    Bool(bool),
    /// An integer that fits in `i64`.
    Int(i64),
    /// An integer outside the `i64` range.
    Long(BigInt),
    /// A double-precision float.
    Float(f64),
    /// A complex number.
    Complex(Complex),
    /// Unicode text.
    Str(Rc<str>),
    /// An immutable byte string.
    Bytes(Rc<[u8]>),
    /// A mutable byte buffer.
    ByteArray(Rc<RefCell<Vec<u8>>>),
    /// A mutable sequence.
    List(Rc<RefCell<Vec<Value>>>),
    /// An immutable sequence.
    Tuple(Rc<[Value]>),
    /// A mapping with unique keys.
    Dict(Rc<RefCell<Dict>>),
    /// A mutable set.
    Set(Rc<RefCell<Set>>),
    /// An immutable set.
    FrozenSet(Rc<Set>),
    /// A reference to a module-level type or callable.
    Global(Rc<Global>),
    /// An instance of a [`ClassDef`].
    Instance(Rc<RefCell<Instance>>),
    /// A host object.
    Object(Object),
}

impl Value {
    /// Builds a list.
    #[must_use]
    pub fn list(items: Vec<Self>) -> Self {
        Self::List(Rc::new(RefCell::new(items)))
    }

    /// Builds a tuple.
    #[must_use]
    pub fn tuple(items: Vec<Self>) -> Self {
        Self::Tuple(items.into())
    }

    /// Builds a byte string.
    #[must_use]
    pub fn bytes(bytes: &[u8]) -> Self {
        Self::Bytes(bytes.into())
    }

    /// Builds a mutable byte buffer.
    #[must_use]
    pub fn bytearray(bytes: Vec<u8>) -> Self {
        Self::ByteArray(Rc::new(RefCell::new(bytes)))
    }

    /// Builds a complex number.
    #[must_use]
    pub fn complex(re: f64, im: f64) -> Self {
        Self::Complex(Complex { re, im })
    }

    /// Builds a dictionary from key/value pairs; later duplicates win.
    pub fn dict(pairs: impl IntoIterator<Item = (Self, Self)>) -> Result<Self, Unhashable> {
        let mut d = Dict::new();
        for (k, v) in pairs {
            d.insert(k, v)?;
        }
        Ok(Self::Dict(Rc::new(RefCell::new(d))))
    }

    /// Builds a mutable set.
    pub fn set(items: impl IntoIterator<Item = Self>) -> Result<Self, Unhashable> {
        Ok(Self::Set(Rc::new(RefCell::new(collect_set(items)?))))
    }

    /// Builds an immutable set.
    pub fn frozenset(items: impl IntoIterator<Item = Self>) -> Result<Self, Unhashable> {
        Ok(Self::FrozenSet(Rc::new(collect_set(items)?)))
    }

    /// Builds a global reference.
    #[must_use]
    pub fn global(module: &str, qualname: &str) -> Self {
        Self::Global(Rc::new(Global::new(module, qualname)))
    }

    /// Wraps a host object.
    #[must_use]
    pub fn object<T: NativeObject>(value: T) -> Self {
        Self::Object(Object::new(value))
    }

    /// Wraps an instance.
    #[must_use]
    pub fn instance(instance: Instance) -> Self {
        Self::Instance(Rc::new(RefCell::new(instance)))
    }

    /// Returns `true` for `None`.
    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Returns the integer value if it fits `i64` (booleans count as integers).
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Bool(b) => Some(i64::from(*b)),
            Self::Int(i) => Some(*i),
            Self::Long(b) => b.to_i64(),
            _ => None,
        }
    }

    /// Returns any integer as a [`BigInt`].
    #[must_use]
    pub fn as_bigint(&self) -> Option<BigInt> {
        match self {
            Self::Bool(b) => Some(BigInt::from(u8::from(*b))),
            Self::Int(i) => Some(BigInt::from(*i)),
            Self::Long(b) => Some(b.clone()),
            _ => None,
        }
    }

    /// Returns the value as a float if it is a real number.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            Self::Bool(b) => Some(f64::from(u8::from(*b))),
            Self::Long(b) => b.to_f64(),
            _ => None,
        }
    }

    /// Borrows text.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Borrows an immutable byte string.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Borrows tuple elements.
    #[must_use]
    pub fn as_tuple(&self) -> Option<&[Self]> {
        match self {
            Self::Tuple(t) => Some(t),
            _ => None,
        }
    }

    /// Returns the shared list.
    #[must_use]
    pub fn as_list(&self) -> Option<&Rc<RefCell<Vec<Self>>>> {
        match self {
            Self::List(l) => Some(l),
            _ => None,
        }
    }

    /// Returns the shared dictionary.
    #[must_use]
    pub fn as_dict(&self) -> Option<&Rc<RefCell<Dict>>> {
        match self {
            Self::Dict(d) => Some(d),
            _ => None,
        }
    }

    /// Returns the global reference.
    #[must_use]
    pub fn as_global(&self) -> Option<&Rc<Global>> {
        match self {
            Self::Global(g) => Some(g),
            _ => None,
        }
    }

    /// Returns the shared instance.
    #[must_use]
    pub fn as_instance(&self) -> Option<&Rc<RefCell<Instance>>> {
        match self {
            Self::Instance(i) => Some(i),
            _ => None,
        }
    }

    /// Returns the host object.
    #[must_use]
    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Returns the wire-format name of the value's type.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::None => "NoneType",
            Self::Bool(_) => "bool",
            Self::Int(_) | Self::Long(_) => "int",
            Self::Float(_) => "float",
            Self::Complex(_) => "complex",
            Self::Str(_) => "str",
            Self::Bytes(_) => "bytes",
            Self::ByteArray(_) => "bytearray",
            Self::List(_) => "list",
            Self::Tuple(_) => "tuple",
            Self::Dict(_) => "dict",
            Self::Set(_) => "set",
            Self::FrozenSet(_) => "frozenset",
            Self::Global(_) => "type",
            Self::Instance(_) => "object",
            Self::Object(o) => short_type_name(o.type_name()),
        }
    }

    /// Returns the identity of a shared value, or `None` for values without one.
    ///
    /// Atomic values and the empty tuple have no identity and are never memoized.
    #[must_use]
    pub fn identity(&self) -> Option<usize> {
        match self {
            Self::ByteArray(rc) => Some(Rc::as_ptr(rc).addr()),
            Self::List(rc) => Some(Rc::as_ptr(rc).addr()),
            Self::Tuple(rc) if !rc.is_empty() => Some(Rc::as_ptr(rc).cast::<u8>().addr()),
            Self::Dict(rc) => Some(Rc::as_ptr(rc).addr()),
            Self::Set(rc) => Some(Rc::as_ptr(rc).addr()),
            Self::FrozenSet(rc) => Some(Rc::as_ptr(rc).addr()),
            Self::Global(rc) => Some(Rc::as_ptr(rc).addr()),
            Self::Instance(rc) => Some(Rc::as_ptr(rc).addr()),
            Self::Object(o) => Some(o.identity()),
            _ => None,
        }
    }

    /// Returns `true` if both values are the same shared object.
    #[must_use]
    pub fn is_same(&self, other: &Self) -> bool {
        matches!((self.identity(), other.identity()), (Some(a), Some(b)) if a == b)
    }

    /// Feeds a hash consistent with `==` into `state`.
    pub(crate) fn hash_into<H: Hasher>(&self, state: &mut H) -> Result<(), Unhashable> {
        match self {
            Self::None => state.write_u8(0),
            Self::Bool(b) => hash_int(state, i64::from(*b)),
            Self::Int(i) => hash_int(state, *i),
            Self::Long(b) => hash_big(state, b),
            Self::Float(f) => hash_float(state, *f),
            Self::Complex(c) => {
                if c.im == 0.0 {
                    hash_float(state, c.re);
                } else {
                    state.write_u8(4);
                    state.write_u64(c.re.to_bits());
                    state.write_u64(c.im.to_bits());
                }
            }
            Self::Str(s) => {
                state.write_u8(5);
                state.write(s.as_bytes());
                state.write_u8(0xff);
            }
            Self::Bytes(b) => {
                state.write_u8(6);
                state.write(b);
                state.write_usize(b.len());
            }
            Self::Tuple(items) => {
                state.write_u8(7);
                state.write_usize(items.len());
                for item in items.iter() {
                    item.hash_into(state)?;
                }
            }
            Self::FrozenSet(s) => {
                state.write_u8(8);
                state.write_usize(s.len());
            }
            Self::Global(g) => {
                state.write_u8(9);
                state.write(g.qualname.as_bytes());
            }
            Self::Instance(i) => {
                state.write_u8(10);
                if let Ok(i) = i.try_borrow() {
                    state.write(i.class.qualname.as_bytes());
                }
            }
            Self::Object(o) => {
                state.write_u8(11);
                state.write(o.type_name().as_bytes());
            }
            Self::ByteArray(_) | Self::List(_) | Self::Dict(_) | Self::Set(_) => {
                return Err(Unhashable {
                    type_name: self.type_name(),
                });
            }
        }
        Ok(())
    }

    fn num_view(&self) -> Option<Num<'_>> {
        Some(match self {
            Self::Bool(b) => Num::Int(Int::Small(i64::from(*b))),
            Self::Int(i) => Num::Int(Int::Small(*i)),
            Self::Long(b) => Num::Int(Int::Big(b)),
            Self::Float(f) => Num::Float(*f),
            Self::Complex(c) => Num::Complex(*c),
            _ => return None,
        })
    }

    fn fmt_depth(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        const MAX_DEPTH: usize = 24;
        if depth > MAX_DEPTH {
            return f.write_str("...");
        }
        let seq = |f: &mut fmt::Formatter<'_>, items: &[Self], open, close| -> fmt::Result {
            f.write_str(open)?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                item.fmt_depth(f, depth + 1)?;
            }
            if close == ",)" && items.len() != 1 {
                return f.write_str(")");
            }
            f.write_str(close)
        };
        match self {
            Self::None => f.write_str("None"),
            Self::Bool(true) => f.write_str("True"),
            Self::Bool(false) => f.write_str("False"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Long(b) => write!(f, "{b}"),
            Self::Float(x) => write!(f, "{x:?}"),
            Self::Complex(c) => write!(f, "({:?}{:+?}j)", c.re, c.im),
            Self::Str(s) => write!(f, "{:?}", &**s),
            Self::Bytes(b) => write!(f, "b{:?}", BytesRepr(b)),
            Self::ByteArray(b) => match b.try_borrow() {
                Ok(b) => write!(f, "bytearray(b{:?})", BytesRepr(&b)),
                Err(_) => f.write_str("bytearray(<borrowed>)"),
            },
            Self::List(l) => match l.try_borrow() {
                Ok(l) => seq(f, &l, "[", "]"),
                Err(_) => f.write_str("[<borrowed>]"),
            },
            Self::Tuple(t) => seq(f, t, "(", ",)"),
            Self::Dict(d) => match d.try_borrow() {
                Ok(d) => fmt_dict(f, &d, depth),
                Err(_) => f.write_str("{<borrowed>}"),
            },
            Self::Set(s) => match s.try_borrow() {
                Ok(s) if s.is_empty() => f.write_str("set()"),
                Ok(s) => fmt_set(f, &s, depth),
                Err(_) => f.write_str("{<borrowed>}"),
            },
            Self::FrozenSet(s) => {
                f.write_str("frozenset(")?;
                if !s.is_empty() {
                    fmt_set(f, s, depth)?;
                }
                f.write_str(")")
            }
            Self::Global(g) => write!(f, "{g:?}"),
            Self::Instance(i) => match i.try_borrow() {
                Ok(i) => {
                    write!(f, "<{} ", i.class.qualname)?;
                    fmt_dict(f, &i.attrs, depth)?;
                    f.write_str(">")
                }
                Err(_) => f.write_str("<instance <borrowed>>"),
            },
            Self::Object(o) => write!(f, "{o:?}"),
        }
    }
}

fn fmt_dict(f: &mut fmt::Formatter<'_>, d: &Dict, depth: usize) -> fmt::Result {
    f.write_str("{")?;
    for (i, (k, v)) in d.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        k.fmt_depth(f, depth + 1)?;
        f.write_str(": ")?;
        v.fmt_depth(f, depth + 1)?;
    }
    f.write_str("}")
}

fn fmt_set(f: &mut fmt::Formatter<'_>, s: &Set, depth: usize) -> fmt::Result {
    f.write_str("{")?;
    for (i, item) in s.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        item.fmt_depth(f, depth + 1)?;
    }
    f.write_str("}")
}

struct BytesRepr<'a>(&'a [u8]);

impl fmt::Debug for BytesRepr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("'")?;
        for &b in self.0 {
            match b {
                b'\\' => f.write_str("\\\\")?,
                b'\'' => f.write_str("\\'")?,
                b'\n' => f.write_str("\\n")?,
                b'\r' => f.write_str("\\r")?,
                b'\t' => f.write_str("\\t")?,
                0x20..=0x7e => write!(f, "{}", char::from(b))?,
                _ => write!(f, "\\x{b:02x}")?,
            }
        }
        f.write_str("'")
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_depth(f, 0)
    }
}

fn collect_set(items: impl IntoIterator<Item = Value>) -> Result<Set, Unhashable> {
    let mut s = Set::new();
    for item in items {
        s.insert(item)?;
    }
    Ok(s)
}

const TWO_POW_63: f64 = 9_223_372_036_854_775_808.0;

#[derive(Clone, Copy)]
enum Int<'a> {
    Small(i64),
    Big(&'a BigInt),
}

#[derive(Clone, Copy)]
enum Num<'a> {
    Int(Int<'a>),
    Float(f64),
    Complex(Complex),
}

enum OwnedInt {
    Small(i64),
    Big(BigInt),
}

fn integral_float(f: f64) -> Option<OwnedInt> {
    if !f.is_finite() {
        return None;
    }
    if (-TWO_POW_63..TWO_POW_63).contains(&f) {
        #[allow(clippy::cast_possible_truncation, reason = "range checked just above")]
        let i = f as i64;
        return (i as f64 == f).then_some(OwnedInt::Small(i));
    }
    // Every finite double this large is integral.
    BigInt::from_f64(f).map(OwnedInt::Big)
}

fn int_eq(a: Int<'_>, b: Int<'_>) -> bool {
    match (a, b) {
        (Int::Small(x), Int::Small(y)) => x == y,
        (Int::Small(x), Int::Big(y)) | (Int::Big(y), Int::Small(x)) => y.to_i64() == Some(x),
        (Int::Big(x), Int::Big(y)) => x == y,
    }
}

fn num_eq(a: Num<'_>, b: Num<'_>) -> bool {
    match (a, b) {
        (Num::Complex(x), Num::Complex(y)) => x.re == y.re && x.im == y.im,
        (Num::Complex(x), other) | (other, Num::Complex(x)) => {
            x.im == 0.0 && num_eq(Num::Float(x.re), other)
        }
        (Num::Float(x), Num::Float(y)) => x == y,
        (Num::Float(x), Num::Int(i)) | (Num::Int(i), Num::Float(x)) => match integral_float(x) {
            Some(OwnedInt::Small(s)) => int_eq(Int::Small(s), i),
            Some(OwnedInt::Big(b)) => int_eq(Int::Big(&b), i),
            None => false,
        },
        (Num::Int(x), Num::Int(y)) => int_eq(x, y),
    }
}

fn hash_int<H: Hasher>(state: &mut H, i: i64) {
    state.write_u8(2);
    state.write_i64(i);
}

fn hash_big<H: Hasher>(state: &mut H, b: &BigInt) {
    match b.to_i64() {
        Some(i) => hash_int(state, i),
        None => {
            state.write_u8(12);
            state.write(&b.to_signed_bytes_le());
        }
    }
}

fn hash_float<H: Hasher>(state: &mut H, f: f64) {
    match integral_float(f) {
        Some(OwnedInt::Small(i)) => hash_int(state, i),
        Some(OwnedInt::Big(b)) => hash_big(state, &b),
        None => {
            state.write_u8(3);
            state.write_u64(f.to_bits());
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        if let (Some(a), Some(b)) = (self.num_view(), other.num_view()) {
            return num_eq(a, b);
        }
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            (Self::Bytes(a), Self::ByteArray(b)) | (Self::ByteArray(b), Self::Bytes(a)) => {
                **a == *b.borrow().as_slice()
            }
            (Self::ByteArray(a), Self::ByteArray(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Self::List(a), Self::List(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Self::Tuple(a), Self::Tuple(b)) => Rc::ptr_eq(a, b) || a[..] == b[..],
            (Self::Dict(a), Self::Dict(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Self::Set(a), Self::Set(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Self::Set(a), Self::FrozenSet(b)) | (Self::FrozenSet(b), Self::Set(a)) => {
                *a.borrow() == **b
            }
            (Self::FrozenSet(a), Self::FrozenSet(b)) => Rc::ptr_eq(a, b) || a == b,
            (Self::Global(a), Self::Global(b)) => a == b,
            (Self::Instance(a), Self::Instance(b)) => {
                Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow()
            }
            (Self::Object(a), Self::Object(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

macro_rules! from_small_int {
    ($($t:ty),*) => {$(
        impl From<$t> for Value {
            fn from(i: $t) -> Self {
                Self::Int(i64::from(i))
            }
        }
    )*};
}

from_small_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<u64> for Value {
    fn from(i: u64) -> Self {
        match i64::try_from(i) {
            Ok(i) => Self::Int(i),
            Err(_) => Self::Long(BigInt::from(i)),
        }
    }
}

impl From<BigInt> for Value {
    /// Normalizes to [`Value::Int`] when the value fits.
    fn from(b: BigInt) -> Self {
        match b.to_i64() {
            Some(i) => Self::Int(i),
            None => Self::Long(b),
        }
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<Complex> for Value {
    fn from(c: Complex) -> Self {
        Self::Complex(c)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s.into())
    }
}

impl From<Global> for Value {
    fn from(g: Global) -> Self {
        Self::Global(Rc::new(g))
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::None, Into::into)
    }
}

/// Returns the last path segment of a Rust type name, without generic arguments.
pub(crate) fn short_type_name(full: &str) -> &str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Returns the dotted module path of a Rust type name, if it has one.
pub(crate) fn type_module_path(full: &str) -> Option<String> {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit_once("::").map(|(m, _)| m.replace("::", "."))
}

/// A native callable exposed in a namespace.
pub type CallFn = Rc<dyn Fn(Vec<Value>) -> Result<Value, CallError>>;

/// Derives the state of an [`Instance`] for encoding.
pub type GetStateFn = Rc<dyn Fn(&Instance) -> Value>;

/// Applies decoded state to an [`Instance`].
pub type SetStateFn = Rc<dyn Fn(&mut Instance, Value) -> Result<(), CallError>>;

/// Something a global reference can resolve to.
#[derive(Clone)]
pub enum Symbol {
    /// A plain callable.
    Function(CallFn),
    /// A class whose instances are [`Instance`]s.
    Class(Rc<ClassDef>),
}

impl Symbol {
    /// Wraps a closure as a callable symbol.
    pub fn function(f: impl Fn(Vec<Value>) -> Result<Value, CallError> + 'static) -> Self {
        Self::Function(Rc::new(f))
    }

    /// Calls the symbol. Classes take no arguments and produce an empty instance.
    pub fn call(&self, args: Vec<Value>) -> Result<Value, CallError> {
        match self {
            Self::Function(f) => f(args),
            Self::Class(class) => {
                if !args.is_empty() {
                    return Err(CallError::new(format!(
                        "{}() takes no arguments",
                        class.qualname
                    )));
                }
                Ok(Value::instance(Instance::new(class.clone())))
            }
        }
    }

    /// Returns `true` if both symbols are the same callable or class.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Function(a), Self::Function(b)) => Rc::ptr_eq(a, b),
            (Self::Class(a), Self::Class(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Function(_) => f.write_str("Symbol::Function(..)"),
            Self::Class(c) => write!(f, "Symbol::Class({}.{})", c.module, c.qualname),
        }
    }
}

/// A module-level name: a class, a callable, or a registered host type.
#[derive(Clone)]
pub struct Global {
    module: Option<Box<str>>,
    qualname: Box<str>,
    type_id: Option<TypeId>,
    symbol: Option<Symbol>,
}

impl Global {
    /// Names `module.qualname`; resolved when encoded or called.
    #[must_use]
    pub fn new(module: &str, qualname: &str) -> Self {
        Self {
            module: Some(module.into()),
            qualname: qualname.into(),
            type_id: None,
            symbol: None,
        }
    }

    /// Refers to the registered host type `T`; its wire name comes from the registry.
    #[must_use]
    pub fn of<T: Any>() -> Self {
        Self {
            module: None,
            qualname: short_type_name(core::any::type_name::<T>()).into(),
            type_id: Some(TypeId::of::<T>()),
            symbol: None,
        }
    }

    /// Refers to a class.
    #[must_use]
    pub fn from_class(class: &Rc<ClassDef>) -> Self {
        Self {
            module: Some(class.module.clone()),
            qualname: class.qualname.clone(),
            type_id: None,
            symbol: Some(Symbol::Class(class.clone())),
        }
    }

    pub(crate) fn resolved(
        module: &str,
        qualname: &str,
        type_id: Option<TypeId>,
        symbol: Option<Symbol>,
    ) -> Self {
        Self {
            module: Some(module.into()),
            qualname: qualname.into(),
            type_id,
            symbol,
        }
    }

    /// Returns the module path, if known.
    #[must_use]
    pub fn module(&self) -> Option<&str> {
        self.module.as_deref()
    }

    /// Returns the qualified name inside the module.
    #[must_use]
    pub fn qualname(&self) -> &str {
        &self.qualname
    }

    /// Returns the host type this global names, if any.
    #[must_use]
    pub fn type_id(&self) -> Option<TypeId> {
        self.type_id
    }

    /// Returns the resolved symbol, if this global was resolved.
    #[must_use]
    pub fn symbol(&self) -> Option<&Symbol> {
        self.symbol.as_ref()
    }

    /// Returns the class if this global resolved to one.
    #[must_use]
    pub fn class(&self) -> Option<&Rc<ClassDef>> {
        match &self.symbol {
            Some(Symbol::Class(c)) => Some(c),
            _ => None,
        }
    }
}

impl PartialEq for Global {
    fn eq(&self, other: &Self) -> bool {
        if let (Some(a), Some(b)) = (self.type_id, other.type_id) {
            return a == b;
        }
        self.qualname == other.qualname
            && match (&self.module, &other.module) {
                (Some(a), Some(b)) => a == b,
                _ => true,
            }
    }
}

impl fmt::Debug for Global {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.module {
            Some(m) => write!(f, "<global {m}.{}>", self.qualname),
            None => write!(f, "<global {}>", self.qualname),
        }
    }
}

/// A class whose instances carry an attribute dictionary.
pub struct ClassDef {
    module: Box<str>,
    qualname: Box<str>,
    get_state: Option<GetStateFn>,
    set_state: Option<SetStateFn>,
}

impl ClassDef {
    /// Declares `module.qualname` with default state handling.
    #[must_use]
    pub fn new(module: &str, qualname: &str) -> Self {
        Self {
            module: module.into(),
            qualname: qualname.into(),
            get_state: None,
            set_state: None,
        }
    }

    /// Overrides the state written for instances (the attribute dict by default).
    #[must_use]
    pub fn with_get_state(mut self, f: impl Fn(&Instance) -> Value + 'static) -> Self {
        self.get_state = Some(Rc::new(f));
        self
    }

    /// Overrides how decoded state is applied (merged into the attributes by default).
    #[must_use]
    pub fn with_set_state(
        mut self,
        f: impl Fn(&mut Instance, Value) -> Result<(), CallError> + 'static,
    ) -> Self {
        self.set_state = Some(Rc::new(f));
        self
    }

    /// Returns the module path.
    #[must_use]
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Returns the qualified name.
    #[must_use]
    pub fn qualname(&self) -> &str {
        &self.qualname
    }

    pub(crate) fn get_state_fn(&self) -> Option<&GetStateFn> {
        self.get_state.as_ref()
    }

    pub(crate) fn set_state_fn(&self) -> Option<&SetStateFn> {
        self.set_state.as_ref()
    }
}

impl fmt::Debug for ClassDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDef")
            .field("module", &self.module)
            .field("qualname", &self.qualname)
            .field("get_state", &self.get_state.is_some())
            .field("set_state", &self.set_state.is_some())
            .finish()
    }
}

/// An instance of a [`ClassDef`].
#[derive(Clone, Debug)]
pub struct Instance {
    class: Rc<ClassDef>,
    attrs: Dict,
}

impl Instance {
    /// Creates an instance with no attributes.
    #[must_use]
    pub fn new(class: Rc<ClassDef>) -> Self {
        Self {
            class,
            attrs: Dict::new(),
        }
    }

    /// Returns the class.
    #[must_use]
    pub fn class(&self) -> &Rc<ClassDef> {
        &self.class
    }

    /// Borrows the attribute dictionary.
    #[must_use]
    pub fn attrs(&self) -> &Dict {
        &self.attrs
    }

    /// Mutably borrows the attribute dictionary.
    pub fn attrs_mut(&mut self) -> &mut Dict {
        &mut self.attrs
    }

    /// Reads attribute `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attrs.get_str(name)
    }

    /// Sets attribute `name`, returning the previous value.
    pub fn set(&mut self, name: &str, value: Value) -> Option<Value> {
        self.attrs.insert(Value::from(name), value).ok().flatten()
    }
}

impl PartialEq for Instance {
    fn eq(&self, other: &Self) -> bool {
        let same_class = Rc::ptr_eq(&self.class, &other.class)
            || (self.class.module == other.class.module
                && self.class.qualname == other.class.qualname);
        same_class && self.attrs == other.attrs
    }
}

/// A host value that can take part in encoding and decoding.
///
/// Every hook is optional. Hooks left at their default report `None`, which makes the codec
/// fall back to the next mechanism (or fail if there is none).
pub trait NativeObject: Any + fmt::Debug {
    /// Describes how to rebuild `self`.
    fn reduce(&self, _protocol: u8) -> Option<Result<Reduction, CallError>> {
        None
    }

    /// Applies state decoded by `BUILD`.
    fn set_state(&mut self, _state: Value) -> Option<Result<(), CallError>> {
        None
    }

    /// Appends one item decoded by `APPEND`/`APPENDS`.
    fn append(&mut self, _item: Value) -> Option<Result<(), CallError>> {
        None
    }

    /// Stores one entry decoded by `SETITEM`/`SETITEMS`.
    fn set_item(&mut self, _key: Value, _value: Value) -> Option<Result<(), CallError>> {
        None
    }

    /// Structural equality against another host value.
    fn eq_dyn(&self, _other: &dyn Any) -> bool {
        false
    }
}

/// A shared host object.
#[derive(Clone)]
pub struct Object {
    inner: Rc<RefCell<dyn NativeObject>>,
    type_id: TypeId,
    type_name: &'static str,
}

impl Object {
    /// Wraps `value`.
    pub fn new<T: NativeObject>(value: T) -> Self {
        Self {
            inner: Rc::new(RefCell::new(value)),
            type_id: TypeId::of::<T>(),
            type_name: core::any::type_name::<T>(),
        }
    }

    /// Returns the concrete type id.
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns the full Rust type name.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns `true` if the object is a `T`.
    #[must_use]
    pub fn is<T: NativeObject>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// Borrows the object as a `T`; `None` on type mismatch or an outstanding mutable borrow.
    #[must_use]
    pub fn borrow<T: NativeObject>(&self) -> Option<Ref<'_, T>> {
        let guard = self.inner.try_borrow().ok()?;
        Ref::filter_map(guard, |o| (o as &dyn Any).downcast_ref::<T>()).ok()
    }

    /// Mutably borrows the object as a `T`; `None` on type mismatch or an outstanding borrow.
    #[must_use]
    pub fn borrow_mut<T: NativeObject>(&self) -> Option<RefMut<'_, T>> {
        let guard = self.inner.try_borrow_mut().ok()?;
        RefMut::filter_map(guard, |o| (o as &mut dyn Any).downcast_mut::<T>()).ok()
    }

    pub(crate) fn with_dyn<R>(&self, f: impl FnOnce(&dyn NativeObject) -> R) -> Option<R> {
        let guard = self.inner.try_borrow().ok()?;
        Some(f(&*guard))
    }

    pub(crate) fn with_dyn_mut<R>(&self, f: impl FnOnce(&mut dyn NativeObject) -> R) -> Option<R> {
        let mut guard = self.inner.try_borrow_mut().ok()?;
        Some(f(&mut *guard))
    }

    /// Returns `true` if both handles share one allocation.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn identity(&self) -> usize {
        Rc::as_ptr(&self.inner).cast::<u8>().addr()
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        if self.type_id != other.type_id {
            return false;
        }
        match (self.inner.try_borrow(), other.inner.try_borrow()) {
            (Ok(a), Ok(b)) => a.eq_dyn(&*b as &dyn Any),
            _ => false,
        }
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_borrow() {
            Ok(inner) => inner.fmt(f),
            Err(_) => write!(f, "<{} (borrowed)>", short_type_name(self.type_name)),
        }
    }
}

/// How to rebuild a value: `callable(*args)`, then optional items, key/value pairs and state.
pub struct Reduction {
    /// A [`Value::Global`] naming the reconstructor.
    pub callable: Value,
    /// A [`Value::Tuple`] of constructor arguments.
    pub args: Value,
    /// State applied with `BUILD`.
    pub state: Option<Value>,
    /// Items appended after construction.
    pub list_items: Option<Box<dyn Iterator<Item = Value>>>,
    /// Entries stored after construction.
    pub dict_items: Option<Box<dyn Iterator<Item = (Value, Value)>>>,
    /// Callable invoked as `setter(obj, state)` instead of `BUILD`.
    pub state_setter: Option<Value>,
}

impl Reduction {
    /// Reduction calling `callable(*args)`.
    #[must_use]
    pub fn new(callable: Value, args: Vec<Value>) -> Self {
        Self {
            callable,
            args: Value::tuple(args),
            state: None,
            list_items: None,
            dict_items: None,
            state_setter: None,
        }
    }

    /// Adds state.
    #[must_use]
    pub fn with_state(mut self, state: Value) -> Self {
        self.state = Some(state);
        self
    }

    /// Adds items appended after construction.
    #[must_use]
    pub fn with_list_items<I>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = Value>,
        I::IntoIter: 'static,
    {
        self.list_items = Some(Box::new(items.into_iter()));
        self
    }

    /// Adds entries stored after construction.
    #[must_use]
    pub fn with_dict_items<I>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = (Value, Value)>,
        I::IntoIter: 'static,
    {
        self.dict_items = Some(Box::new(items.into_iter()));
        self
    }

    /// Routes state through `setter(obj, state)`.
    #[must_use]
    pub fn with_state_setter(mut self, setter: Value) -> Self {
        self.state_setter = Some(setter);
        self
    }

    /// Interprets a 2 to 6 element tuple in the reduce-protocol layout.
    ///
    /// `None` in an optional slot means absent. Items may be given as a list or tuple; entries
    /// as a dictionary or a sequence of pairs.
    pub fn from_value(value: &Value) -> Result<Self, PicklingError> {
        let Value::Tuple(parts) = value else {
            return Err(PicklingError::ReductionNotTuple);
        };
        if !(2..=6).contains(&parts.len()) {
            return Err(PicklingError::BadReductionArity { len: parts.len() });
        }
        if !matches!(parts[0], Value::Global(_)) {
            return Err(PicklingError::CallableNotGlobal);
        }
        if !matches!(parts[1], Value::Tuple(_)) {
            return Err(PicklingError::ArgsNotTuple);
        }
        let slot = |i: usize| parts.get(i).filter(|v| !v.is_none()).cloned();
        let mut reduction = Self {
            callable: parts[0].clone(),
            args: parts[1].clone(),
            state: slot(2),
            list_items: None,
            dict_items: None,
            state_setter: slot(5),
        };
        if let Some(items) = slot(3) {
            let items = sequence_items(&items).ok_or_else(|| bad_slot("list items"))?;
            reduction.list_items = Some(Box::new(items.into_iter()));
        }
        if let Some(entries) = slot(4) {
            let pairs = dict_pairs(&entries).ok_or_else(|| bad_slot("dict items"))?;
            reduction.dict_items = Some(Box::new(pairs.into_iter()));
        }
        Ok(reduction)
    }
}

fn bad_slot(what: &str) -> PicklingError {
    PicklingError::Reduce {
        type_name: "reduction".into(),
        message: format!("{what} must be a sequence").into(),
    }
}

fn sequence_items(v: &Value) -> Option<Vec<Value>> {
    match v {
        Value::List(l) => Some(l.borrow().clone()),
        Value::Tuple(t) => Some(t.to_vec()),
        _ => None,
    }
}

fn dict_pairs(v: &Value) -> Option<Vec<(Value, Value)>> {
    if let Value::Dict(d) = v {
        return Some(d.borrow().iter().map(|(k, v)| (k.clone(), v.clone())).collect());
    }
    sequence_items(v)?
        .into_iter()
        .map(|pair| match pair.as_tuple() {
            Some([k, v]) => Some((k.clone(), v.clone())),
            _ => None,
        })
        .collect()
}

impl fmt::Debug for Reduction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reduction")
            .field("callable", &self.callable)
            .field("args", &self.args)
            .field("state", &self.state)
            .field("list_items", &self.list_items.is_some())
            .field("dict_items", &self.dict_items.is_some())
            .field("state_setter", &self.state_setter)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::format;
    use alloc::vec;

    #[derive(Debug, PartialEq)]
    struct Point {
        x: i64,
    }

    impl NativeObject for Point {
        fn eq_dyn(&self, other: &dyn Any) -> bool {
            other.downcast_ref::<Self>() == Some(self)
        }
    }

    #[test]
    fn numeric_tower_equality() {
        assert_eq!(Value::Bool(true), Value::Int(1));
        assert_eq!(Value::Int(2), Value::Float(2.0));
        assert_eq!(Value::complex(3.0, 0.0), Value::Int(3));
        assert_ne!(Value::complex(3.0, 1.0), Value::Int(3));
        assert_ne!(Value::Float(2.5), Value::Int(2));
        let big = BigInt::from(1_u8) << 80_u32;
        assert_eq!(Value::from(big.clone()), Value::Float(2_f64.powi(80)));
        assert!(matches!(Value::from(big), Value::Long(_)));
        assert!(matches!(Value::from(BigInt::from(5)), Value::Int(5)));
        assert_ne!(Value::Int(i64::MAX), Value::Float(TWO_POW_63));
    }

    #[test]
    fn nan_is_not_equal_to_itself() {
        let nan = Value::Float(f64::NAN);
        assert_ne!(nan, nan.clone());
    }

    #[test]
    fn bytes_and_bytearray_compare_equal() {
        assert_eq!(Value::bytes(b"ab"), Value::bytearray(b"ab".to_vec()));
        assert_ne!(Value::bytes(b"ab"), Value::from("ab"));
    }

    #[test]
    fn list_and_tuple_differ() {
        let l = Value::list(vec![1.into()]);
        let t = Value::tuple(vec![1.into()]);
        assert_ne!(l, t);
    }

    #[test]
    fn set_and_frozenset_compare_equal() {
        let s = Value::set([1.into(), 2.into()]).unwrap();
        let f = Value::frozenset([2.into(), 1.into()]).unwrap();
        assert_eq!(s, f);
    }

    #[test]
    fn identity_tracks_sharing() {
        let shared = Value::list(Vec::new());
        let alias = shared.clone();
        assert!(shared.is_same(&alias));
        assert!(!shared.is_same(&Value::list(Vec::new())));
        assert_eq!(Value::Int(1).identity(), None);
        assert_eq!(Value::tuple(Vec::new()).identity(), None);
        assert!(Value::tuple(vec![Value::None]).identity().is_some());
    }

    #[test]
    fn objects_downcast_and_compare() {
        let a = Value::object(Point { x: 1 });
        let b = Value::object(Point { x: 1 });
        assert_eq!(a, b);
        let obj = a.as_object().unwrap();
        assert!(obj.is::<Point>());
        obj.borrow_mut::<Point>().unwrap().x = 2;
        assert_eq!(obj.borrow::<Point>().unwrap().x, 2);
        assert_ne!(a, b);
        assert_eq!(a.type_name(), "Point");
    }

    #[test]
    fn instances_compare_structurally() {
        let class = Rc::new(ClassDef::new("shapes", "Circle"));
        let mut a = Instance::new(class.clone());
        a.set("r", 1.into());
        let mut b = Instance::new(class);
        b.set("r", 1.into());
        assert_eq!(Value::instance(a), Value::instance(b));
    }

    #[test]
    fn globals_compare_by_name_or_type() {
        assert_eq!(Global::new("a", "b"), Global::new("a", "b"));
        assert_ne!(Global::new("a", "b"), Global::new("a", "c"));
        assert_eq!(Global::of::<Point>(), Global::of::<Point>());
        assert_eq!(Global::of::<Point>().qualname(), "Point");
    }

    #[test]
    fn type_paths() {
        assert_eq!(short_type_name("a::b::C<d::E>"), "C");
        assert_eq!(type_module_path("a::b::C<d::E>").as_deref(), Some("a.b"));
        assert_eq!(type_module_path("i32"), None);
    }

    #[test]
    fn reduction_from_value_validates() {
        let callable = Value::global("builtins", "list");
        let ok = Value::tuple(vec![
            callable.clone(),
            Value::tuple(Vec::new()),
            Value::None,
            Value::list(vec![1.into(), 2.into()]),
        ]);
        let r = Reduction::from_value(&ok).unwrap();
        assert!(r.state.is_none());
        assert_eq!(r.list_items.unwrap().count(), 2);

        let short = Value::tuple(vec![callable.clone()]);
        assert_eq!(
            Reduction::from_value(&short).unwrap_err(),
            PicklingError::BadReductionArity { len: 1 }
        );
        let bad_args = Value::tuple(vec![callable, Value::list(Vec::new())]);
        assert_eq!(
            Reduction::from_value(&bad_args).unwrap_err(),
            PicklingError::ArgsNotTuple
        );
        assert_eq!(
            Reduction::from_value(&Value::None).unwrap_err(),
            PicklingError::ReductionNotTuple
        );
    }

    #[test]
    fn debug_is_bounded_for_cycles() {
        let l = Value::list(Vec::new());
        l.as_list().unwrap().borrow_mut().push(l.clone());
        let text = format!("{l:?}");
        assert!(text.starts_with("[["));
        assert!(text.contains("..."));
        l.as_list().unwrap().borrow_mut().clear();
    }

    #[test]
    fn debug_reprs() {
        assert_eq!(format!("{:?}", Value::tuple(vec![1.into()])), "(1,)");
        assert_eq!(format!("{:?}", Value::tuple(vec![1.into(), 2.into()])), "(1, 2)");
        assert_eq!(format!("{:?}", Value::bytes(b"a\x00")), "b'a\\x00'");
        assert_eq!(format!("{:?}", Value::set([]).unwrap()), "set()");
    }
}
