// Copyright 2026 the Execution Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! An object-graph serialization codec for the pickle wire format, protocols 0 through 5.
//!
//! `mpickle` encodes a [`Value`] graph into an opcode stream and decodes such streams back into
//! values, byte-compatible with what a full host implementation writes and reads. It is `no_std`
//! (with `alloc`) so it can run inside constrained runtimes.
//!
//! ## Layers
//! - [`format`]: protocol constants, framing, and the variable-length integer codec.
//! - [`opcode`]: the opcode set and argument encodings.
//! - [`value`] and [`aggregates`]: the value model, including native Rust objects.
//! - [`namespace`] and [`registry`]: name resolution and host-type registration.
//! - [`pickler`] and [`unpickler`]: the encoder and the stack-machine decoder.
//! - [`disasm`]: a listing of an opcode stream, for debugging.
//! - [`trace`]: optional per-opcode and per-scope instrumentation.
//!
//! ## Identity
//! Containers are reference-counted; two [`Value`]s sharing an allocation are the same object.
//! The encoder memoizes by that identity and the decoder rebuilds the sharing, so shared and
//! cyclic structure survives a round trip. Cyclic graphs are reference cycles and are never
//! freed unless the caller breaks them.
//!
//! ## Registries
//! A [`Registry`] holds the namespace that global references resolve against, registered host
//! types, and extension codes. Without `std`, pass one explicitly ([`dumps_with`],
//! [`loads_with`]). With `std`, each thread has a default registry used by [`dumps`], [`loads`],
//! [`Pickler::new`] and [`Unpickler::new`].
//!
//! ## Example
//! ```
//! use mpickle::{Registry, Value, dumps_with, loads_with};
//!
//! let registry = Registry::new();
//! let shared = Value::list(vec![Value::from(1)]);
//! let v = Value::tuple(vec![shared.clone(), shared]);
//! let bytes = dumps_with(&v, Some(2), &registry)?;
//! let back = loads_with(&bytes, &registry)?;
//! let items = back.as_tuple().unwrap();
//! assert!(items[0].is_same(&items[1]));
//! # Ok::<(), mpickle::PickleError>(())
//! ```

#![no_std]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

use alloc::vec::Vec;

pub mod aggregates;
pub mod buffer;
mod builtins;
mod compat;
pub mod disasm;
pub mod error;
pub mod format;
pub mod io;
pub mod limits;
mod memo;
pub mod namespace;
pub mod opcode;
pub mod pickler;
pub mod registry;
pub mod text;
pub mod trace;
pub mod unpickler;
pub mod value;

pub use aggregates::{Dict, Set, Unhashable};
pub use error::{
    CallError, IoError, MissingName, PickleError, PicklingError, RegistryError, UnpicklingError,
};
pub use format::{COMPATIBLE_FORMATS, DEFAULT_PROTOCOL, FORMAT_VERSION, HIGHEST_PROTOCOL};
pub use limits::{Limits, StringEncoding};
pub use pickler::Pickler;
pub use registry::{Registration, Registry, RegistryEntry};
pub use trace::{ScopeKind, TraceMask, TraceSink};
pub use unpickler::Unpickler;
pub use value::{
    ClassDef, Complex, Global, Instance, NativeObject, Object, Reduction, Symbol, Value,
};

#[cfg(feature = "std")]
pub use registry::{default_registry, inject_placeholder, register, remove_placeholder};

/// Encodes `value` with names resolved through `registry`.
///
/// `protocol` defaults to [`DEFAULT_PROTOCOL`].
pub fn dumps_with(
    value: &Value,
    protocol: Option<i32>,
    registry: &Registry,
) -> Result<Vec<u8>, PickleError> {
    let mut pickler = Pickler::with_registry(Vec::new(), protocol, registry.clone())?;
    pickler.dump(value)?;
    Ok(pickler.into_inner())
}

/// Decodes one pickle from `data` with names resolved through `registry`.
///
/// Bytes after the `STOP` opcode are ignored.
pub fn loads_with(data: &[u8], registry: &Registry) -> Result<Value, PickleError> {
    Unpickler::with_registry(data, registry.clone()).load()
}

/// Encodes `value` using this thread's default registry.
#[cfg(feature = "std")]
pub fn dumps(value: &Value, protocol: Option<i32>) -> Result<Vec<u8>, PickleError> {
    dumps_with(value, protocol, &default_registry())
}

/// Decodes one pickle from `data` using this thread's default registry.
#[cfg(feature = "std")]
pub fn loads(data: &[u8]) -> Result<Value, PickleError> {
    loads_with(data, &default_registry())
}

/// Encodes `value` into `writer`.
#[cfg(feature = "std")]
pub fn dump<W: std::io::Write>(
    value: &Value,
    writer: W,
    protocol: Option<i32>,
) -> Result<(), PickleError> {
    let mut pickler = Pickler::new(io::IoSink(writer), protocol)?;
    pickler.dump(value)
}

/// Decodes one pickle from `reader`, leaving any following bytes unread.
#[cfg(feature = "std")]
pub fn load<R: std::io::BufRead>(reader: R) -> Result<Value, PickleError> {
    Unpickler::new(io::IoSource(reader)).load()
}
