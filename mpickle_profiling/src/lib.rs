// Copyright 2026 the Execution Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Profiling adapters for `mpickle` (currently Tracy).
//!
//! This crate is `std`-only and keeps `mpickle` itself free of profiling dependencies.
//! It listens for scope enter/exit callbacks and emits matching profiling zones.
//!
//! ## Backend
//! This crate currently supports the Tracy backend via `tracy-client`.
//!
//! ## Example
//! ```no_run
//! use mpickle::{Unpickler, Value};
//! use mpickle_profiling::ProfilingTraceSink;
//!
//! let _client = tracy_client::Client::start();
//! let mut sink = ProfilingTraceSink::new();
//! let data: &[u8] = b"\x80\x02]q\x00K\x01a.";
//! let value = Unpickler::new(data).with_trace(&mut sink).load()?;
//! assert_eq!(value, Value::list(vec![Value::from(1)]));
//! # Ok::<(), mpickle::PickleError>(())
//! ```

mod resolver;
mod sink;

pub use resolver::{DefaultLabelResolver, LabelResolver, ShortNameResolver};
pub use sink::ProfilingTraceSink;
