// Copyright 2026 the Execution Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Shared helpers for the `mpickle` conformance tests.
//!
//! The tests themselves live in `tests/`. Nothing here is meant for use outside this workspace.

use mpickle::disasm::disassemble;
use mpickle::opcode::Opcode;
use mpickle::{HIGHEST_PROTOCOL, PickleError, Registry, Value, dumps_with, loads_with};

/// Encodes `value` at `protocol` and decodes the result with the same registry.
pub fn round_trip(value: &Value, protocol: u8, registry: &Registry) -> Result<Value, PickleError> {
    let bytes = dumps_with(value, Some(i32::from(protocol)), registry)?;
    loads_with(&bytes, registry)
}

/// Every protocol the codec writes, lowest first.
pub fn protocols() -> impl Iterator<Item = u8> {
    0..=HIGHEST_PROTOCOL
}

/// The opcodes of a well-formed stream, in order.
pub fn opcodes(bytes: &[u8]) -> Result<Vec<Opcode>, PickleError> {
    Ok(disassemble(bytes)?.into_iter().map(|i| i.opcode).collect())
}

/// Builds a list of small integers.
pub fn int_list(values: &[i64]) -> Value {
    Value::list(values.iter().copied().map(Value::Int).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcodes_of_simple_stream() {
        assert_eq!(
            opcodes(b"\x80\x02N.").unwrap(),
            vec![Opcode::Proto, Opcode::None, Opcode::Stop]
        );
    }

    #[test]
    fn round_trip_helper_covers_all_protocols() {
        let registry = Registry::new();
        let v = int_list(&[1, 2]);
        assert_eq!(protocols().count(), 6);
        for p in protocols() {
            assert_eq!(round_trip(&v, p, &registry).unwrap(), v);
        }
    }
}
