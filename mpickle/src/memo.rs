// Copyright 2026 the Execution Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-session memo tables.

use hashbrown::HashMap;

use crate::error::PicklingError;
use crate::value::Value;

/// Encoder memo: object identity to memo id.
///
/// Entries hold a clone of the memoized value so its allocation (and therefore its identity)
/// cannot be reused while the session is live.
#[derive(Debug, Default)]
pub(crate) struct PickleMemo {
    ids: HashMap<usize, (u32, Value)>,
}

impl PickleMemo {
    pub(crate) fn get(&self, identity: usize) -> Option<u32> {
        self.ids.get(&identity).map(|(id, _)| *id)
    }

    /// Assigns the next id to `value` and returns it.
    ///
    /// Ids are written as at most four bytes, so a session holds at most `u32::MAX + 1` entries.
    pub(crate) fn insert(&mut self, identity: usize, value: &Value) -> Result<u32, PicklingError> {
        let id = self.next_id().ok_or(PicklingError::MemoOverflow)?;
        self.ids.insert(identity, (id, value.clone()));
        Ok(id)
    }

    /// Returns the id the next insertion will get.
    pub(crate) fn next_id(&self) -> Option<u32> {
        memo_id(self.ids.len())
    }

    pub(crate) fn len(&self) -> usize {
        self.ids.len()
    }

    pub(crate) fn clear(&mut self) {
        self.ids.clear();
    }
}

fn memo_id(len: usize) -> Option<u32> {
    u32::try_from(len).ok()
}

/// Decoder memo: memo id to value.
#[derive(Debug, Default)]
pub(crate) struct UnpickleMemo {
    values: HashMap<u64, Value>,
}

impl UnpickleMemo {
    pub(crate) fn get(&self, id: u64) -> Option<&Value> {
        self.values.get(&id)
    }

    pub(crate) fn put(&mut self, id: u64, value: Value) {
        self.values.insert(id, value);
    }

    pub(crate) fn len(&self) -> usize {
        self.values.len()
    }

    /// Points every entry holding `old` at `new`.
    pub(crate) fn replace_identity(&mut self, old: usize, new: &Value) {
        for v in self.values.values_mut() {
            if v.identity() == Some(old) {
                *v = new.clone();
            }
        }
    }

    pub(crate) fn clear(&mut self) {
        self.values.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    #[test]
    fn ids_follow_insertion_order() {
        let mut memo = PickleMemo::default();
        let a = Value::list(Vec::new());
        let b = Value::list(Vec::new());
        let ia = a.identity().unwrap();
        let ib = b.identity().unwrap();
        assert_eq!(memo.insert(ia, &a), Ok(0));
        assert_eq!(memo.insert(ib, &b), Ok(1));
        assert_eq!(memo.get(ia), Some(0));
        assert_eq!(memo.next_id(), Some(2));
        memo.clear();
        assert_eq!(memo.get(ia), None);
        assert_eq!(memo.len(), 0);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn ids_past_four_bytes_are_refused() {
        let last = usize::try_from(u32::MAX).unwrap();
        assert_eq!(memo_id(last), Some(u32::MAX));
        assert_eq!(memo_id(last + 1), None);
    }

    #[test]
    fn replacement_repoints_entries() {
        let mut memo = UnpickleMemo::default();
        let old = Value::list(Vec::new());
        let new = Value::from("replacement");
        memo.put(3, old.clone());
        memo.put(4, Value::Int(1));
        memo.replace_identity(old.identity().unwrap(), &new);
        assert_eq!(memo.get(3), Some(&new));
        assert_eq!(memo.get(4), Some(&Value::Int(1)));
        assert_eq!(memo.len(), 2);
    }
}
