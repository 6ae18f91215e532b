// Copyright 2026 the Execution Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Hashed containers for [`Value`] keys.
//!
//! Both containers keep entries in insertion order, which is the order the encoder writes them
//! in. Equality ignores that order. Lookup goes through a `hashbrown::HashTable` of
//! `(hash, index)` pairs, so entries never need rehashing.

use alloc::vec::Vec;
use core::fmt;
use core::hash::{BuildHasher, Hasher};

use hashbrown::{DefaultHashBuilder, HashTable};

use crate::value::Value;

/// A value that cannot be used as a key or set element.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Unhashable {
    /// Type name of the rejected value.
    pub type_name: &'static str,
}

impl fmt::Display for Unhashable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unhashable type: '{}'", self.type_name)
    }
}

impl core::error::Error for Unhashable {}

#[derive(Clone, Default)]
struct KeyTable {
    table: HashTable<(u64, usize)>,
    hasher: DefaultHashBuilder,
}

impl KeyTable {
    fn hash(&self, key: &Value) -> Result<u64, Unhashable> {
        let mut state = self.hasher.build_hasher();
        key.hash_into(&mut state)?;
        Ok(state.finish())
    }

    fn find<'k>(&self, hash: u64, key: &Value, key_at: impl Fn(usize) -> &'k Value) -> Option<usize> {
        self.table
            .find(hash, |&(h, i)| h == hash && key_at(i) == key)
            .map(|&(_, i)| i)
    }

    fn insert(&mut self, hash: u64, index: usize) {
        self.table.insert_unique(hash, (hash, index), |&(h, _)| h);
    }
}

/// An insertion-ordered mapping with unique keys.
#[derive(Clone, Default)]
pub struct Dict {
    entries: Vec<(Value, Value)>,
    keys: KeyTable,
}

impl Dict {
    /// Creates an empty dictionary.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inserts or replaces; a replaced key keeps its original position.
    pub fn insert(&mut self, key: Value, value: Value) -> Result<Option<Value>, Unhashable> {
        let hash = self.keys.hash(&key)?;
        let entries = &self.entries;
        if let Some(i) = self.keys.find(hash, &key, |i| &entries[i].0) {
            return Ok(Some(core::mem::replace(&mut self.entries[i].1, value)));
        }
        self.keys.insert(hash, self.entries.len());
        self.entries.push((key, value));
        Ok(None)
    }

    /// Looks up `key`; unhashable keys are simply absent.
    #[must_use]
    pub fn get(&self, key: &Value) -> Option<&Value> {
        let hash = self.keys.hash(key).ok()?;
        let i = self.keys.find(hash, key, |i| &self.entries[i].0)?;
        Some(&self.entries[i].1)
    }

    /// Looks up a text key.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&Value> {
        self.get(&Value::from(key))
    }

    /// Returns `true` if `key` is present.
    #[must_use]
    pub fn contains_key(&self, key: &Value) -> bool {
        self.get(key).is_some()
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (&Value, &Value)> + '_ {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    /// Iterates keys in insertion order.
    pub fn keys(&self) -> impl ExactSizeIterator<Item = &Value> + '_ {
        self.entries.iter().map(|(k, _)| k)
    }

    /// Iterates values in insertion order.
    pub fn values(&self) -> impl ExactSizeIterator<Item = &Value> + '_ {
        self.entries.iter().map(|(_, v)| v)
    }
}

impl PartialEq for Dict {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .entries
                .iter()
                .all(|(k, v)| other.get(k).is_some_and(|ov| ov == v))
    }
}

impl fmt::Debug for Dict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// An insertion-ordered collection of unique elements.
#[derive(Clone, Default)]
pub struct Set {
    items: Vec<Value>,
    keys: KeyTable,
}

impl Set {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if there are no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Adds `item`; returns `false` if an equal element was already present.
    pub fn insert(&mut self, item: Value) -> Result<bool, Unhashable> {
        let hash = self.keys.hash(&item)?;
        let items = &self.items;
        if self.keys.find(hash, &item, |i| &items[i]).is_some() {
            return Ok(false);
        }
        self.keys.insert(hash, self.items.len());
        self.items.push(item);
        Ok(true)
    }

    /// Returns `true` if an element equal to `item` is present.
    #[must_use]
    pub fn contains(&self, item: &Value) -> bool {
        let Ok(hash) = self.keys.hash(item) else {
            return false;
        };
        self.keys.find(hash, item, |i| &self.items[i]).is_some()
    }

    /// Iterates elements in insertion order.
    pub fn iter(&self) -> core::slice::Iter<'_, Value> {
        self.items.iter()
    }
}

impl PartialEq for Set {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.items.iter().all(|v| other.contains(v))
    }
}

impl fmt::Debug for Set {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<'a> IntoIterator for &'a Set {
    type Item = &'a Value;
    type IntoIter = core::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
