// Copyright 2026 the Execution Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::collections::HashMap;
use std::string::String;

/// Optional label resolver for profiling zones.
///
/// Return `None` to fall back to the default labels.
pub trait LabelResolver {
    /// Resolve a label for a reconstructor or state-setter call.
    fn call_label(&mut self, _callable: &str) -> Option<String> {
        None
    }

    /// Resolve a label for a host-object reduction.
    fn reduce_label(&mut self, _type_name: &str) -> Option<String> {
        None
    }
}

/// Default resolver that keeps the names the codec reports.
#[derive(Default, Debug)]
pub struct DefaultLabelResolver;

impl LabelResolver for DefaultLabelResolver {}

/// Resolver that drops module paths, so `pkg.mod.Class.method` becomes `Class.method`.
#[derive(Default, Debug)]
pub struct ShortNameResolver {
    call_cache: HashMap<String, String>,
}

impl LabelResolver for ShortNameResolver {
    fn call_label(&mut self, callable: &str) -> Option<String> {
        if let Some(label) = self.call_cache.get(callable) {
            return Some(label.clone());
        }
        let short = match callable.rsplit_once('.') {
            Some((path, last)) => match path.rsplit_once('.') {
                Some((_, owner)) if owner.starts_with(char::is_uppercase) => {
                    format!("{owner}.{last}")
                }
                _ => last.to_owned(),
            },
            None => callable.to_owned(),
        };
        let label = format!("call:{short}");
        self.call_cache.insert(callable.to_owned(), label.clone());
        Some(label)
    }
}

pub(crate) fn default_call_label(callable: &str) -> String {
    format!("call:{callable}")
}

pub(crate) fn default_reduce_label(type_name: &str) -> String {
    format!("reduce:{type_name}")
}

pub(crate) fn frame_label(offset: u64) -> String {
    format!("frame@{offset}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_names_keep_owning_class() {
        let mut r = ShortNameResolver::default();
        assert_eq!(r.call_label("reconstruct").as_deref(), Some("call:reconstruct"));
        assert_eq!(
            r.call_label("copyreg._reconstructor").as_deref(),
            Some("call:_reconstructor")
        );
        assert_eq!(
            r.call_label("pkg.mod.Widget.build").as_deref(),
            Some("call:Widget.build")
        );
        // Cached on the second lookup.
        assert_eq!(r.call_cache.len(), 3);
        r.call_label("reconstruct");
        assert_eq!(r.call_cache.len(), 3);
    }

    #[test]
    fn default_resolver_defers() {
        let mut r = DefaultLabelResolver;
        assert!(r.call_label("x").is_none());
        assert!(r.reduce_label("Meters").is_none());
        assert_eq!(default_reduce_label("Meters"), "reduce:Meters");
        assert_eq!(frame_label(2), "frame@2");
    }
}
