// Copyright 2026 the Execution Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The module namespace that global references resolve against.
//!
//! Modules are keyed by their full dotted path. Defining a symbol in `a.b` creates `a` and `a.b`
//! as needed. A qualified name may itself be dotted (`Outer.Inner`); lookup first tries the name
//! verbatim and then treats leading segments as submodules.

use alloc::borrow::ToOwned;
use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::format;
use alloc::rc::Rc;
use alloc::string::String;
use core::ops::Bound;

use crate::value::{ClassDef, Symbol};

#[derive(Clone, Debug)]
struct Entry {
    symbol: Symbol,
    placeholder: bool,
}

#[derive(Clone, Debug, Default)]
struct Module {
    symbols: BTreeMap<Box<str>, Entry>,
}

/// Outcome of a namespace lookup.
#[derive(Clone, Debug)]
pub enum Lookup {
    /// The name resolved.
    Found(Symbol),
    /// No module with that path exists.
    MissingModule,
    /// The module exists but has no such attribute.
    MissingAttribute,
}

/// A tree of modules holding named symbols.
#[derive(Clone, Debug, Default)]
pub struct Namespace {
    modules: BTreeMap<Box<str>, Module>,
}

impl Namespace {
    /// Creates an empty namespace.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if a module with this path exists.
    #[must_use]
    pub fn has_module(&self, module: &str) -> bool {
        self.modules.contains_key(module)
    }

    /// Binds `module.name`, replacing any previous binding.
    pub fn define(&mut self, module: &str, name: &str, symbol: Symbol) {
        self.ensure_module(module).symbols.insert(
            name.into(),
            Entry {
                symbol,
                placeholder: false,
            },
        );
    }

    /// Resolves `qualname` inside `module`.
    #[must_use]
    pub fn resolve(&self, module: &str, qualname: &str) -> Lookup {
        let Some(m) = self.modules.get(module) else {
            return Lookup::MissingModule;
        };
        if let Some(entry) = m.symbols.get(qualname) {
            return Lookup::Found(entry.symbol.clone());
        }
        // `pkg` + `sub.Name` may live in module `pkg.sub`.
        let mut split = qualname.len();
        while let Some(dot) = qualname[..split].rfind('.') {
            let sub = format!("{module}.{}", &qualname[..dot]);
            if let Some(entry) = self
                .modules
                .get(sub.as_str())
                .and_then(|m| m.symbols.get(&qualname[dot + 1..]))
            {
                return Lookup::Found(entry.symbol.clone());
            }
            split = dot;
        }
        Lookup::MissingAttribute
    }

    /// Resolves a fully dotted path such as `pkg.mod.Name`, trying the longest module prefix
    /// first.
    #[must_use]
    pub fn resolve_dotted(&self, path: &str) -> Option<Symbol> {
        let mut split = path.len();
        while let Some(dot) = path[..split].rfind('.') {
            if let Lookup::Found(sym) = self.resolve(&path[..dot], &path[dot + 1..]) {
                return Some(sym);
            }
            split = dot;
        }
        None
    }

    /// Finds the module that binds `symbol` under `qualname`.
    #[must_use]
    pub fn module_of(&self, qualname: &str, symbol: &Symbol) -> Option<&str> {
        self.modules.iter().find_map(|(path, m)| {
            m.symbols
                .get(qualname)
                .filter(|e| e.symbol.ptr_eq(symbol))
                .map(|_| &**path)
        })
    }

    /// Ensures `module.name` resolves, inserting a placeholder if it does not.
    ///
    /// The placeholder is `symbol` if given, otherwise a fresh class with default state
    /// handling. An existing binding is left alone and returned.
    pub fn inject_placeholder(&mut self, module: &str, name: &str, symbol: Option<Symbol>) -> Symbol {
        if let Lookup::Found(existing) = self.resolve(module, name) {
            return existing;
        }
        let symbol =
            symbol.unwrap_or_else(|| Symbol::Class(Rc::new(ClassDef::new(module, name))));
        self.ensure_module(module).symbols.insert(
            name.into(),
            Entry {
                symbol: symbol.clone(),
                placeholder: true,
            },
        );
        symbol
    }

    /// Removes a placeholder inserted by [`Namespace::inject_placeholder`].
    ///
    /// Real bindings are never removed. Modules left empty by the removal disappear too, unless
    /// they still have submodules.
    pub fn remove_placeholder(&mut self, module: &str, name: &str) {
        let Some(m) = self.modules.get_mut(module) else {
            return;
        };
        if !m.symbols.get(name).is_some_and(|e| e.placeholder) {
            return;
        }
        m.symbols.remove(name);
        let mut path = module.to_owned();
        loop {
            let empty = self
                .modules
                .get(path.as_str())
                .is_some_and(|m| m.symbols.is_empty());
            if !empty || self.has_submodules(&path) {
                break;
            }
            self.modules.remove(path.as_str());
            match path.rfind('.') {
                Some(dot) => path.truncate(dot),
                None => break,
            }
        }
    }

    /// Iterates module paths in sorted order.
    pub fn modules(&self) -> impl Iterator<Item = &str> + '_ {
        self.modules.keys().map(|k| &**k)
    }

    fn has_submodules(&self, path: &str) -> bool {
        let prefix: String = format!("{path}.");
        self.modules
            .range::<str, _>((Bound::Included(prefix.as_str()), Bound::Unbounded))
            .next()
            .is_some_and(|(k, _)| k.starts_with(prefix.as_str()))
    }

    fn ensure_module(&mut self, module: &str) -> &mut Module {
        let mut end = 0;
        while let Some(dot) = module[end..].find('.') {
            end += dot;
            self.modules.entry(module[..end].into()).or_default();
            end += 1;
        }
        self.modules.entry(module.into()).or_default()
    }
}
