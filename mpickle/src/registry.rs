// Copyright 2026 the Execution Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The type registry.
//!
//! A [`Registry`] owns three things the codec consults in both directions:
//!
//! - registered host types ([`Registration`]), looked up by exact [`TypeId`] when encoding and by
//!   wire name when decoding,
//! - the [`Namespace`] that global references resolve against, seeded with the `builtins`,
//!   `copyreg` and `_codecs` symbols the wire format relies on,
//! - the extension-code table used by `EXT1`/`EXT2`/`EXT4`.
//!
//! A type can carry two names. Its declared name is how it is known locally; its remote name is
//! how the counterpart environment knows it. Encoding prefers the remote name and decoding
//! accepts either, which lets a constrained runtime exchange data with a host whose module
//! layout differs.
//!
//! `Registry` is a cheap handle; clones share state. Callbacks run with no internal borrow held,
//! so a reconstructor may itself consult the registry.

use alloc::boxed::Box;
use alloc::format;
use alloc::rc::Rc;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::any::TypeId;
use core::cell::RefCell;
use core::fmt;
use core::marker::PhantomData;

use hashbrown::HashMap;

use crate::error::{CallError, RegistryError};
use crate::namespace::{Lookup, Namespace};
use crate::value::{
    CallFn, ClassDef, Global, NativeObject, Object, Reduction, Symbol, Value, short_type_name,
    type_module_path,
};

/// Module that synthesized reconstructors are defined in.
pub const INTERNAL_RECONSTRUCT_MODULE: &str = "internal_reconstruct";

/// Highest valid extension code.
pub const MAX_EXTENSION_CODE: u32 = 0x7fff_ffff;

type ReduceFn = Rc<dyn Fn(&Object, u8) -> Result<Reduction, CallError>>;
type InPlaceStateFn = Rc<dyn Fn(&Object, Value) -> Result<(), CallError>>;
type ReplaceStateFn = Rc<dyn Fn(&Object, Value) -> Result<Value, CallError>>;

#[derive(Clone)]
enum StateFn {
    InPlace(InPlaceStateFn),
    Replace(ReplaceStateFn),
}

/// A dotted name split into module and qualified name.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Name {
    module: Box<str>,
    qualname: Box<str>,
}

impl Name {
    fn new(module: &str, qualname: &str) -> Self {
        Self {
            module: module.into(),
            qualname: qualname.into(),
        }
    }

    fn parse(path: &str) -> Result<Self, RegistryError> {
        match path.rsplit_once('.') {
            Some((m, q)) if !m.is_empty() && !q.is_empty() => Ok(Self::new(m, q)),
            _ => Err(RegistryError::BadReconstructorPath { path: path.into() }),
        }
    }

    fn is(&self, module: &str, qualname: &str) -> bool {
        &*self.module == module && &*self.qualname == qualname
    }

    fn pair(&self) -> (String, String) {
        (self.module.to_string(), self.qualname.to_string())
    }
}

/// Describes how a host type `T` is encoded and decoded.
///
/// Built with chained setters and handed to [`Registry::register`]. Every hook is optional; an
/// entry without a reduce hook falls back to [`NativeObject::reduce`].
pub struct Registration<T> {
    reduce: Option<ReduceFn>,
    reconstruct: Option<CallFn>,
    state: Option<StateFn>,
    name: Option<(Box<str>, Box<str>)>,
    reconstructor: Option<Box<str>>,
    remote_name: Option<(Box<str>, Box<str>)>,
    remote_reconstructor: Option<Box<str>>,
    _type: PhantomData<fn(T)>,
}

impl<T: NativeObject> Registration<T> {
    /// An entry with no hooks, named after the Rust type.
    #[must_use]
    pub fn new() -> Self {
        Self {
            reduce: None,
            reconstruct: None,
            state: None,
            name: None,
            reconstructor: None,
            remote_name: None,
            remote_reconstructor: None,
            _type: PhantomData,
        }
    }

    /// Sets the reduce hook, which describes how to rebuild a `T`.
    #[must_use]
    pub fn reduce(
        mut self,
        f: impl Fn(&T, u8) -> Result<Reduction, CallError> + 'static,
    ) -> Self {
        self.reduce = Some(Rc::new(move |obj: &Object, protocol| {
            let this = obj.borrow::<T>().ok_or_else(|| borrow_error::<T>())?;
            f(&this, protocol)
        }));
        self
    }

    /// Sets the reconstruct hook, called with the decoded constructor arguments.
    ///
    /// Without an explicit [`Registration::reconstructor`] path, one is synthesized in
    /// [`INTERNAL_RECONSTRUCT_MODULE`] so the stream always names a resolvable callable. With an
    /// explicit path, the namespace binding of that path wins and this hook is the fallback.
    #[must_use]
    pub fn reconstruct(
        mut self,
        f: impl Fn(Vec<Value>) -> Result<Value, CallError> + 'static,
    ) -> Self {
        self.reconstruct = Some(Rc::new(f));
        self
    }

    /// Sets a hook that applies `BUILD` state to a `T` in place.
    #[must_use]
    pub fn set_state(
        mut self,
        f: impl Fn(&mut T, Value) -> Result<(), CallError> + 'static,
    ) -> Self {
        self.state = Some(StateFn::InPlace(Rc::new(move |obj: &Object, state| {
            let mut this = obj.borrow_mut::<T>().ok_or_else(|| borrow_error::<T>())?;
            f(&mut this, state)
        })));
        self
    }

    /// Sets a hook that builds a replacement value from a `T` and its `BUILD` state.
    ///
    /// The replacement takes the place of the original on the stack and in the memo.
    #[must_use]
    pub fn replace_state(
        mut self,
        f: impl Fn(&T, Value) -> Result<Value, CallError> + 'static,
    ) -> Self {
        self.state = Some(StateFn::Replace(Rc::new(move |obj: &Object, state| {
            let this = obj.borrow::<T>().ok_or_else(|| borrow_error::<T>())?;
            f(&this, state)
        })));
        self
    }

    /// Overrides the declared name (by default the Rust module path and type name).
    #[must_use]
    pub fn name(mut self, module: &str, qualname: &str) -> Self {
        self.name = Some((module.into(), qualname.into()));
        self
    }

    /// Names the reconstructor as a dotted `module.name` path.
    #[must_use]
    pub fn reconstructor(mut self, path: &str) -> Self {
        self.reconstructor = Some(path.into());
        self
    }

    /// Sets the name the counterpart environment uses for this type.
    #[must_use]
    pub fn remote_name(mut self, module: &str, qualname: &str) -> Self {
        self.remote_name = Some((module.into(), qualname.into()));
        self
    }

    /// Sets the dotted path of the counterpart environment's reconstructor.
    #[must_use]
    pub fn remote_reconstructor(mut self, path: &str) -> Self {
        self.remote_reconstructor = Some(path.into());
        self
    }
}

impl<T: NativeObject> Default for Registration<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Registration<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("type", &core::any::type_name::<T>())
            .field("reduce", &self.reduce.is_some())
            .field("reconstruct", &self.reconstruct.is_some())
            .field("state", &self.state.is_some())
            .field("name", &self.name)
            .field("reconstructor", &self.reconstructor)
            .field("remote_name", &self.remote_name)
            .field("remote_reconstructor", &self.remote_reconstructor)
            .finish()
    }
}

fn borrow_error<T>() -> CallError {
    CallError::new(format!(
        "{} is already borrowed",
        short_type_name(core::any::type_name::<T>())
    ))
}

/// A registered host type.
pub struct RegistryEntry {
    type_id: TypeId,
    type_name: &'static str,
    name: Name,
    reconstructor: Option<Name>,
    remote_name: Option<Name>,
    remote_reconstructor: Option<Name>,
    reduce: Option<ReduceFn>,
    reconstruct: Option<CallFn>,
    state: Option<StateFn>,
}

impl RegistryEntry {
    /// Returns the registered type's id.
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns the registered type's Rust name.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns the declared `(module, qualname)`.
    #[must_use]
    pub fn name(&self) -> (&str, &str) {
        (&self.name.module, &self.name.qualname)
    }

    /// Returns the local reconstructor `(module, name)`, explicit or synthesized.
    #[must_use]
    pub fn reconstructor(&self) -> Option<(&str, &str)> {
        self.reconstructor
            .as_ref()
            .map(|n| (&*n.module, &*n.qualname))
    }

    /// Returns the counterpart environment's `(module, qualname)`.
    #[must_use]
    pub fn remote_name(&self) -> Option<(&str, &str)> {
        self.remote_name.as_ref().map(|n| (&*n.module, &*n.qualname))
    }

    /// Returns the counterpart environment's reconstructor `(module, name)`.
    #[must_use]
    pub fn remote_reconstructor(&self) -> Option<(&str, &str)> {
        self.remote_reconstructor
            .as_ref()
            .map(|n| (&*n.module, &*n.qualname))
    }

    /// Returns `true` if a reduce hook is set.
    #[must_use]
    pub fn has_reduce(&self) -> bool {
        self.reduce.is_some()
    }

    /// Returns `true` if a reconstruct hook is set.
    #[must_use]
    pub fn has_reconstruct(&self) -> bool {
        self.reconstruct.is_some()
    }

    /// Returns `true` if a state hook is set.
    #[must_use]
    pub fn has_state_hook(&self) -> bool {
        self.state.is_some()
    }

    pub(crate) fn reduce(&self, obj: &Object, protocol: u8) -> Option<Result<Reduction, CallError>> {
        self.reduce.as_ref().map(|f| f(obj, protocol))
    }

    /// Applies `BUILD` state; `Ok(Some(v))` means `v` replaces the object.
    pub(crate) fn apply_state(
        &self,
        obj: &Object,
        state: Value,
    ) -> Option<Result<Option<Value>, CallError>> {
        Some(match self.state.as_ref()? {
            StateFn::InPlace(f) => f(obj, state).map(|()| None),
            StateFn::Replace(f) => f(obj, state).map(Some),
        })
    }

    /// The reconstructor name to write in place of a reduction's callable.
    pub(crate) fn callable_wire_name(&self) -> Option<(String, String)> {
        self.remote_reconstructor
            .as_ref()
            .or(self.reconstructor.as_ref())
            .map(Name::pair)
    }

    /// The name to write for a reference to the type itself.
    pub(crate) fn type_wire_name(&self) -> (String, String) {
        self.remote_name.as_ref().unwrap_or(&self.name).pair()
    }
}

impl fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("type_name", &self.type_name)
            .field("name", &self.name)
            .field("reconstructor", &self.reconstructor)
            .field("remote_name", &self.remote_name)
            .field("remote_reconstructor", &self.remote_reconstructor)
            .field("reduce", &self.reduce.is_some())
            .field("reconstruct", &self.reconstruct.is_some())
            .field("state", &self.state.is_some())
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct State {
    entries: Vec<Rc<RegistryEntry>>,
    by_type: HashMap<TypeId, usize>,
    namespace: Namespace,
    ext_by_name: HashMap<(Box<str>, Box<str>), u32>,
    ext_by_code: HashMap<u32, (Box<str>, Box<str>)>,
}

/// Shared registry of host types, namespace symbols and extension codes.
#[derive(Clone)]
pub struct Registry {
    inner: Rc<RefCell<State>>,
}

impl Registry {
    /// Creates a registry whose namespace holds the built-in symbols.
    #[must_use]
    pub fn new() -> Self {
        let inner = Rc::new(RefCell::new(State::default()));
        let weak = Rc::downgrade(&inner);
        let resolve = move |module: &str, qualname: &str| {
            let state = weak.upgrade()?;
            let state = state.try_borrow().ok()?;
            match state.namespace.resolve(module, qualname) {
                Lookup::Found(sym) => Some(sym),
                Lookup::MissingModule | Lookup::MissingAttribute => None,
            }
        };
        crate::builtins::install(&mut inner.borrow_mut().namespace, Rc::new(resolve));
        Self { inner }
    }

    /// Registers a host type.
    ///
    /// Registering the same type twice keeps both entries; lookups by type return the first.
    pub fn register<T: NativeObject>(&self, reg: Registration<T>) -> Result<(), RegistryError> {
        let type_name = core::any::type_name::<T>();
        let name = match &reg.name {
            Some((m, q)) => {
                if m.is_empty() || q.is_empty() {
                    return Err(RegistryError::EmptyName);
                }
                Name::new(m, q)
            }
            None => Name::new(
                type_module_path(type_name).as_deref().unwrap_or("builtins"),
                short_type_name(type_name),
            ),
        };
        let remote_name = match &reg.remote_name {
            None => None,
            Some((m, q)) if m.is_empty() && q.is_empty() => return Err(RegistryError::EmptyName),
            Some((m, q)) if m.is_empty() || q.is_empty() => {
                return Err(RegistryError::PartialRemoteName);
            }
            Some((m, q)) => Some(Name::new(m, q)),
        };
        let remote_reconstructor = reg
            .remote_reconstructor
            .as_deref()
            .map(Name::parse)
            .transpose()?;
        let explicit = reg.reconstructor.as_deref().map(Name::parse).transpose()?;

        let mut state = self.inner.borrow_mut();
        let reconstructor = match (explicit, &reg.reconstruct) {
            (Some(path), _) => Some(path),
            (None, Some(f)) => {
                let path = state.synthesize_reconstructor(short_type_name(type_name));
                state
                    .namespace
                    .define(&path.module, &path.qualname, Symbol::Function(f.clone()));
                Some(path)
            }
            (None, None) => None,
        };
        let entry = RegistryEntry {
            type_id: TypeId::of::<T>(),
            type_name,
            name,
            reconstructor,
            remote_name,
            remote_reconstructor,
            reduce: reg.reduce,
            reconstruct: reg.reconstruct,
            state: reg.state,
        };
        let index = state.entries.len();
        state.entries.push(Rc::new(entry));
        state.by_type.entry(TypeId::of::<T>()).or_insert(index);
        Ok(())
    }

    /// Returns the entry registered for `type_id`.
    #[must_use]
    pub fn find(&self, type_id: TypeId) -> Option<Rc<RegistryEntry>> {
        let state = self.inner.borrow();
        let index = *state.by_type.get(&type_id)?;
        state.entries.get(index).cloned()
    }

    /// Returns the entry whose remote name is `module.qualname`.
    #[must_use]
    pub fn find_by_remote_name(&self, module: &str, qualname: &str) -> Option<Rc<RegistryEntry>> {
        self.inner
            .borrow()
            .entries
            .iter()
            .find(|e| e.remote_name.as_ref().is_some_and(|n| n.is(module, qualname)))
            .cloned()
    }

    /// Returns the number of registered entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.borrow().entries.len()
    }

    /// Returns `true` if no host types are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().entries.is_empty()
    }

    /// Binds `module.name` to `symbol`.
    pub fn define(&self, module: &str, name: &str, symbol: Symbol) {
        self.inner.borrow_mut().namespace.define(module, name, symbol);
    }

    /// Binds `module.name` to a native function.
    pub fn define_function(
        &self,
        module: &str,
        name: &str,
        f: impl Fn(Vec<Value>) -> Result<Value, CallError> + 'static,
    ) {
        self.define(module, name, Symbol::function(f));
    }

    /// Defines a class under its own module and name and returns the shared handle.
    pub fn define_class(&self, class: ClassDef) -> Rc<ClassDef> {
        let class = Rc::new(class);
        let (module, qualname) = (class.module().to_string(), class.qualname().to_string());
        self.define(&module, &qualname, Symbol::Class(class.clone()));
        class
    }

    /// Ensures `module.name` resolves, inserting a placeholder if it does not.
    ///
    /// Without `symbol`, the placeholder is a class with default state handling, so decoding
    /// instances of a type that only exists remotely still works. Repeated calls return the same
    /// symbol.
    pub fn inject_placeholder(&self, module: &str, name: &str, symbol: Option<Symbol>) -> Symbol {
        self.inner
            .borrow_mut()
            .namespace
            .inject_placeholder(module, name, symbol)
    }

    /// Removes a placeholder and any modules it leaves empty. Missing names are ignored.
    pub fn remove_placeholder(&self, module: &str, name: &str) {
        self.inner
            .borrow_mut()
            .namespace
            .remove_placeholder(module, name);
    }

    /// Looks `qualname` up in `module`.
    #[must_use]
    pub fn resolve(&self, module: &str, qualname: &str) -> Lookup {
        self.inner.borrow().namespace.resolve(module, qualname)
    }

    /// Resolves a dotted path such as `pkg.mod.Name`.
    #[must_use]
    pub fn resolve_dotted(&self, path: &str) -> Option<Symbol> {
        self.inner.borrow().namespace.resolve_dotted(path)
    }

    /// Returns `true` if the namespace holds a module with this path.
    #[must_use]
    pub fn has_module(&self, module: &str) -> bool {
        self.inner.borrow().namespace.has_module(module)
    }

    /// Binds extension `code` to `module.name`. Rebinding the same pair is a no-op.
    pub fn add_extension(&self, module: &str, name: &str, code: u32) -> Result<(), RegistryError> {
        if !(1..=MAX_EXTENSION_CODE).contains(&code) {
            return Err(RegistryError::BadExtensionCode { code });
        }
        let key: (Box<str>, Box<str>) = (module.into(), name.into());
        let mut state = self.inner.borrow_mut();
        let by_name = state.ext_by_name.get(&key).copied();
        let by_code = state.ext_by_code.get(&code);
        match (by_name, by_code) {
            (Some(c), Some(k)) if c == code && *k == key => return Ok(()),
            (None, None) => {}
            _ => return Err(RegistryError::ExtensionConflict { code }),
        }
        state.ext_by_name.insert(key.clone(), code);
        state.ext_by_code.insert(code, key);
        Ok(())
    }

    /// Returns the extension code bound to `module.name`.
    #[must_use]
    pub fn extension_code(&self, module: &str, name: &str) -> Option<u32> {
        let key: (Box<str>, Box<str>) = (module.into(), name.into());
        self.inner.borrow().ext_by_name.get(&key).copied()
    }

    /// Returns the `(module, name)` bound to extension `code`.
    #[must_use]
    pub fn extension(&self, code: u32) -> Option<(String, String)> {
        self.inner
            .borrow()
            .ext_by_code
            .get(&code)
            .map(|(m, n)| (m.to_string(), n.to_string()))
    }

    /// Best-effort module of a global, for encoding.
    ///
    /// Tries the global's own module, then the declared module of a registered type, then a scan
    /// of the namespace for the global's symbol, and finally falls back to `builtins`.
    #[must_use]
    pub fn module_of(&self, global: &Global) -> String {
        if let Some(m) = global.module() {
            return m.to_string();
        }
        if let Some(entry) = global.type_id().and_then(|t| self.find(t)) {
            return entry.name.module.to_string();
        }
        if let Some(sym) = global.symbol()
            && let Some(m) = self
                .inner
                .borrow()
                .namespace
                .module_of(global.qualname(), sym)
        {
            return m.to_string();
        }
        String::from("builtins")
    }

    /// Resolves a wire name through registered names, remote names first.
    ///
    /// A match on a reconstructor name yields a callable global. A match on a type name yields a
    /// global carrying the type, callable when the type has a reconstruct hook.
    pub(crate) fn decode_global(&self, module: &str, qualname: &str) -> Option<Global> {
        let (entry, kind) = {
            let state = self.inner.borrow();
            let matches = |name: &Option<Name>| name.as_ref().is_some_and(|n| n.is(module, qualname));
            state.entries.iter().find_map(|e| {
                let kind = if matches(&e.remote_reconstructor) {
                    Some(Match::Reconstructor)
                } else if matches(&e.remote_name) {
                    Some(Match::Type)
                } else if matches(&e.reconstructor) {
                    Some(Match::LocalReconstructor)
                } else if e.name.is(module, qualname) {
                    Some(Match::Type)
                } else {
                    None
                };
                kind.map(|k| (e.clone(), k))
            })?
        };
        let reconstruct = entry.reconstruct.clone().map(Symbol::Function);
        Some(match kind {
            Match::Reconstructor => {
                Global::resolved(module, qualname, None, reconstruct.or_else(|| {
                    self.lookup_symbol(module, qualname)
                }))
            }
            Match::LocalReconstructor => Global::resolved(
                module,
                qualname,
                None,
                self.lookup_symbol(module, qualname).or(reconstruct),
            ),
            Match::Type => Global::resolved(module, qualname, Some(entry.type_id), reconstruct),
        })
    }

    fn lookup_symbol(&self, module: &str, qualname: &str) -> Option<Symbol> {
        match self.resolve(module, qualname) {
            Lookup::Found(sym) => Some(sym),
            Lookup::MissingModule | Lookup::MissingAttribute => None,
        }
    }
}

#[derive(Copy, Clone)]
enum Match {
    Reconstructor,
    LocalReconstructor,
    Type,
}

impl State {
    fn synthesize_reconstructor(&self, short: &str) -> Name {
        let taken = |q: &str| {
            self.entries.iter().any(|e| {
                e.reconstructor
                    .as_ref()
                    .is_some_and(|n| n.is(INTERNAL_RECONSTRUCT_MODULE, q))
            })
        };
        let mut qualname = format!("reconstruct_{short}");
        let mut n = 1_u32;
        while taken(&qualname) {
            n += 1;
            qualname = format!("reconstruct_{short}_{n}");
        }
        Name::new(INTERNAL_RECONSTRUCT_MODULE, &qualname)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_borrow() {
            Ok(state) => f
                .debug_struct("Registry")
                .field("entries", &state.entries)
                .field("extensions", &state.ext_by_code.len())
                .finish_non_exhaustive(),
            Err(_) => f.write_str("Registry(<borrowed>)"),
        }
    }
}

#[cfg(feature = "std")]
std::thread_local! {
    static DEFAULT_REGISTRY: Registry = Registry::new();
}

/// Returns this thread's default registry, used by the `std` convenience functions.
#[cfg(feature = "std")]
#[must_use]
pub fn default_registry() -> Registry {
    DEFAULT_REGISTRY.with(Clone::clone)
}

/// Registers a host type in the default registry.
#[cfg(feature = "std")]
pub fn register<T: NativeObject>(reg: Registration<T>) -> Result<(), RegistryError> {
    default_registry().register(reg)
}

/// Injects a placeholder into the default registry's namespace.
#[cfg(feature = "std")]
pub fn inject_placeholder(module: &str, name: &str, symbol: Option<Symbol>) -> Symbol {
    default_registry().inject_placeholder(module, name, symbol)
}

/// Removes a placeholder from the default registry's namespace.
#[cfg(feature = "std")]
pub fn remove_placeholder(module: &str, name: &str) {
    default_registry().remove_placeholder(module, name);
}
