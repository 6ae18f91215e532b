// Copyright 2026 the Execution Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Symbols the wire format names directly: the `builtins` constructors used by reductions,
//! the `copyreg` object-creation helpers, and `_codecs.encode`.

use alloc::format;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;

use crate::error::CallError;
use crate::namespace::Namespace;
use crate::text::{self, Encoding};
use crate::value::{ClassDef, Global, Instance, Symbol, Value};

/// Resolves `module.qualname` for `getattr`.
pub(crate) type Resolver = Rc<dyn Fn(&str, &str) -> Option<Symbol>>;

pub(crate) fn install(ns: &mut Namespace, resolve: Resolver) {
    let b = "builtins";
    ns.define(b, "object", Symbol::Class(Rc::new(ClassDef::new(b, "object"))));
    ns.define(b, "complex", Symbol::function(complex));
    ns.define(b, "bytes", Symbol::function(bytes));
    ns.define(b, "bytearray", Symbol::function(bytearray));
    ns.define(b, "list", Symbol::function(|args| Ok(Value::list(optional_items(args)?))));
    ns.define(b, "tuple", Symbol::function(|args| Ok(Value::tuple(optional_items(args)?))));
    ns.define(
        b,
        "set",
        Symbol::function(|args| Value::set(optional_items(args)?).map_err(unhashable)),
    );
    ns.define(
        b,
        "frozenset",
        Symbol::function(|args| Value::frozenset(optional_items(args)?).map_err(unhashable)),
    );
    ns.define(b, "dict", Symbol::function(dict));
    ns.define(
        b,
        "getattr",
        Symbol::function(move |args| getattr(&resolve, args)),
    );

    let c = "copyreg";
    ns.define(c, "_reconstructor", Symbol::function(reconstructor));
    ns.define(c, "__newobj__", Symbol::function(newobj));
    ns.define(c, "__newobj_ex__", Symbol::function(newobj_ex));

    ns.define("_codecs", "encode", Symbol::function(codecs_encode));
}

/// Creates an instance of `cls` the way `cls.__new__(cls, *args)` would.
///
/// Classes produce an empty [`Instance`] and ignore `args`; callables are invoked with `args`.
pub(crate) fn instantiate(cls: &Value, args: Vec<Value>) -> Result<Value, CallError> {
    let Value::Global(g) = cls else {
        return Err(CallError::new(format!(
            "cannot instantiate a {} object",
            cls.type_name()
        )));
    };
    match g.symbol() {
        Some(Symbol::Class(class)) => Ok(Value::instance(Instance::new(class.clone()))),
        Some(sym @ Symbol::Function(_)) => sym.call(args),
        None => Err(not_callable(g)),
    }
}

pub(crate) fn not_callable(g: &Global) -> CallError {
    CallError::new(format!(
        "{}.{} is not callable",
        g.module().unwrap_or("?"),
        g.qualname()
    ))
}

fn unhashable(e: crate::aggregates::Unhashable) -> CallError {
    CallError::new(format!("{e}"))
}

fn arity(name: &str, args: &[Value], min: usize, max: usize) -> Result<(), CallError> {
    if (min..=max).contains(&args.len()) {
        return Ok(());
    }
    Err(CallError::new(format!(
        "{name}() takes {min} to {max} arguments ({} given)",
        args.len()
    )))
}

/// Collects the elements of an iterable value.
fn items_of(v: &Value) -> Result<Vec<Value>, CallError> {
    Ok(match v {
        Value::List(l) => l.borrow().clone(),
        Value::Tuple(t) => t.to_vec(),
        Value::Set(s) => s.borrow().iter().cloned().collect(),
        Value::FrozenSet(s) => s.iter().cloned().collect(),
        Value::Dict(d) => d.borrow().keys().cloned().collect(),
        Value::Bytes(b) => b.iter().map(|&x| Value::from(x)).collect(),
        Value::ByteArray(b) => b.borrow().iter().map(|&x| Value::from(x)).collect(),
        Value::Str(s) => s.chars().map(|c| Value::from(String::from(c))).collect(),
        other => {
            return Err(CallError::new(format!(
                "'{}' object is not iterable",
                other.type_name()
            )));
        }
    })
}

fn optional_items(args: Vec<Value>) -> Result<Vec<Value>, CallError> {
    arity("constructor", &args, 0, 1)?;
    match args.first() {
        Some(v) => items_of(v),
        None => Ok(Vec::new()),
    }
}

fn complex(args: Vec<Value>) -> Result<Value, CallError> {
    arity("complex", &args, 0, 2)?;
    let part = |i: usize| -> Result<f64, CallError> {
        match args.get(i) {
            None => Ok(0.0),
            Some(v) => v
                .as_f64()
                .ok_or_else(|| CallError::new("complex() arguments must be real numbers")),
        }
    };
    Ok(Value::complex(part(0)?, part(1)?))
}

fn byte_items(v: &Value) -> Result<Vec<u8>, CallError> {
    match v {
        Value::Bytes(b) => Ok(b.to_vec()),
        Value::ByteArray(b) => Ok(b.borrow().clone()),
        other => items_of(other)?
            .iter()
            .map(|x| {
                x.as_i64()
                    .and_then(|i| u8::try_from(i).ok())
                    .ok_or_else(|| CallError::new("bytes must be in range(0, 256)"))
            })
            .collect(),
    }
}

/// `bytes()`, `bytes(iterable)` or `bytes(str, encoding)`.
fn byte_args(name: &str, args: &[Value]) -> Result<Vec<u8>, CallError> {
    arity(name, args, 0, 2)?;
    match args {
        [] => Ok(Vec::new()),
        [Value::Str(s), enc] => {
            let enc = enc
                .as_str()
                .and_then(Encoding::from_name)
                .ok_or_else(|| CallError::new("unknown encoding"))?;
            text::encode(s, enc).map_err(|e| CallError::new(format!("{e}")))
        }
        [Value::Str(_)] => Err(CallError::new("string argument without an encoding")),
        [v] => byte_items(v),
        _ => Err(CallError::new(format!("{name}() encoding must be a str"))),
    }
}

fn bytes(args: Vec<Value>) -> Result<Value, CallError> {
    Ok(Value::bytes(&byte_args("bytes", &args)?))
}

fn bytearray(args: Vec<Value>) -> Result<Value, CallError> {
    Ok(Value::bytearray(byte_args("bytearray", &args)?))
}

fn dict(args: Vec<Value>) -> Result<Value, CallError> {
    arity("dict", &args, 0, 1)?;
    let Some(src) = args.first() else {
        return Value::dict([]).map_err(unhashable);
    };
    if let Value::Dict(d) = src {
        let pairs: Vec<_> = d.borrow().iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        return Value::dict(pairs).map_err(unhashable);
    }
    let pairs = items_of(src)?
        .into_iter()
        .map(|p| match p.as_tuple() {
            Some([k, v]) => Ok((k.clone(), v.clone())),
            _ => Err(CallError::new("dictionary update sequence element has wrong length")),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Value::dict(pairs).map_err(unhashable)
}

fn getattr(resolve: &Resolver, args: Vec<Value>) -> Result<Value, CallError> {
    arity("getattr", &args, 2, 2)?;
    let (Value::Global(parent), Some(attr)) = (&args[0], args[1].as_str()) else {
        return Err(CallError::new("getattr() expects a global and an attribute name"));
    };
    let module = parent.module().unwrap_or("builtins");
    let qualname = format!("{}.{attr}", parent.qualname());
    let symbol = resolve(module, &qualname).ok_or_else(|| {
        CallError::new(format!("module {module} has no attribute {qualname}"))
    })?;
    Ok(Value::from(Global::resolved(module, &qualname, None, Some(symbol))))
}

/// `copyreg._reconstructor(cls, base, state)`.
fn reconstructor(args: Vec<Value>) -> Result<Value, CallError> {
    arity("_reconstructor", &args, 3, 3)?;
    if !args[2].is_none() {
        return Err(CallError::new("_reconstructor() only supports a None base state"));
    }
    instantiate(&args[0], Vec::new())
}

/// `copyreg.__newobj__(cls, *args)`.
fn newobj(mut args: Vec<Value>) -> Result<Value, CallError> {
    if args.is_empty() {
        return Err(CallError::new("__newobj__() requires a class"));
    }
    let cls = args.remove(0);
    instantiate(&cls, args)
}

/// `copyreg.__newobj_ex__(cls, args, kwargs)`.
fn newobj_ex(args: Vec<Value>) -> Result<Value, CallError> {
    arity("__newobj_ex__", &args, 3, 3)?;
    let positional = args[1]
        .as_tuple()
        .ok_or_else(|| CallError::new("__newobj_ex__() args must be a tuple"))?
        .to_vec();
    let no_kwargs = args[2].as_dict().is_some_and(|d| d.borrow().is_empty());
    if !no_kwargs {
        return Err(CallError::new("keyword arguments are not supported"));
    }
    instantiate(&args[0], positional)
}

/// `_codecs.encode(text, encoding)`.
fn codecs_encode(args: Vec<Value>) -> Result<Value, CallError> {
    arity("encode", &args, 1, 2)?;
    let text = args[0]
        .as_str()
        .ok_or_else(|| CallError::new("encode() argument must be str"))?;
    let enc = match args.get(1) {
        None => Encoding::Utf8,
        Some(e) => e
            .as_str()
            .and_then(Encoding::from_name)
            .ok_or_else(|| CallError::new("unknown encoding"))?,
    };
    text::encode(text, enc)
        .map(|b| Value::bytes(&b))
        .map_err(|e| CallError::new(format!("{e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespace::Lookup;
    use alloc::vec;

    fn ns() -> Namespace {
        let mut ns = Namespace::new();
        install(&mut ns, Rc::new(|_, _| None));
        ns
    }

    fn call(ns: &Namespace, module: &str, name: &str, args: Vec<Value>) -> Result<Value, CallError> {
        match ns.resolve(module, name) {
            Lookup::Found(sym) => sym.call(args),
            _ => panic!("{module}.{name} missing"),
        }
    }

    #[test]
    fn constructors() {
        let ns = ns();
        assert_eq!(
            call(&ns, "builtins", "complex", vec![1.into(), 2.5.into()]).unwrap(),
            Value::complex(1.0, 2.5)
        );
        assert_eq!(
            call(&ns, "builtins", "bytes", Vec::new()).unwrap(),
            Value::bytes(b"")
        );
        assert_eq!(
            call(&ns, "builtins", "bytearray", vec!["\u{e9}".into(), "latin-1".into()]).unwrap(),
            Value::bytearray(vec![0xe9])
        );
        assert_eq!(
            call(&ns, "builtins", "bytes", vec![Value::list(vec![104.into(), 105.into()])])
                .unwrap(),
            Value::bytes(b"hi")
        );
        let s = call(&ns, "builtins", "frozenset", vec![Value::list(vec![1.into(), 1.into()])])
            .unwrap();
        assert_eq!(s, Value::frozenset([1.into()]).unwrap());
        assert!(call(&ns, "builtins", "set", vec![1.into()]).is_err());
    }

    #[test]
    fn codecs_encode_latin1() {
        let ns = ns();
        assert_eq!(
            call(&ns, "_codecs", "encode", vec!["\u{ff}a".into(), "latin1".into()]).unwrap(),
            Value::bytes(&[0xff, b'a'])
        );
        assert!(call(&ns, "_codecs", "encode", vec!["\u{20ac}".into(), "latin1".into()]).is_err());
    }

    #[test]
    fn copyreg_instantiates_classes() {
        let ns = ns();
        let class = Rc::new(ClassDef::new("shapes", "Dot"));
        let cls = Value::from(Global::from_class(&class));
        let obj = call(&ns, "copyreg", "__newobj__", vec![cls.clone()]).unwrap();
        assert!(obj.as_instance().is_some());

        let object = match ns.resolve("builtins", "object") {
            Lookup::Found(Symbol::Class(c)) => Value::from(Global::from_class(&c)),
            _ => panic!("builtins.object missing"),
        };
        let obj = call(&ns, "copyreg", "_reconstructor", vec![cls, object, Value::None]).unwrap();
        assert!(obj.as_instance().is_some());

        let unresolved = Value::global("x", "y");
        assert!(instantiate(&unresolved, Vec::new()).is_err());
    }

    #[test]
    fn getattr_resolves_nested_names() {
        let mut ns = Namespace::new();
        let inner = Symbol::function(|_| Ok(Value::Int(7)));
        let probe = inner.clone();
        install(
            &mut ns,
            Rc::new(move |m, q| (m == "pkg" && q == "Outer.inner").then(|| probe.clone())),
        );
        let got = call(
            &ns,
            "builtins",
            "getattr",
            vec![Value::global("pkg", "Outer"), "inner".into()],
        )
        .unwrap();
        let g = got.as_global().unwrap();
        assert_eq!(g.qualname(), "Outer.inner");
        assert!(g.symbol().unwrap().ptr_eq(&inner));
    }
}
