// Copyright 2026 the Execution Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Legacy module and name mappings applied to protocol 0-2 streams when `fix_imports` is on.

/// Legacy module path to current module path.
const IMPORT_MAPPING: &[(&str, &str)] = &[
    ("__builtin__", "builtins"),
    ("copy_reg", "copyreg"),
    ("Queue", "queue"),
    ("SocketServer", "socketserver"),
    ("ConfigParser", "configparser"),
    ("repr", "reprlib"),
    ("_winreg", "winreg"),
    ("thread", "_thread"),
    ("httplib", "http.client"),
    ("htmlentitydefs", "html.entities"),
    ("urlparse", "urllib.parse"),
    ("robotparser", "urllib.robotparser"),
    ("cPickle", "pickle"),
    ("_abcoll", "collections.abc"),
    ("UserDict", "collections"),
    ("UserList", "collections"),
    ("UserString", "collections"),
];

/// Legacy `(module, name)` to current `(module, name)`; the reverse direction uses these too.
const NAME_MAPPING: &[((&str, &str), (&str, &str))] = &[
    (("__builtin__", "xrange"), ("builtins", "range")),
    (("__builtin__", "reduce"), ("functools", "reduce")),
    (("__builtin__", "intern"), ("sys", "intern")),
    (("__builtin__", "unichr"), ("builtins", "chr")),
    (("__builtin__", "unicode"), ("builtins", "str")),
    (("__builtin__", "long"), ("builtins", "int")),
    (("itertools", "izip"), ("builtins", "zip")),
    (("itertools", "imap"), ("builtins", "map")),
    (("itertools", "ifilter"), ("builtins", "filter")),
    (("itertools", "ifilterfalse"), ("itertools", "filterfalse")),
    (("itertools", "izip_longest"), ("itertools", "zip_longest")),
    (("UserDict", "IterableUserDict"), ("collections", "UserDict")),
];

/// Decode-only mappings with no inverse.
const ONE_WAY_NAME_MAPPING: &[((&str, &str), (&str, &str))] = &[
    (("__builtin__", "basestring"), ("builtins", "str")),
    (("exceptions", "StandardError"), ("builtins", "Exception")),
    (("UserDict", "UserDict"), ("collections", "UserDict")),
];

/// Maps a legacy name to its current spelling.
pub(crate) fn to_current<'a>(module: &'a str, name: &'a str) -> (&'a str, &'a str) {
    let key = (module, name);
    if let Some((_, to)) = NAME_MAPPING
        .iter()
        .chain(ONE_WAY_NAME_MAPPING)
        .find(|(from, _)| *from == key)
    {
        return *to;
    }
    match IMPORT_MAPPING.iter().find(|(from, _)| *from == module) {
        Some((_, to)) => (to, name),
        None => key,
    }
}

/// Maps a current name to the legacy spelling older readers expect.
pub(crate) fn to_legacy<'a>(module: &'a str, name: &'a str) -> (&'a str, &'a str) {
    let key = (module, name);
    if let Some((from, _)) = NAME_MAPPING.iter().find(|(_, to)| *to == key) {
        return *from;
    }
    match IMPORT_MAPPING.iter().find(|(_, to)| *to == module) {
        Some((from, _)) => (from, name),
        None => key,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_and_name_mappings() {
        assert_eq!(to_current("__builtin__", "set"), ("builtins", "set"));
        assert_eq!(to_current("copy_reg", "_reconstructor"), ("copyreg", "_reconstructor"));
        assert_eq!(to_current("__builtin__", "unicode"), ("builtins", "str"));
        assert_eq!(to_current("__builtin__", "basestring"), ("builtins", "str"));
        assert_eq!(to_current("mymod", "X"), ("mymod", "X"));

        assert_eq!(to_legacy("builtins", "complex"), ("__builtin__", "complex"));
        assert_eq!(to_legacy("builtins", "int"), ("__builtin__", "long"));
        assert_eq!(to_legacy("copyreg", "__newobj__"), ("copy_reg", "__newobj__"));
        assert_eq!(to_legacy("_codecs", "encode"), ("_codecs", "encode"));
    }
}
