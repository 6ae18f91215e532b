// Copyright 2026 the Execution Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Streams written by the reference host implementation, one per protocol.
//!
//! Every stream must decode to the expected value. Streams whose values contain no text or byte
//! strings must also be reproduced byte for byte; strings differ only because the reference host
//! memoizes them and this codec does not.

use mpickle::{ClassDef, Registry, Value, dumps_with, loads_with};
use mpickle_conformance::{int_list, protocols};

const LIST: [&[u8]; 6] = [
    b"(lp0\nI1\naI2\naI3\na.",
    b"]q\x00(K\x01K\x02K\x03e.",
    b"\x80\x02]q\x00(K\x01K\x02K\x03e.",
    b"\x80\x03]q\x00(K\x01K\x02K\x03e.",
    b"\x80\x04\x95\x0b\x00\x00\x00\x00\x00\x00\x00]\x94(K\x01K\x02K\x03e.",
    b"\x80\x05\x95\x0b\x00\x00\x00\x00\x00\x00\x00]\x94(K\x01K\x02K\x03e.",
];

const MIXED: [&[u8]; 6] = [
    b"(dp0\nVa\np1\n(lp2\nI1\naF2.5\naNaI01\nasVb\np3\n(I1\nVx\np4\ntp5\ns.",
    b"}q\x00(X\x01\x00\x00\x00aq\x01]q\x02(K\x01G@\x04\x00\x00\x00\x00\x00\x00NI01\neX\x01\x00\x00\x00bq\x03(K\x01X\x01\x00\x00\x00xq\x04tq\x05u.",
    b"\x80\x02}q\x00(X\x01\x00\x00\x00aq\x01]q\x02(K\x01G@\x04\x00\x00\x00\x00\x00\x00N\x88eX\x01\x00\x00\x00bq\x03K\x01X\x01\x00\x00\x00xq\x04\x86q\x05u.",
    b"\x80\x03}q\x00(X\x01\x00\x00\x00aq\x01]q\x02(K\x01G@\x04\x00\x00\x00\x00\x00\x00N\x88eX\x01\x00\x00\x00bq\x03K\x01X\x01\x00\x00\x00xq\x04\x86q\x05u.",
    b"\x80\x04\x95&\x00\x00\x00\x00\x00\x00\x00}\x94(\x8c\x01a\x94]\x94(K\x01G@\x04\x00\x00\x00\x00\x00\x00N\x88e\x8c\x01b\x94K\x01\x8c\x01x\x94\x86\x94u.",
    b"\x80\x05\x95&\x00\x00\x00\x00\x00\x00\x00}\x94(\x8c\x01a\x94]\x94(K\x01G@\x04\x00\x00\x00\x00\x00\x00N\x88e\x8c\x01b\x94K\x01\x8c\x01x\x94\x86\x94u.",
];

const BYTES: [&[u8]; 6] = [
    b"c_codecs\nencode\np0\n(V\\u0000\xff\np1\nVlatin1\np2\ntp3\nRp4\n.",
    b"c_codecs\nencode\nq\x00(X\x03\x00\x00\x00\x00\xc3\xbfq\x01X\x06\x00\x00\x00latin1q\x02tq\x03Rq\x04.",
    b"\x80\x02c_codecs\nencode\nq\x00X\x03\x00\x00\x00\x00\xc3\xbfq\x01X\x06\x00\x00\x00latin1q\x02\x86q\x03Rq\x04.",
    b"\x80\x03C\x02\x00\xffq\x00.",
    b"\x80\x04\x95\x06\x00\x00\x00\x00\x00\x00\x00C\x02\x00\xff\x94.",
    b"\x80\x05\x95\x06\x00\x00\x00\x00\x00\x00\x00C\x02\x00\xff\x94.",
];

const BYTEARRAY: [&[u8]; 6] = [
    b"c__builtin__\nbytearray\np0\n(c_codecs\nencode\np1\n(Vab\np2\nVlatin1\np3\ntp4\nRp5\ntp6\nRp7\n.",
    b"c__builtin__\nbytearray\nq\x00(c_codecs\nencode\nq\x01(X\x02\x00\x00\x00abq\x02X\x06\x00\x00\x00latin1q\x03tq\x04Rq\x05tq\x06Rq\x07.",
    b"\x80\x02c__builtin__\nbytearray\nq\x00c_codecs\nencode\nq\x01X\x02\x00\x00\x00abq\x02X\x06\x00\x00\x00latin1q\x03\x86q\x04Rq\x05\x85q\x06Rq\x07.",
    b"\x80\x03cbuiltins\nbytearray\nq\x00C\x02abq\x01\x85q\x02Rq\x03.",
    b"\x80\x04\x95#\x00\x00\x00\x00\x00\x00\x00\x8c\x08builtins\x94\x8c\x09bytearray\x94\x93\x94C\x02ab\x94\x85\x94R\x94.",
    b"\x80\x05\x95\x0d\x00\x00\x00\x00\x00\x00\x00\x96\x02\x00\x00\x00\x00\x00\x00\x00ab\x94.",
];

const SET: [&[u8]; 6] = [
    b"c__builtin__\nset\np0\n((lp1\nI1\naI2\naI3\natp2\nRp3\n.",
    b"c__builtin__\nset\nq\x00(]q\x01(K\x01K\x02K\x03etq\x02Rq\x03.",
    b"\x80\x02c__builtin__\nset\nq\x00]q\x01(K\x01K\x02K\x03e\x85q\x02Rq\x03.",
    b"\x80\x03cbuiltins\nset\nq\x00]q\x01(K\x01K\x02K\x03e\x85q\x02Rq\x03.",
    b"\x80\x04\x95\x0b\x00\x00\x00\x00\x00\x00\x00\x8f\x94(K\x01K\x02K\x03\x90.",
    b"\x80\x05\x95\x0b\x00\x00\x00\x00\x00\x00\x00\x8f\x94(K\x01K\x02K\x03\x90.",
];

const FROZENSET: [&[u8]; 6] = [
    b"c__builtin__\nfrozenset\np0\n((lp1\nI7\natp2\nRp3\n.",
    b"c__builtin__\nfrozenset\nq\x00(]q\x01K\x07atq\x02Rq\x03.",
    b"\x80\x02c__builtin__\nfrozenset\nq\x00]q\x01K\x07a\x85q\x02Rq\x03.",
    b"\x80\x03cbuiltins\nfrozenset\nq\x00]q\x01K\x07a\x85q\x02Rq\x03.",
    b"\x80\x04\x95\x06\x00\x00\x00\x00\x00\x00\x00(K\x07\x91\x94.",
    b"\x80\x05\x95\x06\x00\x00\x00\x00\x00\x00\x00(K\x07\x91\x94.",
];

const BIG: [&[u8]; 6] = [
    b"(lp0\nL1267650600228229401496703205376L\naL-1180591620717411303424L\na.",
    b"]q\x00(L1267650600228229401496703205376L\nL-1180591620717411303424L\ne.",
    b"\x80\x02]q\x00(\x8a\x0d\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x10\x8a\x09\x00\x00\x00\x00\x00\x00\x00\x00\xc0e.",
    b"\x80\x03]q\x00(\x8a\x0d\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x10\x8a\x09\x00\x00\x00\x00\x00\x00\x00\x00\xc0e.",
    b"\x80\x04\x95\x1f\x00\x00\x00\x00\x00\x00\x00]\x94(\x8a\x0d\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x10\x8a\x09\x00\x00\x00\x00\x00\x00\x00\x00\xc0e.",
    b"\x80\x05\x95\x1f\x00\x00\x00\x00\x00\x00\x00]\x94(\x8a\x0d\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x10\x8a\x09\x00\x00\x00\x00\x00\x00\x00\x00\xc0e.",
];

const SHARED: [&[u8]; 6] = [
    b"(lp0\n(lp1\nI1\naag1\na(dp2\nVr\np3\ng1\nsa.",
    b"]q\x00(]q\x01K\x01ah\x01}q\x02X\x01\x00\x00\x00rq\x03h\x01se.",
    b"\x80\x02]q\x00(]q\x01K\x01ah\x01}q\x02X\x01\x00\x00\x00rq\x03h\x01se.",
    b"\x80\x03]q\x00(]q\x01K\x01ah\x01}q\x02X\x01\x00\x00\x00rq\x03h\x01se.",
    b"\x80\x04\x95\x15\x00\x00\x00\x00\x00\x00\x00]\x94(]\x94K\x01ah\x01}\x94\x8c\x01r\x94h\x01se.",
    b"\x80\x05\x95\x15\x00\x00\x00\x00\x00\x00\x00]\x94(]\x94K\x01ah\x01}\x94\x8c\x01r\x94h\x01se.",
];

const COMPLEX: [&[u8]; 6] = [
    b"c__builtin__\ncomplex\np0\n(F1.0\nF2.0\ntp1\nRp2\n.",
    b"c__builtin__\ncomplex\nq\x00(G?\xf0\x00\x00\x00\x00\x00\x00G@\x00\x00\x00\x00\x00\x00\x00tq\x01Rq\x02.",
    b"\x80\x02c__builtin__\ncomplex\nq\x00G?\xf0\x00\x00\x00\x00\x00\x00G@\x00\x00\x00\x00\x00\x00\x00\x86q\x01Rq\x02.",
    b"\x80\x03cbuiltins\ncomplex\nq\x00G?\xf0\x00\x00\x00\x00\x00\x00G@\x00\x00\x00\x00\x00\x00\x00\x86q\x01Rq\x02.",
    b"\x80\x04\x95.\x00\x00\x00\x00\x00\x00\x00\x8c\x08builtins\x94\x8c\x07complex\x94\x93\x94G?\xf0\x00\x00\x00\x00\x00\x00G@\x00\x00\x00\x00\x00\x00\x00\x86\x94R\x94.",
    b"\x80\x05\x95.\x00\x00\x00\x00\x00\x00\x00\x8c\x08builtins\x94\x8c\x07complex\x94\x93\x94G?\xf0\x00\x00\x00\x00\x00\x00G@\x00\x00\x00\x00\x00\x00\x00\x86\x94R\x94.",
];

const TEXT: [&[u8]; 6] = [
    b"Vcaf\xe9 \\u263a\\u000a\np0\n.",
    b"X\n\x00\x00\x00caf\xc3\xa9 \xe2\x98\xba\nq\x00.",
    b"\x80\x02X\n\x00\x00\x00caf\xc3\xa9 \xe2\x98\xba\nq\x00.",
    b"\x80\x03X\n\x00\x00\x00caf\xc3\xa9 \xe2\x98\xba\nq\x00.",
    b"\x80\x04\x95\x0e\x00\x00\x00\x00\x00\x00\x00\x8c\ncaf\xc3\xa9 \xe2\x98\xba\n\x94.",
    b"\x80\x05\x95\x0e\x00\x00\x00\x00\x00\x00\x00\x8c\ncaf\xc3\xa9 \xe2\x98\xba\n\x94.",
];

const POINT: [&[u8]; 6] = [
    b"ccopy_reg\n_reconstructor\np0\n(cgeometry\nPoint\np1\nc__builtin__\nobject\np2\nNtp3\nRp4\n(dp5\nVx\np6\nI3\nsVy\np7\nI-4\nsb.",
    b"ccopy_reg\n_reconstructor\nq\x00(cgeometry\nPoint\nq\x01c__builtin__\nobject\nq\x02Ntq\x03Rq\x04}q\x05(X\x01\x00\x00\x00xq\x06K\x03X\x01\x00\x00\x00yq\x07J\xfc\xff\xff\xffub.",
    b"\x80\x02cgeometry\nPoint\nq\x00)\x81q\x01}q\x02(X\x01\x00\x00\x00xq\x03K\x03X\x01\x00\x00\x00yq\x04J\xfc\xff\xff\xffub.",
    b"\x80\x03cgeometry\nPoint\nq\x00)\x81q\x01}q\x02(X\x01\x00\x00\x00xq\x03K\x03X\x01\x00\x00\x00yq\x04J\xfc\xff\xff\xffub.",
    b"\x80\x04\x95-\x00\x00\x00\x00\x00\x00\x00\x8c\x08geometry\x94\x8c\x05Point\x94\x93\x94)\x81\x94}\x94(\x8c\x01x\x94K\x03\x8c\x01y\x94J\xfc\xff\xff\xffub.",
    b"\x80\x05\x95-\x00\x00\x00\x00\x00\x00\x00\x8c\x08geometry\x94\x8c\x05Point\x94\x93\x94)\x81\x94}\x94(\x8c\x01x\x94K\x03\x8c\x01y\x94J\xfc\xff\xff\xffub.",
];

const FLOATS: [&[u8]; 6] = [
    b"(lp0\nFinf\naF-0.0\naF1e-07\na.",
    b"]q\x00(G\x7f\xf0\x00\x00\x00\x00\x00\x00G\x80\x00\x00\x00\x00\x00\x00\x00G>z\xd7\xf2\x9a\xbc\xafHe.",
    b"\x80\x02]q\x00(G\x7f\xf0\x00\x00\x00\x00\x00\x00G\x80\x00\x00\x00\x00\x00\x00\x00G>z\xd7\xf2\x9a\xbc\xafHe.",
    b"\x80\x03]q\x00(G\x7f\xf0\x00\x00\x00\x00\x00\x00G\x80\x00\x00\x00\x00\x00\x00\x00G>z\xd7\xf2\x9a\xbc\xafHe.",
    b"\x80\x04\x95 \x00\x00\x00\x00\x00\x00\x00]\x94(G\x7f\xf0\x00\x00\x00\x00\x00\x00G\x80\x00\x00\x00\x00\x00\x00\x00G>z\xd7\xf2\x9a\xbc\xafHe.",
    b"\x80\x05\x95 \x00\x00\x00\x00\x00\x00\x00]\x94(G\x7f\xf0\x00\x00\x00\x00\x00\x00G\x80\x00\x00\x00\x00\x00\x00\x00G>z\xd7\xf2\x9a\xbc\xafHe.",
];

const NESTED: [&[u8]; 6] = [
    b"(lp0\n(lp1\nI1\na(I2\nI3\ntp2\naa(dp3\nI4\nF5.0\nsI6\nNsa(ta(I01\ntp4\naI00\naI-70000\naL9223372036854775808L\na.",
    b"]q\x00(]q\x01(K\x01(K\x02K\x03tq\x02e}q\x03(K\x04G@\x14\x00\x00\x00\x00\x00\x00K\x06Nu)(I01\ntq\x04I00\nJ\x90\xee\xfe\xffL9223372036854775808L\ne.",
    b"\x80\x02]q\x00(]q\x01(K\x01K\x02K\x03\x86q\x02e}q\x03(K\x04G@\x14\x00\x00\x00\x00\x00\x00K\x06Nu)\x88\x85q\x04\x89J\x90\xee\xfe\xff\x8a\x09\x00\x00\x00\x00\x00\x00\x00\x80\x00e.",
    b"\x80\x03]q\x00(]q\x01(K\x01K\x02K\x03\x86q\x02e}q\x03(K\x04G@\x14\x00\x00\x00\x00\x00\x00K\x06Nu)\x88\x85q\x04\x89J\x90\xee\xfe\xff\x8a\x09\x00\x00\x00\x00\x00\x00\x00\x80\x00e.",
    b"\x80\x04\x958\x00\x00\x00\x00\x00\x00\x00]\x94(]\x94(K\x01K\x02K\x03\x86\x94e}\x94(K\x04G@\x14\x00\x00\x00\x00\x00\x00K\x06Nu)\x88\x85\x94\x89J\x90\xee\xfe\xff\x8a\x09\x00\x00\x00\x00\x00\x00\x00\x80\x00e.",
    b"\x80\x05\x958\x00\x00\x00\x00\x00\x00\x00]\x94(]\x94(K\x01K\x02K\x03\x86\x94e}\x94(K\x04G@\x14\x00\x00\x00\x00\x00\x00K\x06Nu)\x88\x85\x94\x89J\x90\xee\xfe\xff\x8a\x09\x00\x00\x00\x00\x00\x00\x00\x80\x00e.",
];

const SHARED_TUPLE: [&[u8]; 6] = [
    b"(lp0\n(I1\ntp1\nag1\na.",
    b"]q\x00((K\x01tq\x01h\x01e.",
    b"\x80\x02]q\x00(K\x01\x85q\x01h\x01e.",
    b"\x80\x03]q\x00(K\x01\x85q\x01h\x01e.",
    b"\x80\x04\x95\x0b\x00\x00\x00\x00\x00\x00\x00]\x94(K\x01\x85\x94h\x01e.",
    b"\x80\x05\x95\x0b\x00\x00\x00\x00\x00\x00\x00]\x94(K\x01\x85\x94h\x01e.",
];

const PY2_DICT: &[u8] = b"(dp0\nS'k'\np1\nI5\nsS'u'\np2\nVx\np3\ns.";

fn each(fixtures: &[&[u8]; 6], check: impl Fn(u8, Value)) {
    let registry = Registry::new();
    for p in protocols() {
        let v = loads_with(fixtures[usize::from(p)], &registry)
            .unwrap_or_else(|e| panic!("protocol {p}: {e}"));
        check(p, v);
    }
}

fn text(s: &str) -> Value {
    Value::from(s)
}

#[test]
fn list_of_ints() {
    each(&LIST, |p, v| assert_eq!(v, int_list(&[1, 2, 3]), "protocol {p}"));
}

#[test]
fn mixed_dict() {
    let expected = Value::dict([
        (
            text("a"),
            Value::list(vec![
                Value::Int(1),
                Value::Float(2.5),
                Value::None,
                Value::Bool(true),
            ]),
        ),
        (text("b"), Value::tuple(vec![Value::Int(1), text("x")])),
    ])
    .unwrap();
    each(&MIXED, |p, v| assert_eq!(v, expected, "protocol {p}"));
}

#[test]
fn byte_strings() {
    each(&BYTES, |p, v| {
        assert_eq!(v, Value::bytes(b"\x00\xff"), "protocol {p}");
    });
    each(&BYTEARRAY, |p, v| {
        assert_eq!(v, Value::bytearray(b"ab".to_vec()), "protocol {p}");
    });
}

#[test]
fn sets() {
    let ints = [1, 2, 3].map(Value::Int);
    each(&SET, |p, v| {
        assert_eq!(v, Value::set(ints.clone()).unwrap(), "protocol {p}");
    });
    each(&FROZENSET, |p, v| {
        assert_eq!(v, Value::frozenset([Value::Int(7)]).unwrap(), "protocol {p}");
    });
}

#[test]
fn big_integers() {
    each(&BIG, |p, v| {
        let items = v.as_list().unwrap().borrow();
        let rendered: Vec<String> = items
            .iter()
            .map(|i| i.as_bigint().unwrap().to_string())
            .collect();
        assert_eq!(
            rendered,
            ["1267650600228229401496703205376", "-1180591620717411303424"],
            "protocol {p}"
        );
    });
}

#[test]
fn shared_references_keep_identity() {
    each(&SHARED, |p, v| {
        let items = v.as_list().unwrap().borrow();
        assert_eq!(items[0], int_list(&[1]), "protocol {p}");
        assert!(items[0].is_same(&items[1]), "protocol {p}");
        let d = items[2].as_dict().unwrap().borrow();
        assert!(d.get_str("r").unwrap().is_same(&items[0]), "protocol {p}");
    });
}

#[test]
fn complex_numbers() {
    each(&COMPLEX, |p, v| assert_eq!(v, Value::complex(1.0, 2.0), "protocol {p}"));
}

#[test]
fn unicode_text() {
    each(&TEXT, |p, v| assert_eq!(v, text("caf\u{e9} \u{263a}\n"), "protocol {p}"));
}

#[test]
fn class_instances() {
    let registry = Registry::new();
    let point = registry.define_class(ClassDef::new("geometry", "Point"));
    for p in protocols() {
        let v = loads_with(POINT[usize::from(p)], &registry).unwrap();
        let inst = v.as_instance().unwrap().borrow();
        assert!(std::rc::Rc::ptr_eq(inst.class(), &point), "protocol {p}");
        assert_eq!(inst.get("x"), Some(&Value::Int(3)), "protocol {p}");
        assert_eq!(inst.get("y"), Some(&Value::Int(-4)), "protocol {p}");
    }
}

#[test]
fn instances_of_unknown_classes_need_a_placeholder() {
    let registry = Registry::new();
    assert!(loads_with(POINT[2], &registry).is_err());
    registry.inject_placeholder("geometry", "Point", None);
    let v = loads_with(POINT[2], &registry).unwrap();
    assert_eq!(
        v.as_instance().unwrap().borrow().get("x"),
        Some(&Value::Int(3))
    );
}

#[test]
fn special_floats() {
    each(&FLOATS, |p, v| {
        let items = v.as_list().unwrap().borrow();
        let floats: Vec<f64> = items.iter().map(|f| f.as_f64().unwrap()).collect();
        assert_eq!(floats[0], f64::INFINITY, "protocol {p}");
        assert!(floats[1] == 0.0 && floats[1].is_sign_negative(), "protocol {p}");
        assert_eq!(floats[2], 1e-7, "protocol {p}");
    });
}

#[test]
fn legacy_byte_strings_decode_as_ascii() {
    let registry = Registry::new();
    let v = loads_with(PY2_DICT, &registry).unwrap();
    let expected = Value::dict([(text("k"), Value::Int(5)), (text("u"), text("x"))]).unwrap();
    assert_eq!(v, expected);
}

#[test]
fn string_free_streams_are_reproduced_exactly() {
    let registry = Registry::new();
    for (name, fixtures) in [
        ("list", &LIST),
        ("big", &BIG),
        ("floats", &FLOATS),
        ("nested", &NESTED),
        ("shared tuple", &SHARED_TUPLE),
    ] {
        for p in protocols() {
            let reference = fixtures[usize::from(p)];
            let decoded = loads_with(reference, &registry).unwrap();
            let encoded = dumps_with(&decoded, Some(i32::from(p)), &registry).unwrap();
            assert_eq!(encoded, reference, "{name} at protocol {p}");
        }
    }
}

#[test]
fn nested_value_built_locally_matches_reference() {
    let registry = Registry::new();
    let v = Value::list(vec![
        Value::list(vec![
            Value::Int(1),
            Value::tuple(vec![Value::Int(2), Value::Int(3)]),
        ]),
        Value::dict([(Value::Int(4), Value::Float(5.0)), (Value::Int(6), Value::None)]).unwrap(),
        Value::tuple(vec![]),
        Value::tuple(vec![Value::Bool(true)]),
        Value::Bool(false),
        Value::Int(-70000),
        Value::from(1_u64 << 63),
    ]);
    for p in protocols() {
        let encoded = dumps_with(&v, Some(i32::from(p)), &registry).unwrap();
        assert_eq!(encoded, NESTED[usize::from(p)], "protocol {p}");
    }
}
