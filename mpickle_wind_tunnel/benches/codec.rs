// Copyright 2026 the Execution Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use mpickle::{
    ClassDef, Global, Instance, NativeObject, Reduction, Registration, Registry, Value,
    dumps_with, loads_with,
};

/// Entry point for `mpickle` wind-tunnel benchmarks.
///
/// Each scenario isolates one cost: opcode dispatch over scalars, memo traffic from shared
/// structure, framing of large payloads, and the reduce/reconstruct path for host types.
fn bench_codec(c: &mut Criterion) {
    bench_int_list_encode(c);
    bench_int_list_decode(c);
    bench_shared_rows(c);
    bench_string_dict(c);
    bench_large_bytes(c);
    bench_instances(c);
    bench_host_objects(c);
}

fn int_list(len: usize) -> Value {
    Value::list(
        (0..len)
            .map(|i| {
                let i = i64::try_from(i).unwrap_or(i64::MAX);
                // Mix the small, two-byte and four-byte integer encodings.
                Value::Int(i * 37 % 100_003 - 50_000)
            })
            .collect(),
    )
}

/// Flat list of integers at every protocol.
///
/// Measures per-opcode encoder overhead; protocol 0 pays for text formatting.
fn bench_int_list_encode(c: &mut Criterion) {
    let registry = Registry::new();
    let v = int_list(10_000);
    let mut group = c.benchmark_group("int_list_encode");
    group.throughput(Throughput::Elements(10_000));
    for protocol in 0..=5_i32 {
        group.bench_with_input(BenchmarkId::from_parameter(protocol), &protocol, |b, &p| {
            b.iter(|| dumps_with(black_box(&v), Some(p), &registry).unwrap());
        });
    }
    group.finish();
}

/// The same list decoded from each protocol's stream.
fn bench_int_list_decode(c: &mut Criterion) {
    let registry = Registry::new();
    let v = int_list(10_000);
    let mut group = c.benchmark_group("int_list_decode");
    group.throughput(Throughput::Elements(10_000));
    for protocol in 0..=5_i32 {
        let bytes = dumps_with(&v, Some(protocol), &registry).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(protocol), &bytes, |b, bytes| {
            b.iter(|| loads_with(black_box(bytes), &registry).unwrap());
        });
    }
    group.finish();
}

/// Rows that all point at one of a few shared tuples.
///
/// Nearly every value after the first few is a memo hit, so this isolates memo lookups.
fn bench_shared_rows(c: &mut Criterion) {
    let registry = Registry::new();
    let mut group = c.benchmark_group("shared_rows_round_trip");
    for &rows in &[100_usize, 1_000, 10_000] {
        let shared: Vec<Value> = (0..8)
            .map(|i| Value::tuple(vec![Value::Int(i), Value::Float(i as f64 * 0.5)]))
            .collect();
        let v = Value::list((0..rows).map(|i| shared[i % shared.len()].clone()).collect());
        group.bench_with_input(BenchmarkId::from_parameter(rows), &v, |b, v| {
            b.iter(|| {
                let bytes = dumps_with(black_box(v), Some(5), &registry).unwrap();
                loads_with(&bytes, &registry).unwrap()
            });
        });
    }
    group.finish();
}

/// A dictionary keyed by short strings with string values.
///
/// Measures text validation and dictionary hashing on decode.
fn bench_string_dict(c: &mut Criterion) {
    let registry = Registry::new();
    let v = Value::dict((0..5_000).map(|i| {
        (
            Value::from(format!("key-{i}")),
            Value::from(format!("value \u{2192} {i}")),
        )
    }))
    .unwrap();
    let mut group = c.benchmark_group("string_dict_decode");
    for protocol in [0_i32, 2, 5] {
        let bytes = dumps_with(&v, Some(protocol), &registry).unwrap();
        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(protocol), &bytes, |b, bytes| {
            b.iter(|| loads_with(black_box(bytes), &registry).unwrap());
        });
    }
    group.finish();
}

/// One large byte payload with small neighbors.
///
/// Protocol 4 and up write the payload outside any frame, so only the header is buffered.
fn bench_large_bytes(c: &mut Criterion) {
    let registry = Registry::new();
    let mut group = c.benchmark_group("large_bytes_round_trip");
    for &size in &[64 * 1024_usize, 1024 * 1024] {
        let v = Value::list(vec![
            Value::from("head"),
            Value::bytes(&vec![0x5a; size]),
            Value::from("tail"),
        ]);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &v, |b, v| {
            b.iter(|| {
                let bytes = dumps_with(black_box(v), Some(5), &registry).unwrap();
                loads_with(&bytes, &registry).unwrap()
            });
        });
    }
    group.finish();
}

/// Class instances with a small attribute dictionary.
///
/// Exercises class memoization, `NEWOBJ`/`BUILD` and instance state on decode.
fn bench_instances(c: &mut Criterion) {
    let registry = Registry::new();
    let class = registry.define_class(ClassDef::new("geometry", "Point"));
    let v = Value::list(
        (0..1_000)
            .map(|i| {
                let mut inst = Instance::new(class.clone());
                inst.set("x", Value::Int(i));
                inst.set("y", Value::Int(-i));
                Value::instance(inst)
            })
            .collect(),
    );
    let mut group = c.benchmark_group("instances_round_trip");
    for protocol in [2_i32, 5] {
        group.bench_with_input(BenchmarkId::from_parameter(protocol), &protocol, |b, &p| {
            b.iter(|| {
                let bytes = dumps_with(black_box(&v), Some(p), &registry).unwrap();
                loads_with(&bytes, &registry).unwrap()
            });
        });
    }
    group.finish();
}

#[derive(Debug)]
struct Sample(i64);

impl NativeObject for Sample {}

/// Registered host values going through reduce and reconstruct hooks.
fn bench_host_objects(c: &mut Criterion) {
    let registry = Registry::new();
    registry
        .register(
            Registration::<Sample>::new()
                .name("bench", "Sample")
                .reduce(|s, _| Ok(Reduction::new(Global::of::<Sample>().into(), vec![s.0.into()])))
                .reconstruct(|args| {
                    let v = args.first().and_then(Value::as_i64).unwrap_or_default();
                    Ok(Value::object(Sample(v)))
                }),
        )
        .unwrap();
    let mut group = c.benchmark_group("host_objects_round_trip");
    for &count in &[100_usize, 1_000] {
        let v = Value::list(
            (0..count)
                .map(|i| Value::object(Sample(i64::try_from(i).unwrap_or(i64::MAX))))
                .collect(),
        );
        group.bench_with_input(BenchmarkId::from_parameter(count), &v, |b, v| {
            b.iter(|| {
                let bytes = dumps_with(black_box(v), Some(5), &registry).unwrap();
                loads_with(&bytes, &registry).unwrap()
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_codec);
criterion_main!(benches);
