//! Microbenchmarks for the store's write and snapshot paths.
//!
//! Run with: `cargo bench -p syhub -- append`

#![allow(missing_docs, clippy::cast_possible_truncation)]

use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use serde_json::json;
use syhub::{IngestionAdapter, SeriesStore};

/// Creates a store with `keys` full series.
fn setup_store(keys: usize, capacity: usize) -> (SeriesStore, Vec<String>) {
    let store = SeriesStore::new(capacity).unwrap();
    let names: Vec<String> = (0..keys).map(|i| format!("metric_{i}")).collect();
    for name in &names {
        for i in 0..capacity {
            store.append(name, json!(i)).unwrap();
        }
    }
    (store, names)
}

fn bench_append_single(c: &mut Criterion) {
    let (store, names) = setup_store(1, 10);
    let mut value = 0u64;

    c.bench_function("append/single_key", |b| {
        b.iter(|| {
            value += 1;
            store.append(black_box(&names[0]), black_box(json!(value))).unwrap();
        });
    });
}

fn bench_apply_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("append/batch");

    for keys in [4usize, 16, 64] {
        let (store, names) = setup_store(keys, 10);
        group.bench_with_input(BenchmarkId::from_parameter(keys), &keys, |b, _| {
            b.iter(|| {
                store
                    .apply_batch(names.iter().map(|name| (name.as_str(), json!(21.5))))
                    .unwrap();
            });
        });
    }
    group.finish();
}

fn bench_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot");

    for capacity in [10usize, 100, 1_000] {
        let (store, _) = setup_store(16, capacity);
        group.bench_with_input(
            BenchmarkId::from_parameter(capacity),
            &capacity,
            |b, _| {
                b.iter(|| black_box(store.snapshot()));
            },
        );
    }
    group.finish();
}

fn bench_ingest_message(c: &mut Criterion) {
    let store = Arc::new(SeriesStore::with_default_capacity());
    let adapter = IngestionAdapter::new(store);
    let payload = br#"{"temperature": 25.5, "pH": 6.8, "EC": 1.2, "TDS": 610, "waterLevel": 71, "deviceID": "plt-404cca470da0"}"#;

    c.bench_function("ingest/telemetry_message", |b| {
        b.iter(|| adapter.ingest(black_box(payload)));
    });
}

criterion_group!(
    benches,
    bench_append_single,
    bench_apply_batch,
    bench_snapshot,
    bench_ingest_message
);
criterion_main!(benches);
