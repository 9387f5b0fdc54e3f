//! Microbenchmarks for the export path.
//!
//! Measures batch framing alone and framing plus the locked append.
//!
//! Run with: `cargo bench -p tracespool -- export`

#![allow(missing_docs)]

use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use tempfile::tempdir;
use tracespool::frame::{EncodeOptions, encode_batch, encode_spans};
use tracespool::proto::{KeyValue, Resource, ResourceSpans, ScopeSpans, Span};
use tracespool::{ManualClock, SpoolConfig, SpoolWriter};

/// Builds a batch of `count` resource records with one small span each.
fn sample_batch(count: usize) -> Vec<ResourceSpans> {
    (0..count)
        .map(|i| ResourceSpans {
            resource: Some(Resource {
                attributes: vec![KeyValue::string("service.name", "bench")],
                dropped_attributes_count: 0,
            }),
            scope_spans: vec![ScopeSpans {
                spans: vec![Span {
                    trace_id: vec![0xAB; 16],
                    span_id: vec![0xCD; 8],
                    name: format!("op-{i}"),
                    start_time_unix_nano: 1_700_000_000_000_000_000,
                    end_time_unix_nano: 1_700_000_000_500_000_000,
                    attributes: vec![KeyValue::int("http.status_code", 200)],
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        })
        .collect()
}

fn bench_encode_spans(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_spans/batch_size");
    let options = EncodeOptions::default();

    for count in [1, 16, 128, 512] {
        let batch = sample_batch(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| encode_spans(black_box(&batch), &options).unwrap());
        });
    }

    group.finish();
}

fn bench_export_records(c: &mut Criterion) {
    let mut group = c.benchmark_group("export_records/batch_size");

    for count in [1, 16, 128] {
        let dir = tempdir().unwrap();
        let clock = ManualClock::from_unix_seconds(1_700_000_000);
        let writer = SpoolWriter::with_clock(SpoolConfig::new(dir.path()), Arc::new(clock))
            .unwrap();
        let records: Vec<Vec<u8>> = (0..count).map(|_| vec![0x5A; 256]).collect();

        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| writer.export_records(black_box(&records)).unwrap());
        });

        writer.shutdown().unwrap();
    }

    group.finish();
}

fn bench_encode_batch(c: &mut Criterion) {
    let records: Vec<Vec<u8>> = (0..64).map(|i| vec![i; 128]).collect();

    c.bench_function("encode_batch/64x128", |b| {
        b.iter(|| encode_batch(black_box(&records)).unwrap());
    });
}

criterion_group!(
    benches,
    bench_encode_spans,
    bench_export_records,
    bench_encode_batch,
);
criterion_main!(benches);
