//! Chunking and merge benchmarks: initial load, append, and overlapping merge.

use channel_store::{
    build_chunks, ChannelDataReader, ChannelDataStore, ChannelIndexInfo, ChannelLayout,
    ChunkResult, Config,
};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::{json, Value};
use std::hint::black_box;
use std::time::Duration;

const URI: &str = "eml://witsml14/well(w1)/wellbore(b1)/log(bench)";
const CHANNELS: usize = 8;

fn make_reader(from: i64, to: i64) -> ChannelDataReader {
    let mnemonics: Vec<String> = (0..CHANNELS).map(|c| format!("CH{c}")).collect();
    let layout = ChannelLayout::new(
        URI,
        vec![ChannelIndexInfo::depth("MD", "m", true).with_scale(1)],
        mnemonics,
        vec!["u".to_string(); CHANNELS],
        vec!["-999.25".to_string(); CHANNELS],
    )
    .expect("layout");
    let rows: Vec<Vec<Value>> = (from..to)
        .map(|i| {
            let depth = i as f64 / 10.0;
            std::iter::once(json!(depth))
                .chain((0..CHANNELS).map(|c| json!(depth * (c as f64 + 1.0))))
                .collect()
        })
        .collect();
    ChannelDataReader::new(layout, rows).expect("reader")
}

fn bench_config() -> Config {
    let mut config = Config::default();
    config.chunking.depth_range_size = 100;
    config
}

fn bench_build_chunks(c: &mut Criterion) {
    let config = bench_config();
    let mut group = c.benchmark_group("build_chunks");
    for &size in &[1_000i64, 10_000, 100_000] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &sz| {
            b.iter_batched(
                || make_reader(0, sz),
                |reader| {
                    build_chunks(reader, &config.chunking)
                        .collect::<ChunkResult<Vec<_>>>()
                        .expect("chunks")
                },
                criterion::BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn bench_merge_append(c: &mut Criterion) {
    let config = bench_config();
    c.bench_function("merge_append_1000", |b| {
        b.iter_batched(
            || {
                let store = ChannelDataStore::in_memory(&config).expect("store");
                store.add(make_reader(0, 10_000), None).expect("add");
                (store, make_reader(10_000, 11_000))
            },
            |(store, update)| black_box(store.merge(update, None).expect("merge")),
            criterion::BatchSize::LargeInput,
        );
    });
}

fn bench_merge_overlap(c: &mut Criterion) {
    let config = bench_config();
    c.bench_function("merge_overlap_5000", |b| {
        b.iter_batched(
            || {
                let store = ChannelDataStore::in_memory(&config).expect("store");
                store.add(make_reader(0, 10_000), None).expect("add");
                (store, make_reader(2_500, 7_500))
            },
            |(store, update)| black_box(store.merge(update, None).expect("merge")),
            criterion::BatchSize::LargeInput,
        );
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .measurement_time(Duration::from_secs(10))
        .warm_up_time(Duration::from_secs(3));
    targets = bench_build_chunks, bench_merge_append, bench_merge_overlap
}
criterion_main!(benches);
