// Performance benchmarks for slabcache

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::Rng;
use slabcache::store::{FileStore, MemoryStore};
use slabcache::{Options, SlabCache, StoreOptions, WriteBatch};
use std::hint::black_box;
use tempfile::TempDir;

fn bench_options() -> Options {
    Options::default().total_slabs(192).blocks_per_slab(128).block_size(4096).gc_min_threshold(16)
}

fn benchmark_sequential_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("sequential_put");
    let value = vec![b'x'; 4096];

    for size in [1_000, 10_000, 50_000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let cache = SlabCache::new(MemoryStore::new(), bench_options()).unwrap();
                for i in 0..size {
                    let key = format!("key{:08}", i);
                    black_box(cache.put(key.as_bytes(), &value).unwrap());
                }
                black_box(cache.stats());
            });
        });
    }

    group.finish();
}

/// Random keys over a key space larger than the cache, mostly reads
fn benchmark_random_workload(c: &mut Criterion) {
    let mut group = c.benchmark_group("random_workload");
    let value = vec![b'v'; 4096];
    let key_space = 40_000u32;

    for ops in [10_000, 100_000].iter() {
        group.throughput(Throughput::Elements(*ops as u64));
        group.bench_with_input(BenchmarkId::from_parameter(ops), ops, |b, &ops| {
            let cache = SlabCache::new(MemoryStore::new(), bench_options()).unwrap();
            let mut rng = rand::rng();

            b.iter(|| {
                for _ in 0..ops {
                    let key = format!("key{:08}", rng.random_range(0..key_space));
                    if rng.random_bool(0.3) {
                        black_box(cache.put(key.as_bytes(), &value).unwrap());
                    } else {
                        black_box(cache.get(key.as_bytes()).unwrap());
                    }
                }
            });

            let stats = cache.stats();
            black_box((stats.hit_rate(), stats.gc_runs));
        });
    }

    group.finish();
}

fn benchmark_bulk_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("bulk_load");

    for batch_size in [100, 1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*batch_size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            batch_size,
            |b, &batch_size| {
                let batch: WriteBatch =
                    (0..batch_size).map(|i| (format!("ingest{:08}", i), vec![b'b'; 512])).collect();
                b.iter(|| {
                    let cache = SlabCache::new(MemoryStore::new(), bench_options()).unwrap();
                    black_box(cache.bulk_load(&batch).unwrap());
                });
            },
        );
    }

    group.finish();
}

fn benchmark_file_store_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("file_store_put");
    let value = vec![b'f'; 4096];

    for size in [100, 1_000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let temp_dir = TempDir::new().unwrap();
                let store = FileStore::open(temp_dir.path(), StoreOptions::default()).unwrap();
                let cache = SlabCache::new(store, bench_options()).unwrap();
                for i in 0..size {
                    let key = format!("key{:08}", i);
                    black_box(cache.put(key.as_bytes(), &value).unwrap());
                }
                cache.flush().unwrap();
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_sequential_put,
    benchmark_random_workload,
    benchmark_bulk_load,
    benchmark_file_store_put
);
criterion_main!(benches);
