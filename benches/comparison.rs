use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::prelude::*;
use std::collections::HashMap;
use stepmap::StepMap;

fn bench_insert_sequential(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert_sequential");

    for size in [1000, 10_000, 100_000] {
        group.bench_with_input(BenchmarkId::new("StepMap", size), &size, |b, &size| {
            b.iter(|| {
                let mut map = StepMap::new();
                for i in 0..size {
                    map.insert(i as u64, i as u64);
                }
                black_box(map)
            });
        });

        group.bench_with_input(BenchmarkId::new("HashMap", size), &size, |b, &size| {
            b.iter(|| {
                let mut map = HashMap::new();
                for i in 0..size {
                    map.insert(i as u64, i as u64);
                }
                black_box(map)
            });
        });
    }

    group.finish();
}

fn bench_insert_random(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert_random");

    for size in [1000, 10_000, 100_000] {
        let mut rng = StdRng::seed_from_u64(42);
        let keys: Vec<u64> = (0..size).map(|_| rng.gen()).collect();

        group.bench_with_input(BenchmarkId::new("StepMap", size), &keys, |b, keys| {
            b.iter(|| {
                let mut map = StepMap::new();
                for &key in keys {
                    map.insert(key, key);
                }
                black_box(map)
            });
        });

        group.bench_with_input(BenchmarkId::new("HashMap", size), &keys, |b, keys| {
            b.iter(|| {
                let mut map = HashMap::new();
                for &key in keys {
                    map.insert(key, key);
                }
                black_box(map)
            });
        });
    }

    group.finish();
}

fn bench_lookup_hit(c: &mut Criterion) {
    let mut group = c.benchmark_group("lookup_hit");

    for size in [1000, 100_000] {
        let mut map = StepMap::new();
        let mut std_map = HashMap::new();
        for i in 0..size {
            map.insert(i as u64, i as u64);
            std_map.insert(i as u64, i as u64);
        }
        while map.rehash(100) {}

        group.bench_with_input(BenchmarkId::new("StepMap", size), &size, |b, &size| {
            b.iter(|| {
                for i in 0..size {
                    black_box(map.get(&(i as u64)));
                }
            });
        });

        group.bench_with_input(BenchmarkId::new("HashMap", size), &size, |b, &size| {
            b.iter(|| {
                for i in 0..size {
                    black_box(std_map.get(&(i as u64)));
                }
            });
        });
    }

    group.finish();
}

/// Lookups while a grow is being worked off: both tables live.
fn bench_lookup_mid_rehash(c: &mut Criterion) {
    let mut group = c.benchmark_group("lookup_mid_rehash");

    for size in [10_000usize] {
        let mut map = StepMap::new();
        for i in 0..size {
            map.insert(i as u64, i as u64);
        }
        while map.rehash(100) {}
        map.expand(map.buckets() * 2);
        map.rehash(size / 2);
        assert!(map.is_rehashing());

        group.bench_with_input(BenchmarkId::new("StepMap", size), &size, |b, &size| {
            b.iter(|| {
                for i in 0..size {
                    black_box(map.get(&(i as u64)));
                }
            });
        });
    }

    group.finish();
}

fn bench_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("scan");

    for size in [10_000] {
        let mut map = StepMap::new();
        for i in 0..size {
            map.insert(i as u64, i as u64);
        }
        while map.rehash(100) {}

        group.bench_with_input(BenchmarkId::new("StepMap", size), &size, |b, _| {
            b.iter(|| {
                let mut sum = 0u64;
                let mut cursor = 0;
                loop {
                    cursor = map.scan(cursor, |_, v| sum += *v);
                    if cursor == 0 {
                        break;
                    }
                }
                black_box(sum)
            });
        });
    }

    group.finish();
}

fn bench_remove(c: &mut Criterion) {
    let mut group = c.benchmark_group("remove");

    for size in [1000, 10_000] {
        group.bench_with_input(BenchmarkId::new("StepMap", size), &size, |b, &size| {
            b.iter_batched(
                || {
                    let mut map = StepMap::new();
                    for i in 0..size {
                        map.insert(i as u64, i as u64);
                    }
                    map
                },
                |mut map| {
                    for i in 0..size {
                        black_box(map.remove(&(i as u64)));
                    }
                    map
                },
                criterion::BatchSize::SmallInput,
            );
        });

        group.bench_with_input(BenchmarkId::new("HashMap", size), &size, |b, &size| {
            b.iter_batched(
                || {
                    let mut map = HashMap::new();
                    for i in 0..size {
                        map.insert(i as u64, i as u64);
                    }
                    map
                },
                |mut map| {
                    for i in 0..size {
                        black_box(map.remove(&(i as u64)));
                    }
                    map
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_insert_sequential,
    bench_insert_random,
    bench_lookup_hit,
    bench_lookup_mid_rehash,
    bench_scan,
    bench_remove,
);

criterion_main!(benches);
