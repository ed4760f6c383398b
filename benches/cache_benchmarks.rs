//! TTL cache benchmarks for rampart-cache

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use rampart_cache::{CacheKey, TtlCache};
use serde_json::json;
use std::hint::black_box;
use std::time::Duration;

const TTL: Duration = Duration::from_secs(3600);

fn cache_set_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_set");
    group.throughput(Throughput::Elements(1));

    let cache: TtlCache<String> = TtlCache::new();
    group.bench_function("set_string", |b| {
        b.iter(|| cache.set(black_box("contacts:list:abc"), "value".to_string(), TTL))
    });

    group.finish();
}

fn cache_get_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_get");
    group.throughput(Throughput::Elements(1));

    let cache: TtlCache<String> = TtlCache::new();
    cache.set("contacts:list:abc", "value".to_string(), TTL);

    group.bench_function("hit", |b| b.iter(|| black_box(cache.get(black_box("contacts:list:abc")))));

    group.bench_function("miss", |b| b.iter(|| black_box(cache.get(black_box("contacts:list:none")))));

    group.finish();
}

fn cache_invalidate_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_invalidate");

    for size in [100, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::new("service_pattern", size), &size, |b, &size| {
            b.iter_batched(
                || {
                    let cache: TtlCache<u64> = TtlCache::new();
                    for i in 0..size {
                        let service = if i % 2 == 0 { "contacts" } else { "deals" };
                        cache.set(&format!("{service}:list:{i}"), i, TTL);
                    }
                    cache
                },
                |cache| black_box(cache.invalidate("contacts:")),
                criterion::BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn cache_key_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_key");

    let params = json!({ "workspace": 42, "page": 3, "filters": ["open", "mine"] });
    group.bench_function("build_with_params", |b| {
        b.iter(|| {
            CacheKey::new("contacts")
                .entity("list")
                .params(black_box(&params))
                .map(|key| key.build())
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    cache_set_benchmark,
    cache_get_benchmark,
    cache_invalidate_benchmark,
    cache_key_benchmark
);
criterion_main!(benches);
