// benches/pool_bench.rs
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;
use std::thread;
use surgepool::prelude::*;

fn allocator() -> Result<Option<Box<u64>>> {
    Ok(Some(Box::new(0u64)))
}

fn cleaner(mut obj: Option<Box<u64>>) -> Option<Box<u64>> {
    if let Some(v) = obj.as_deref_mut() {
        *v = 0;
    }
    obj
}

fn bench_get_put_roundtrip(c: &mut Criterion) {
    let mut group = c.benchmark_group("get_put_roundtrip");

    for capacity in [16, 64, 256].iter() {
        let pool: Pool<Option<Box<u64>>> =
            Pool::new(PoolConfig::new(*capacity, capacity * 4), allocator, cleaner).unwrap();

        group.bench_with_input(BenchmarkId::new("warm_pool", capacity), capacity, |b, _| {
            b.iter(|| {
                let obj = pool.get().unwrap();
                pool.put(black_box(obj)).unwrap();
            });
        });
    }

    group.finish();
}

fn bench_direct_alloc_vs_pool(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_comparison");

    group.bench_function("with_pool", |b| {
        let pool: Pool<Option<Box<u64>>> =
            Pool::new(PoolConfig::new(32, 128), allocator, cleaner).unwrap();

        b.iter(|| {
            let obj = pool.get().unwrap();
            pool.put(black_box(obj)).unwrap();
        });
    });

    group.bench_function("direct_alloc", |b| {
        b.iter(|| {
            let obj: Option<Box<u64>> = Some(Box::new(0u64));
            black_box(obj);
        });
    });

    group.finish();
}

fn bench_contended_checkout(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended_checkout");

    for threads in [1, 4, 8].iter() {
        group.bench_with_input(BenchmarkId::new("threads", threads), threads, |b, &threads| {
            let pool: Pool<Option<Box<u64>>> =
                Pool::new(PoolConfig::new(64, 512).with_blocking(true), allocator, cleaner)
                    .unwrap();

            b.iter(|| {
                let mut handles = Vec::with_capacity(threads);
                for _ in 0..threads {
                    let pool = pool.clone();
                    handles.push(thread::spawn(move || {
                        for _ in 0..50 {
                            let obj = pool.get().unwrap();
                            pool.put(black_box(obj)).unwrap();
                        }
                    }));
                }
                for h in handles {
                    h.join().unwrap();
                }
            });
        });
    }

    group.finish();
}

fn bench_growth_under_pressure(c: &mut Criterion) {
    let mut group = c.benchmark_group("growth_under_pressure");

    group.bench_function("checkout_to_hard_limit", |b| {
        b.iter(|| {
            let pool: Pool<Option<Box<u64>>> =
                Pool::new(PoolConfig::new(4, 64), allocator, cleaner).unwrap();
            let mut handles = Vec::new();
            for _ in 0..black_box(64) {
                handles.push(pool.get().unwrap());
            }
            for h in handles {
                pool.put(h).unwrap();
            }
            pool.close().unwrap();
        });
    });

    group.finish();
}

fn bench_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot");

    let pool: Pool<Option<Box<u64>>> =
        Pool::new(PoolConfig::new(32, 128), allocator, cleaner).unwrap();
    let _held: Arc<_> = Arc::new(pool.get().unwrap());

    group.bench_function("pool_snapshot", |b| {
        b.iter(|| black_box(pool.snapshot()));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_get_put_roundtrip,
    bench_direct_alloc_vs_pool,
    bench_contended_checkout,
    bench_growth_under_pressure,
    bench_snapshot,
);

criterion_main!(benches);
