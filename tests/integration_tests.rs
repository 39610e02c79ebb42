//! End-to-end scenarios exercising the pool through its public surface only.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use surgepool::{GrowthParams, Pool, PoolConfig, ShrinkAggressiveness};

fn counting_allocator() -> (
    impl Fn() -> surgepool::Result<Option<Box<u64>>> + Send + Sync + 'static,
    Arc<AtomicUsize>,
) {
    let counter = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&counter);
    (
        move || {
            c.fetch_add(1, Ordering::Relaxed);
            Ok(Some(Box::new(0u64)))
        },
        counter,
    )
}

fn reset_cleaner(mut obj: Option<Box<u64>>) -> Option<Box<u64>> {
    if let Some(v) = obj.as_deref_mut() {
        *v = 0;
    }
    obj
}

/// S1: basic checkout/return round trips succeed and the pool closes cleanly.
#[test]
fn smoke_checkout_and_return() {
    let (allocator, _count) = counting_allocator();
    let pool: Pool<Option<Box<u64>>> =
        Pool::new(PoolConfig::new(4, 16), allocator, reset_cleaner).unwrap();

    for _ in 0..20 {
        let obj = pool.get().unwrap();
        assert!(obj.is_some());
        pool.put(obj).unwrap();
    }

    let snapshot = pool.snapshot();
    assert_eq!(snapshot.objects_in_use, 0);
    assert!(snapshot.total_gets >= 20);

    pool.close().unwrap();
}

/// S2: sustained checkout pressure without returns drives L2 past its
/// initial capacity and records at least one growth event.
#[test]
fn growth_under_sustained_demand() {
    let (allocator, _count) = counting_allocator();
    let config = PoolConfig::new(2, 20).with_growth(GrowthParams {
        threshold_factor: 4.0,
        big_growth_factor: 0.5,
        controlled_growth_factor: 1.0,
        l1_growth_trigger: 3,
    });
    let pool: Pool<Option<Box<u64>>> = Pool::new(config, allocator, reset_cleaner).unwrap();

    let mut handles = Vec::new();
    for _ in 0..10 {
        handles.push(pool.get().unwrap());
    }

    let snapshot = pool.snapshot();
    assert!(
        snapshot.current_capacity > 2,
        "expected L2 to grow past its initial capacity of 2, got {}",
        snapshot.current_capacity
    );
    assert!(snapshot.total_growth_events >= 1);

    for h in handles {
        pool.put(h).unwrap();
    }
    pool.close().unwrap();
}

/// S3: once demand drops off, the background shrink task reclaims L2 capacity.
#[test]
fn shrink_after_underutilization() {
    let (allocator, _count) = counting_allocator();
    let mut config = PoolConfig::new(50, 200)
        .with_min_capacity(10)
        .with_shrink_aggressiveness(ShrinkAggressiveness::Extreme);
    config.shrink.check_interval = Duration::from_millis(10);
    config.shrink.cooldown = Duration::from_millis(5);
    config.shrink.min_utilization_before_shrink = 90;
    config.shrink.stable_underutilization_rounds = 1;
    config.shrink.shrink_percent = 50;

    let pool: Pool<Option<Box<u64>>> = Pool::new(config, allocator, reset_cleaner).unwrap();

    for _ in 0..10 {
        let obj = pool.get().unwrap();
        pool.put(obj).unwrap();
    }

    thread::sleep(Duration::from_millis(150));

    let snapshot = pool.snapshot();
    assert!(
        snapshot.current_capacity < 50,
        "expected L2 to shrink below its initial capacity of 50, got {}",
        snapshot.current_capacity
    );
    assert!(snapshot.current_capacity >= 10, "shrink must respect min_capacity");

    pool.close().unwrap();
}

/// S4: with blocking L2 semantics and the hard limit exhausted, a `get`
/// blocks until a concurrent `put` frees an object.
#[test]
fn hard_limit_blocks_until_put() {
    let (allocator, _count) = counting_allocator();
    let config = PoolConfig::new(10, 20).with_blocking(true);
    let pool: Pool<Option<Box<u64>>> = Pool::new(config, allocator, reset_cleaner).unwrap();

    let mut handles = Vec::new();
    for _ in 0..20 {
        handles.push(pool.get().unwrap());
    }
    assert_eq!(pool.snapshot().objects_in_use, 20);

    let pool_for_waiter = pool.clone();
    let waiter = thread::spawn(move || pool_for_waiter.get().unwrap());

    thread::sleep(Duration::from_millis(100));
    assert!(!waiter.is_finished(), "get should still be blocked with every object checked out");

    let released = handles.pop().unwrap();
    pool.put(released).unwrap();

    let obj = waiter.join().unwrap();
    assert!(obj.is_some());

    pool.put(obj).unwrap();
    for h in handles {
        pool.put(h).unwrap();
    }
    pool.close().unwrap();
}

/// S5: with non-blocking L2 semantics, exhausting the hard limit returns the
/// empty sentinel rather than an error once the slow path's retries expire.
#[test]
fn non_blocking_exhaustion_returns_sentinel() {
    let (allocator, _count) = counting_allocator();
    let config = PoolConfig::new(2, 5).with_blocking(false);
    let pool: Pool<Option<Box<u64>>> = Pool::new(config, allocator, reset_cleaner).unwrap();

    let mut handles = Vec::new();
    let mut empties = 0;
    for _ in 0..6 {
        match pool.get() {
            Ok(Some(obj)) => handles.push(Some(obj)),
            Ok(None) => empties += 1,
            Err(e) => panic!("unexpected hard error: {e}"),
        }
    }

    assert_eq!(empties, 1, "expected exactly one exhausted get out of six");

    for h in handles.into_iter().flatten() {
        pool.put(Some(h)).unwrap();
    }
    pool.close().unwrap();
}

/// S6: many threads hammering get/put concurrently never lose or duplicate
/// an object and the pool closes cleanly afterward.
#[test]
fn concurrency_stress() {
    let (allocator, count) = counting_allocator();
    let config = PoolConfig::new(16, 256).with_blocking(true);
    let pool: Pool<Option<Box<u64>>> = Pool::new(config, allocator, reset_cleaner).unwrap();

    const THREADS: usize = 16;
    const ITERS: usize = 200;
    let barrier = Arc::new(Barrier::new(THREADS));
    let mut workers = Vec::new();

    for _ in 0..THREADS {
        let pool = pool.clone();
        let barrier = Arc::clone(&barrier);
        workers.push(thread::spawn(move || {
            barrier.wait();
            for _ in 0..ITERS {
                let obj = pool.get().unwrap();
                assert!(obj.is_some());
                pool.put(obj).unwrap();
            }
        }));
    }
    for w in workers {
        w.join().unwrap();
    }

    let snapshot = pool.snapshot();
    assert_eq!(snapshot.objects_in_use, 0);
    assert_eq!(snapshot.total_gets, (THREADS * ITERS) as u64);
    assert!(count.load(Ordering::Relaxed) >= 16);

    pool.close().unwrap();
}
