// src/pool/facade.rs
//! The public pool surface (C5): `get`, `put`, `close`, `snapshot`,
//! construction/preallocation, and the background shrink task.

use crate::config::PoolConfig;
use crate::error::{PoolError, Result};
use crate::fast::FastChannel;
use crate::handle::Poolable;
use crate::pool::state::{Allocator, Cleaner, Lifecycle, PoolInner, Reconfig, RefillGate, ShrinkWindow};
use crate::ring::RingBuffer;
use crate::stats::{PoolStats, Stats};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock, Weak};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

const SLOW_PATH_RETRIES: u32 = 5;
const SLOW_PATH_BACKOFF: Duration = Duration::from_millis(10);
const CLOSE_POLL_CEILING: Duration = Duration::from_secs(10);
const CLOSE_POLL_GRANULARITY: Duration = Duration::from_secs(1);

/// A generic, adaptive, thread-safe pool of pointer-like objects.
///
/// Construct with [`Pool::new`], passing an allocator that produces fresh
/// objects and a cleaner that resets a returned object to a reusable state.
/// Cheaply [`Clone`]able — all clones share the same underlying state.
pub struct Pool<T: Poolable> {
    inner: Arc<PoolInner<T>>,
}

impl<T: Poolable> Clone for Pool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Poolable> Pool<T> {
    /// Builds a new pool. Validates `config`, validates the allocator's
    /// output against the handle contract, preallocates `alloc_percent` of
    /// `initial_capacity`, and starts the background shrink task.
    pub fn new<A, C>(config: PoolConfig, allocator: A, cleaner: C) -> Result<Self>
    where
        A: Fn() -> Result<T> + Send + Sync + 'static,
        C: Fn(T) -> T + Send + Sync + 'static,
    {
        config.validate()?;

        let l2 = RingBuffer::new(config.initial_capacity)
            .with_blocking(config.blocking)
            .with_read_timeout(config.read_timeout.unwrap_or_default())
            .with_write_timeout(config.write_timeout.unwrap_or_default());
        let l1 = FastChannel::new(config.l1_initial_capacity);
        let stats = Stats::new(config.l1_initial_capacity, config.initial_capacity);

        let inner = Arc::new(PoolInner {
            config,
            allocator: Box::new(allocator) as Allocator<T>,
            cleaner: Box::new(cleaner) as Cleaner<T>,
            reconfig: RwLock::new(Reconfig {
                l2: Arc::new(l2),
                growth_blocked: false,
            }),
            l1: arc_swap::ArcSwap::from_pointee(l1),
            stats,
            refill: RefillGate::new(),
            shrink_cv: Condvar::new(),
            shrink_window: Mutex::new(ShrinkWindow { underutil_count: 0 }),
            lifecycle: Mutex::new(Lifecycle::Initializing),
            closed: AtomicBool::new(false),
            shrink_thread: Mutex::new(None),
        });

        let weak: Weak<PoolInner<T>> = Arc::downgrade(&inner);
        inner
            .reconfig
            .read()
            .unwrap()
            .l2
            .install_pre_read_block_hook(Arc::new(move || {
                match weak.upgrade() {
                    Some(inner) => drain_l1_into_l2_for_hook(&inner),
                    None => false,
                }
            }));

        Self::preallocate(&inner)?;

        *inner.lifecycle.lock().unwrap() = Lifecycle::Active;

        let thread_inner = Arc::clone(&inner);
        let handle = thread::Builder::new()
            .name("surgepool-shrink".into())
            .spawn(move || run_shrink_loop(thread_inner))
            .expect("failed to spawn background shrink thread");
        *inner.shrink_thread.lock().unwrap() = Some(handle);

        Ok(Self { inner })
    }

    fn preallocate(inner: &Arc<PoolInner<T>>) -> Result<()> {
        let pre_alloc = inner.config.initial_capacity * inner.config.alloc_percent as usize / 100;
        let l1_target = inner.config.l1_initial_capacity * inner.config.fill_aggressiveness as usize / 100;
        let l1 = inner.l1.load();
        let l2 = Arc::clone(&inner.reconfig.read().unwrap().l2);

        for _ in 0..pre_alloc {
            let obj = (inner.allocator)()?;
            if obj.is_sentinel() {
                return Err(PoolError::InvalidAllocator);
            }
            if l1.len() < l1_target {
                if let Err(obj) = l1.try_put(obj) {
                    l2.write(obj)?;
                }
            } else {
                l2.write(obj)?;
            }
        }
        debug!(
            pre_alloc,
            l1_len = l1.len(),
            l2_len = l2.length(),
            "pool preallocation complete"
        );
        Ok(())
    }

    /// Checks out an object. Returns the sentinel with no error if the pool
    /// is closed. Falls through L1 → single-flight refill → a (possibly
    /// blocking) L2 read.
    pub fn get(&self) -> Result<T> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Ok(T::sentinel());
        }

        if let Some(obj) = self.inner.l1.load().try_get() {
            self.record_checkout();
            return Ok(obj);
        }

        if let Some(obj) = self.inner.try_refill_and_get_l1()? {
            self.record_checkout();
            return Ok(obj);
        }

        let l2 = Arc::clone(&self.inner.reconfig.read().unwrap().l2);
        let mut attempt = 0;
        loop {
            match l2.get_one() {
                Ok(obj) => {
                    self.record_checkout();
                    return Ok(obj);
                }
                Err(e) if e.is_soft() && attempt < SLOW_PATH_RETRIES => {
                    attempt += 1;
                    trace!(attempt, "slow-path get transient failure, backing off");
                    thread::sleep(SLOW_PATH_BACKOFF);
                }
                // Soft protocol conditions never escape the core, even once
                // retries are exhausted: the caller sees an empty pool, not
                // an error. A deadline or a sticky EOF is reported as-is.
                Err(e) if e.is_soft() => return Ok(T::sentinel()),
                Err(e) => return Err(e),
            }
        }
    }

    fn record_checkout(&self) {
        self.inner.stats.note_get();
        self.inner.stats.note_checkout();
    }

    /// Returns an object to the pool. The cleaner always runs first — any
    /// panic inside it is caught and the object is dropped instead of
    /// returned to circulation.
    pub fn put(&self, obj: T) -> Result<()> {
        if obj.is_sentinel() {
            return Err(PoolError::InvalidObject);
        }
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(PoolError::Eof);
        }

        let cleaned = match catch_unwind(AssertUnwindSafe(|| (self.inner.cleaner)(obj))) {
            Ok(cleaned) => cleaned,
            Err(_) => {
                warn!("cleaner panicked; object dropped instead of recycled");
                self.inner.stats.note_checkin();
                // A panicking cleaner still completes this put — it just
                // never reaches either tier. Count it as a miss so
                // `fast_return_hit + fast_return_miss` still equals total
                // completed puts (Conservation, see DESIGN.md).
                self.inner.stats.note_fast_miss();
                return Ok(());
            }
        };

        self.inner.stats.note_checkin();
        self.inner.refill.cv.notify_one();

        let l2 = Arc::clone(&self.inner.reconfig.read().unwrap().l2);

        if l2.blocked_readers() > 0 {
            self.write_to_l2_with_backoff(&l2, cleaned)?;
            self.inner.stats.note_fast_miss();
            return Ok(());
        }

        match self.inner.l1.load().try_put(cleaned) {
            Ok(()) => {
                self.inner.stats.note_fast_hit();
                l2.nudge_readers();
                Ok(())
            }
            Err(rejected) => {
                self.write_to_l2_with_backoff(&l2, rejected)?;
                self.inner.stats.note_fast_miss();
                Ok(())
            }
        }
    }

    fn write_to_l2_with_backoff(&self, l2: &Arc<RingBuffer<T>>, mut obj: T) -> Result<()> {
        let mut attempt = 0;
        loop {
            match l2.write_reclaim(obj) {
                Ok(()) => return Ok(()),
                Err((e, returned)) if e.is_soft() && attempt < SLOW_PATH_RETRIES => {
                    attempt += 1;
                    obj = returned;
                    thread::sleep(SLOW_PATH_BACKOFF);
                }
                // L2 stayed full through every retry: the object has nowhere
                // to go. Soft conditions never surface, so it is dropped
                // here rather than returned as an error to the caller.
                Err((e, _)) if e.is_soft() => return Ok(()),
                Err((e, _)) => return Err(e),
            }
        }
    }

    /// Closes the pool. Waits up to 10 seconds for in-flight objects to be
    /// returned, then closes unconditionally regardless of outcome — a
    /// documented behavior that can leak handles still checked out past the
    /// deadline. Idempotent.
    pub fn close(&self) -> Result<()> {
        {
            let mut lifecycle = self.inner.lifecycle.lock().unwrap();
            if *lifecycle == Lifecycle::Closing || *lifecycle == Lifecycle::Closed {
                return Ok(());
            }
            *lifecycle = Lifecycle::Closing;
        }

        self.inner.closed.store(true, Ordering::Release);
        self.inner.shrink_cv.notify_all();

        if self.has_outstanding_objects() {
            let deadline = Instant::now() + CLOSE_POLL_CEILING;
            while Instant::now() < deadline && self.has_outstanding_objects() {
                thread::sleep(CLOSE_POLL_GRANULARITY);
            }
            if self.has_outstanding_objects() {
                warn!("closing pool with outstanding checked-out objects after 10s ceiling");
            }
        }

        let l2 = Arc::clone(&self.inner.reconfig.read().unwrap().l2);
        let _ = l2.close();

        let l1 = self.inner.l1.load_full();
        for item in l1.close() {
            let _ = catch_unwind(AssertUnwindSafe(|| (self.inner.cleaner)(item)));
        }

        if let Some(handle) = self.inner.shrink_thread.lock().unwrap().take() {
            let _ = handle.join();
        }

        *self.inner.lifecycle.lock().unwrap() = Lifecycle::Closed;
        Ok(())
    }

    fn has_outstanding_objects(&self) -> bool {
        self.inner.stats.objects_in_use() > 0
    }

    /// A consistent, point-in-time snapshot of pool statistics.
    pub fn snapshot(&self) -> PoolStats {
        let cfg = self.inner.reconfig.read().unwrap();
        let l2_len = cfg.l2.length();
        let l2_cap = cfg.l2.capacity();
        drop(cfg);

        let l1 = self.inner.l1.load();
        let l1_len = l1.len();
        let l1_cap = l1.capacity();

        PoolStats {
            objects_in_use: self.inner.stats.objects_in_use(),
            available_objects: l1_len + l2_len,
            current_capacity: l2_cap,
            ring_buffer_length: l2_len,
            peak_in_use: self.inner.stats.peak_in_use(),
            total_gets: self.inner.stats.total_gets(),
            total_growth_events: self.inner.stats.total_growth_events(),
            total_shrink_events: self.inner.stats.total_shrink_events(),
            consecutive_shrinks: self.inner.stats.consecutive_shrinks(),
            current_l1_capacity: l1_cap,
            l1_length: l1_len,
            fast_return_hit: self.inner.stats.fast_return_hit(),
            fast_return_miss: self.inner.stats.fast_return_miss(),
        }
    }
}

/// Drains up to `pre_read_block_hook_attempts` items from L1 into L2,
/// invoked by the ring buffer immediately before a reader would suspend.
fn drain_l1_into_l2_for_hook<T: Poolable>(inner: &PoolInner<T>) -> bool {
    let l2 = Arc::clone(&inner.reconfig.read().unwrap().l2);
    let l1 = inner.l1.load();
    let mut moved = false;
    for _ in 0..inner.config.pre_read_block_hook_attempts {
        match l1.try_get() {
            Some(item) => match l2.write(item) {
                Ok(()) => moved = true,
                Err(_) => break,
            },
            None => break,
        }
    }
    moved
}

fn run_shrink_loop<T: Poolable>(inner: Arc<PoolInner<T>>) {
    loop {
        if inner.closed.load(Ordering::Acquire) {
            return;
        }

        {
            let window = inner.shrink_window.lock().unwrap();
            let _ = inner
                .shrink_cv
                .wait_timeout(window, inner.config.shrink.check_interval)
                .unwrap();
        }
        if inner.closed.load(Ordering::Acquire) {
            return;
        }

        if inner.stats.consecutive_shrinks() >= inner.config.shrink.max_consecutive_shrinks {
            let window = inner.shrink_window.lock().unwrap();
            let _ = inner
                .shrink_cv
                .wait_timeout(window, inner.config.shrink.check_interval)
                .unwrap();
            continue;
        }

        if let Some(elapsed) = inner.stats.time_since_last_shrink() {
            if elapsed < inner.config.shrink.cooldown {
                continue;
            }
        }

        let l2_cap = inner.reconfig.read().unwrap().l2.capacity();
        let utilization = if l2_cap == 0 {
            0
        } else {
            (inner.stats.objects_in_use() * 100 / l2_cap) as u8
        };

        let ready = {
            let mut window = inner.shrink_window.lock().unwrap();
            if utilization <= inner.config.shrink.min_utilization_before_shrink {
                window.underutil_count += 1;
            } else {
                window.underutil_count = window.underutil_count.saturating_sub(1);
            }
            window.underutil_count >= inner.config.shrink.stable_underutilization_rounds
        };

        if ready {
            match inner.shrink_l2() {
                Ok(true) => {
                    inner.shrink_window.lock().unwrap().underutil_count = 0;
                    trace!(utilization, "background task shrank L2");
                }
                Ok(false) => {}
                Err(e) => warn!(error = %e, "background shrink attempt failed"),
            }
        }
    }
}
