// src/stats.rs
//! Pool statistics: live atomics plus a point-in-time snapshot.

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Instant;

/// Live, lock-free counters updated on the hot path.
///
/// A handful of timing fields that don't fit an atomic well (`Instant` has
/// no atomic form) live behind a small dedicated mutex, taken only by the
/// capacity controller and the snapshot call — never on `get`/`put`.
pub(crate) struct Stats {
    pub objects_in_use: AtomicUsize,
    pub peak_in_use: AtomicUsize,
    pub total_gets: AtomicU64,
    pub total_growth_events: AtomicU64,
    pub total_shrink_events: AtomicU64,
    pub consecutive_shrinks: AtomicU32,
    pub last_l1_resize_at_growth: AtomicU64,
    pub last_l1_resize_at_shrink: AtomicU64,
    pub current_l1_cap: AtomicUsize,
    pub current_l2_cap: AtomicUsize,
    pub fast_return_hit: AtomicU64,
    pub fast_return_miss: AtomicU64,
    timing: Mutex<Timing>,
}

struct Timing {
    last_shrink_time: Option<Instant>,
    last_grow_time: Option<Instant>,
}

impl Stats {
    pub(crate) fn new(l1_cap: usize, l2_cap: usize) -> Self {
        Self {
            objects_in_use: AtomicUsize::new(0),
            peak_in_use: AtomicUsize::new(0),
            total_gets: AtomicU64::new(0),
            total_growth_events: AtomicU64::new(0),
            total_shrink_events: AtomicU64::new(0),
            consecutive_shrinks: AtomicU32::new(0),
            last_l1_resize_at_growth: AtomicU64::new(0),
            last_l1_resize_at_shrink: AtomicU64::new(0),
            current_l1_cap: AtomicUsize::new(l1_cap),
            current_l2_cap: AtomicUsize::new(l2_cap),
            fast_return_hit: AtomicU64::new(0),
            fast_return_miss: AtomicU64::new(0),
            timing: Mutex::new(Timing {
                last_shrink_time: None,
                last_grow_time: None,
            }),
        }
    }

    /// Increments `objects_in_use` and updates `peak_in_use`, used on a
    /// successful `get` (any path) and on fresh allocation during refill.
    pub(crate) fn note_checkout(&self) {
        let now = self.objects_in_use.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak_in_use.fetch_max(now, Ordering::AcqRel);
    }

    /// Decrements `objects_in_use` via CAS, never going below zero.
    pub(crate) fn note_checkin(&self) {
        let mut cur = self.objects_in_use.load(Ordering::Acquire);
        while cur > 0 {
            match self.objects_in_use.compare_exchange_weak(
                cur,
                cur - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(observed) => cur = observed,
            }
        }
    }

    pub(crate) fn note_get(&self) {
        self.total_gets.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn note_fast_hit(&self) {
        self.fast_return_hit.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn note_fast_miss(&self) {
        self.fast_return_miss.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn note_growth(&self, new_l2_cap: usize) {
        self.total_growth_events.fetch_add(1, Ordering::Relaxed);
        self.current_l2_cap.store(new_l2_cap, Ordering::Release);
        self.timing.lock().unwrap().last_grow_time = Some(Instant::now());
    }

    pub(crate) fn note_l1_resize(&self, new_l1_cap: usize, growth_event_count: u64) {
        self.current_l1_cap.store(new_l1_cap, Ordering::Release);
        self.last_l1_resize_at_growth.store(growth_event_count, Ordering::Release);
    }

    pub(crate) fn note_l1_shrink(&self, new_l1_cap: usize, shrink_event_count: u64) {
        self.current_l1_cap.store(new_l1_cap, Ordering::Release);
        self.last_l1_resize_at_shrink.store(shrink_event_count, Ordering::Release);
    }

    pub(crate) fn note_shrink(&self, new_l2_cap: usize) {
        self.total_shrink_events.fetch_add(1, Ordering::Relaxed);
        self.current_l2_cap.store(new_l2_cap, Ordering::Release);
        self.consecutive_shrinks.fetch_add(1, Ordering::Relaxed);
        self.timing.lock().unwrap().last_shrink_time = Some(Instant::now());
    }

    pub(crate) fn reset_consecutive_shrinks(&self) {
        self.consecutive_shrinks.store(0, Ordering::Release);
    }

    pub(crate) fn consecutive_shrinks(&self) -> u32 {
        self.consecutive_shrinks.load(Ordering::Acquire)
    }

    pub(crate) fn time_since_last_shrink(&self) -> Option<std::time::Duration> {
        self.timing.lock().unwrap().last_shrink_time.map(|t| t.elapsed())
    }

    pub(crate) fn total_growth_events(&self) -> u64 {
        self.total_growth_events.load(Ordering::Acquire)
    }

    pub(crate) fn total_shrink_events(&self) -> u64 {
        self.total_shrink_events.load(Ordering::Acquire)
    }

    pub(crate) fn last_l1_resize_at_growth(&self) -> u64 {
        self.last_l1_resize_at_growth.load(Ordering::Acquire)
    }

    pub(crate) fn last_l1_resize_at_shrink(&self) -> u64 {
        self.last_l1_resize_at_shrink.load(Ordering::Acquire)
    }

    pub(crate) fn objects_in_use(&self) -> usize {
        self.objects_in_use.load(Ordering::Acquire)
    }

    pub(crate) fn total_gets(&self) -> u64 {
        self.total_gets.load(Ordering::Acquire)
    }

    pub(crate) fn fast_return_hit(&self) -> u64 {
        self.fast_return_hit.load(Ordering::Acquire)
    }

    pub(crate) fn fast_return_miss(&self) -> u64 {
        self.fast_return_miss.load(Ordering::Acquire)
    }

    pub(crate) fn current_l1_cap(&self) -> usize {
        self.current_l1_cap.load(Ordering::Acquire)
    }

    pub(crate) fn current_l2_cap(&self) -> usize {
        self.current_l2_cap.load(Ordering::Acquire)
    }

    pub(crate) fn peak_in_use(&self) -> usize {
        self.peak_in_use.load(Ordering::Acquire)
    }
}

/// Point-in-time pool statistics, returned by [`crate::Pool::snapshot`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolStats {
    /// Objects currently checked out by callers.
    pub objects_in_use: usize,
    /// Objects immediately available across both tiers (`L1.len + L2.len`).
    pub available_objects: usize,
    /// Current L2 (ring buffer) capacity.
    pub current_capacity: usize,
    /// Current L2 occupancy.
    pub ring_buffer_length: usize,
    /// High-water mark of `objects_in_use`.
    pub peak_in_use: usize,
    /// Total successful `get` calls.
    pub total_gets: u64,
    /// Total L2 growth events.
    pub total_growth_events: u64,
    /// Total L2 shrink events.
    pub total_shrink_events: u64,
    /// Current run length of consecutive shrink events.
    pub consecutive_shrinks: u32,
    /// Current L1 capacity.
    pub current_l1_capacity: usize,
    /// Current L1 occupancy.
    pub l1_length: usize,
    /// Total `put`s satisfied by a direct L1 enqueue.
    pub fast_return_hit: u64,
    /// Total `put`s that had to go through L2.
    pub fast_return_miss: u64,
}

impl PoolStats {
    /// `objects_in_use / current_capacity`, as a percent in `0..=100`.
    pub fn utilization(&self) -> f64 {
        if self.current_capacity == 0 {
            0.0
        } else {
            (self.objects_in_use as f64 / self.current_capacity as f64) * 100.0
        }
    }

    /// `fast_return_miss / (fast_return_hit + fast_return_miss)`, the
    /// fraction of returns that had to spill past L1 into L2.
    pub fn l2_spill_rate(&self) -> f64 {
        let total = self.fast_return_hit + self.fast_return_miss;
        if total == 0 {
            0.0
        } else {
            self.fast_return_miss as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkin_never_goes_negative() {
        let s = Stats::new(8, 8);
        s.note_checkin();
        assert_eq!(s.objects_in_use(), 0);
    }

    #[test]
    fn checkout_tracks_peak() {
        let s = Stats::new(8, 8);
        s.note_checkout();
        s.note_checkout();
        s.note_checkin();
        assert_eq!(s.objects_in_use(), 1);
        assert_eq!(s.peak_in_use(), 2);
    }

    #[test]
    fn derived_metrics() {
        let stats = PoolStats {
            objects_in_use: 25,
            available_objects: 75,
            current_capacity: 100,
            ring_buffer_length: 70,
            peak_in_use: 30,
            total_gets: 40,
            total_growth_events: 1,
            total_shrink_events: 0,
            consecutive_shrinks: 0,
            current_l1_capacity: 16,
            l1_length: 5,
            fast_return_hit: 3,
            fast_return_miss: 1,
        };
        assert_eq!(stats.utilization(), 25.0);
        assert_eq!(stats.l2_spill_rate(), 0.25);
    }
}
