// src/ring/buffer.rs
//! Bounded, optionally-blocking circular buffer — the L2 "slow path" (C1).
//!
//! # Naming note
//!
//! The blocking primitives are named from the *waiter's* point of view, not
//! the operation's: `block_for_space` is what a writer does when the buffer
//! is full (waiting for some reader to make room); `block_for_data` is what
//! a reader does when the buffer is empty (waiting for some writer to
//! produce something). `read_timeout` bounds how long a blocking `get_one`
//! may wait; `write_timeout` bounds how long a blocking `write` may wait —
//! the natural, caller-facing pairing (mirroring `recv_timeout`/
//! `send_timeout` on channel types elsewhere in the ecosystem).
//!
//! # Memory
//!
//! Slots hold `T` directly; an unused slot holds `T::sentinel()`. Capacity
//! is fixed at construction — growth and shrink (owned by the capacity
//! controller) allocate a *new* `RingBuffer` and migrate items across,
//! rather than resizing in place.

use crate::error::{PoolError, Result};
use crate::handle::Poolable;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

struct RingState<T: Poolable> {
    buf: Vec<T>,
    r: usize,
    w: usize,
    is_full: bool,
    closed: bool,
}

enum BlockOutcome {
    Ready,
    TimedOut,
    Closed,
}

/// A thread-safe bounded ring buffer of `T`, blocking or non-blocking.
pub struct RingBuffer<T: Poolable> {
    state: Mutex<RingState<T>>,
    data_available: Condvar,
    space_available: Condvar,
    blocked_readers: AtomicUsize,
    blocked_writers: AtomicUsize,
    blocking: AtomicBool,
    read_timeout_ms: AtomicU64,
    write_timeout_ms: AtomicU64,
    pre_read_block_hook: Mutex<Option<Arc<dyn Fn() -> bool + Send + Sync>>>,
    cap: usize,
}

impl<T: Poolable> RingBuffer<T> {
    /// Creates a new ring buffer of the given capacity, pre-filled with sentinels.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be > 0");
        let mut buf = Vec::with_capacity(capacity);
        buf.resize_with(capacity, T::sentinel);
        Self {
            state: Mutex::new(RingState {
                buf,
                r: 0,
                w: 0,
                is_full: false,
                closed: false,
            }),
            data_available: Condvar::new(),
            space_available: Condvar::new(),
            blocked_readers: AtomicUsize::new(0),
            blocked_writers: AtomicUsize::new(0),
            blocking: AtomicBool::new(false),
            read_timeout_ms: AtomicU64::new(0),
            write_timeout_ms: AtomicU64::new(0),
            pre_read_block_hook: Mutex::new(None),
            cap,
        }
    }

    // ------------------------------------------------------------------
    // Builder-style configuration (call before use)
    // ------------------------------------------------------------------

    /// Enables or disables blocking semantics.
    pub fn with_blocking(self, blocking: bool) -> Self {
        self.blocking.store(blocking, Ordering::Release);
        self
    }

    /// Sets the timeout for a blocking `get_one`/`get_n` wait. Zero means no timeout.
    pub fn with_read_timeout(self, timeout: Duration) -> Self {
        self.read_timeout_ms.store(timeout.as_millis() as u64, Ordering::Release);
        self
    }

    /// Sets the timeout for a blocking `write`/`write_many` wait. Zero means no timeout.
    pub fn with_write_timeout(self, timeout: Duration) -> Self {
        self.write_timeout_ms.store(timeout.as_millis() as u64, Ordering::Release);
        self
    }

    /// Installs the pre-read-block hook, invoked immediately before a reader
    /// would suspend. If the hook returns `true` the reader re-checks the
    /// buffer instead of blocking — used by the pool facade to drain L1 into
    /// L2 just-in-time and avoid a real suspension.
    pub fn with_pre_read_block_hook<F>(self, hook: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        *self.pre_read_block_hook.lock().unwrap() = Some(Arc::new(hook));
        self
    }

    /// Installs or replaces the pre-read-block hook without requiring
    /// ownership — used when the hook needs a handle (e.g. a weak reference
    /// to the owning pool) that only exists after the buffer has already
    /// been constructed and shared.
    pub(crate) fn install_pre_read_block_hook(&self, hook: Arc<dyn Fn() -> bool + Send + Sync>) {
        *self.pre_read_block_hook.lock().unwrap() = Some(hook);
    }

    /// Copies blocking/timeout/hook tunables from `source` onto `self`.
    ///
    /// Used when installing a freshly grown or shrunk buffer so it behaves
    /// identically to the one it replaces.
    pub fn copy_config(&self, source: &RingBuffer<T>) {
        self.blocking.store(source.blocking.load(Ordering::Acquire), Ordering::Release);
        self.read_timeout_ms
            .store(source.read_timeout_ms.load(Ordering::Acquire), Ordering::Release);
        self.write_timeout_ms
            .store(source.write_timeout_ms.load(Ordering::Acquire), Ordering::Release);
        let hook = source.pre_read_block_hook.lock().unwrap().clone();
        *self.pre_read_block_hook.lock().unwrap() = hook;
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// Total capacity, fixed at construction.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.cap
    }

    /// Number of items currently held.
    pub fn length(&self) -> usize {
        let state = self.state.lock().unwrap();
        self.len_locked(&state)
    }

    /// Free slots remaining.
    pub fn free(&self) -> usize {
        self.cap - self.length()
    }

    /// `true` if the buffer holds no items.
    pub fn is_empty(&self) -> bool {
        let state = self.state.lock().unwrap();
        self.is_empty_locked(&state)
    }

    /// `true` if the buffer is at capacity.
    pub fn is_full(&self) -> bool {
        self.state.lock().unwrap().is_full
    }

    /// Number of callers currently blocked waiting to read.
    pub fn blocked_readers(&self) -> usize {
        self.blocked_readers.load(Ordering::Acquire)
    }

    /// Number of callers currently blocked waiting to write.
    pub fn blocked_writers(&self) -> usize {
        self.blocked_writers.load(Ordering::Acquire)
    }

    fn len_locked(&self, state: &RingState<T>) -> usize {
        if state.is_full {
            self.cap
        } else if state.w >= state.r {
            state.w - state.r
        } else {
            self.cap - state.r + state.w
        }
    }

    fn is_empty_locked(&self, state: &RingState<T>) -> bool {
        state.r == state.w && !state.is_full
    }

    // ------------------------------------------------------------------
    // Single-item operations
    // ------------------------------------------------------------------

    /// Writes a single item, blocking if configured and full. Drops the item
    /// on failure — use [`RingBuffer::write_reclaim`] when the caller needs
    /// the item back to retry elsewhere (e.g. a backoff loop).
    pub fn write(&self, item: T) -> Result<()> {
        self.write_reclaim(item).map_err(|(e, _)| e)
    }

    /// Writes a single item, blocking if configured and full. On failure,
    /// returns the item alongside the error instead of dropping it.
    pub fn write_reclaim(&self, item: T) -> std::result::Result<(), (PoolError, T)> {
        if item.is_sentinel() {
            return Err((PoolError::InvalidObject, item));
        }
        let mut item = item;
        loop {
            {
                let mut state = self.state.lock().unwrap();
                if state.closed {
                    return Err((PoolError::Eof, item));
                }
                if !state.is_full {
                    self.push_locked(&mut state, item);
                    drop(state);
                    if self.blocked_readers.load(Ordering::Acquire) > 0 {
                        self.data_available.notify_all();
                    }
                    return Ok(());
                }
            }
            if !self.blocking.load(Ordering::Acquire) {
                return Err((PoolError::Full, item));
            }
            match self.block_for_space() {
                BlockOutcome::Ready => continue,
                BlockOutcome::TimedOut => return Err((PoolError::DeadlineExceeded, item)),
                BlockOutcome::Closed => return Err((PoolError::Eof, item)),
            }
        }
    }

    /// Wakes any readers currently blocked waiting for data without
    /// producing an item itself — used by the pool facade after placing an
    /// item directly into L1, so a blocked L2 reader's pre-read hook gets a
    /// chance to drain it.
    pub fn nudge_readers(&self) {
        if self.blocked_readers.load(Ordering::Acquire) > 0 {
            self.data_available.notify_all();
        }
    }

    /// Writes as much of `items` as fits, stopping at the first failure.
    /// Never writes the sentinel value. Returns the number written and the
    /// terminal condition (`Ok(())`, `Full`, `DeadlineExceeded`, or `Eof`).
    ///
    /// The failed item, and everything still left in `items`, stays in
    /// `items` on return — callers get a non-lossy VecDeque back and can
    /// retry, spill elsewhere, or hand the remainder to a cleaner, rather
    /// than having it silently vanish.
    pub fn write_many(&self, items: &mut VecDeque<T>) -> (usize, Result<()>) {
        let mut written = 0;
        while let Some(item) = items.pop_front() {
            match self.write_reclaim(item) {
                Ok(()) => written += 1,
                Err((e, returned)) => {
                    items.push_front(returned);
                    return (written, Err(e));
                }
            }
        }
        (written, Ok(()))
    }

    /// Reads a single item, blocking if configured and empty.
    pub fn get_one(&self) -> Result<T> {
        loop {
            {
                let mut state = self.state.lock().unwrap();
                if state.closed {
                    return Err(PoolError::Eof);
                }
                if !self.is_empty_locked(&state) {
                    let item = self.pop_locked(&mut state);
                    drop(state);
                    if self.blocked_writers.load(Ordering::Acquire) > 0 {
                        self.space_available.notify_all();
                    }
                    return Ok(item);
                }
            }
            if self.try_hook() {
                continue;
            }
            if !self.blocking.load(Ordering::Acquire) {
                return Err(PoolError::Empty);
            }
            match self.block_for_data() {
                BlockOutcome::Ready => continue,
                BlockOutcome::TimedOut => {
                    if self.try_hook() {
                        continue;
                    }
                    return Err(PoolError::DeadlineExceeded);
                }
                BlockOutcome::Closed => return Err(PoolError::Eof),
            }
        }
    }

    /// Reads up to `n` items without blocking (best-effort; may return fewer).
    pub fn get_n(&self, n: usize) -> Vec<T> {
        let mut state = self.state.lock().unwrap();
        let mut out = Vec::with_capacity(n.min(self.cap));
        while out.len() < n && !self.is_empty_locked(&state) && !state.closed {
            out.push(self.pop_locked(&mut state));
        }
        let notify = !out.is_empty() && self.blocked_writers.load(Ordering::Acquire) > 0;
        drop(state);
        if notify {
            self.space_available.notify_all();
        }
        out
    }

    /// Returns up to `n` items as two contiguous runs (second is empty unless
    /// the read wraps around) and advances the read cursor as if consumed.
    ///
    /// This is not a true zero-copy view — `T` need not be `Copy` — but it
    /// gives the capacity controller the same two-part contract the spec
    /// describes, implemented by draining into owned `Vec`s. Used only for
    /// migration under the reconfiguration lock, never for ordinary reads.
    pub fn get_n_view(&self, n: usize) -> (Vec<T>, Vec<T>) {
        let mut state = self.state.lock().unwrap();
        let take = n.min(self.len_locked(&state));
        let first_run = take.min(self.cap - state.r);
        let mut part1 = Vec::with_capacity(first_run);
        for _ in 0..first_run {
            part1.push(self.pop_locked(&mut state));
        }
        let second_run = take - first_run;
        let mut part2 = Vec::with_capacity(second_run);
        for _ in 0..second_run {
            part2.push(self.pop_locked(&mut state));
        }
        let notify = take > 0 && self.blocked_writers.load(Ordering::Acquire) > 0;
        drop(state);
        if notify {
            self.space_available.notify_all();
        }
        (part1, part2)
    }

    /// Equivalent to `get_n_view(self.length())`.
    pub fn get_all_view(&self) -> (Vec<T>, Vec<T>) {
        self.get_n_view(self.length())
    }

    /// Clears the buffer in place without closing it. Held items are dropped,
    /// not cleaned — callers that need cleanup must drain before resetting.
    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap();
        for slot in &mut state.buf {
            *slot = T::sentinel();
        }
        state.r = 0;
        state.w = 0;
        state.is_full = false;
    }

    /// Closes the buffer: sets the sticky EOF condition, drains all held
    /// items (returned to the caller — the ring buffer itself never invokes
    /// a cleaner), and wakes every blocked reader and writer. Idempotent.
    pub fn close(&self) -> Vec<T> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Vec::new();
        }
        state.closed = true;
        let mut drained = Vec::with_capacity(self.len_locked(&state));
        while !self.is_empty_locked(&state) {
            drained.push(self.pop_locked(&mut state));
        }
        drop(state);
        self.data_available.notify_all();
        self.space_available.notify_all();
        drained
    }

    // ------------------------------------------------------------------
    // Internal helpers
    // ------------------------------------------------------------------

    fn push_locked(&self, state: &mut RingState<T>, item: T) {
        let w = state.w;
        state.buf[w] = item;
        state.w = Self::wrap(w, 1, self.cap);
        if state.w == state.r {
            state.is_full = true;
        }
    }

    fn pop_locked(&self, state: &mut RingState<T>) -> T {
        let r = state.r;
        let item = std::mem::replace(&mut state.buf[r], T::sentinel());
        state.r = Self::wrap(r, 1, self.cap);
        state.is_full = false;
        item
    }

    #[inline]
    fn wrap(pos: usize, delta: usize, cap: usize) -> usize {
        (pos + delta) % cap
    }

    fn try_hook(&self) -> bool {
        let hook = self.pre_read_block_hook.lock().unwrap().clone();
        match hook {
            Some(h) => h(),
            None => false,
        }
    }

    /// A writer waits here for space. Returns once a slot has freed up, the
    /// buffer is closed, or `write_timeout` elapses.
    fn block_for_space(&self) -> BlockOutcome {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return BlockOutcome::Closed;
        }
        if !state.is_full {
            return BlockOutcome::Ready;
        }
        self.blocked_writers.fetch_add(1, Ordering::AcqRel);
        let timeout_ms = self.write_timeout_ms.load(Ordering::Acquire);
        let outcome = if timeout_ms > 0 {
            let (guard, wait_result) = self
                .space_available
                .wait_timeout(state, Duration::from_millis(timeout_ms))
                .unwrap();
            state = guard;
            if state.closed {
                BlockOutcome::Closed
            } else if !state.is_full {
                BlockOutcome::Ready
            } else if wait_result.timed_out() {
                BlockOutcome::TimedOut
            } else {
                BlockOutcome::Ready
            }
        } else {
            state = self.space_available.wait(state).unwrap();
            if state.closed {
                BlockOutcome::Closed
            } else {
                BlockOutcome::Ready
            }
        };
        self.blocked_writers.fetch_sub(1, Ordering::AcqRel);
        outcome
    }

    /// A reader waits here for data. Returns once an item is available, the
    /// buffer is closed, or `read_timeout` elapses.
    fn block_for_data(&self) -> BlockOutcome {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return BlockOutcome::Closed;
        }
        if !self.is_empty_locked(&state) {
            return BlockOutcome::Ready;
        }
        self.blocked_readers.fetch_add(1, Ordering::AcqRel);
        let timeout_ms = self.read_timeout_ms.load(Ordering::Acquire);
        let outcome = if timeout_ms > 0 {
            let (guard, wait_result) = self
                .data_available
                .wait_timeout(state, Duration::from_millis(timeout_ms))
                .unwrap();
            state = guard;
            if state.closed {
                BlockOutcome::Closed
            } else if !self.is_empty_locked(&state) {
                BlockOutcome::Ready
            } else if wait_result.timed_out() {
                BlockOutcome::TimedOut
            } else {
                BlockOutcome::Ready
            }
        } else {
            state = self.data_available.wait(state).unwrap();
            if state.closed {
                BlockOutcome::Closed
            } else {
                BlockOutcome::Ready
            }
        };
        self.blocked_readers.fetch_sub(1, Ordering::AcqRel);
        outcome
    }
}

/// Peek operations require `T: Clone` since they must hand back a copy
/// without consuming the original slot.
impl<T: Poolable + Clone> RingBuffer<T> {
    /// Reads the next item without consuming it.
    pub fn peek_one(&self) -> Option<T> {
        let state = self.state.lock().unwrap();
        if self.is_empty_locked(&state) {
            None
        } else {
            Some(state.buf[state.r].clone())
        }
    }

    /// Reads up to `n` items without consuming them, in FIFO order.
    pub fn peek_n(&self, n: usize) -> Vec<T> {
        let state = self.state.lock().unwrap();
        let take = n.min(self.len_locked(&state));
        let mut out = Vec::with_capacity(take);
        let mut pos = state.r;
        for _ in 0..take {
            out.push(state.buf[pos].clone());
            pos = Self::wrap(pos, 1, self.cap);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc as StdArc;
    use std::thread;

    fn item(n: u32) -> Option<Box<u32>> {
        Some(Box::new(n))
    }

    #[test]
    fn basic_write_read() {
        let ring: RingBuffer<Option<Box<u32>>> = RingBuffer::new(4);
        ring.write(item(1)).unwrap();
        ring.write(item(2)).unwrap();
        assert_eq!(ring.length(), 2);
        assert_eq!(*ring.get_one().unwrap().unwrap(), 1);
        assert_eq!(*ring.get_one().unwrap().unwrap(), 2);
        assert!(ring.is_empty());
    }

    #[test]
    fn rejects_sentinel_write() {
        let ring: RingBuffer<Option<Box<u32>>> = RingBuffer::new(2);
        assert_eq!(ring.write(None), Err(PoolError::InvalidObject));
    }

    #[test]
    fn non_blocking_full_and_empty() {
        let ring: RingBuffer<Option<Box<u32>>> = RingBuffer::new(2);
        ring.write(item(1)).unwrap();
        ring.write(item(2)).unwrap();
        assert_eq!(ring.write(item(3)), Err(PoolError::Full));
        ring.get_one().unwrap();
        ring.get_one().unwrap();
        assert_eq!(ring.get_one(), Err(PoolError::Empty));
    }

    #[test]
    fn wraparound() {
        let ring: RingBuffer<Option<Box<u32>>> = RingBuffer::new(3);
        ring.write(item(1)).unwrap();
        ring.write(item(2)).unwrap();
        ring.get_one().unwrap();
        ring.write(item(3)).unwrap();
        ring.write(item(4)).unwrap();
        assert_eq!(ring.length(), 3);
        assert_eq!(*ring.get_one().unwrap().unwrap(), 2);
        assert_eq!(*ring.get_one().unwrap().unwrap(), 3);
        assert_eq!(*ring.get_one().unwrap().unwrap(), 4);
    }

    #[test]
    fn close_drains_and_sticks() {
        let ring: RingBuffer<Option<Box<u32>>> = RingBuffer::new(2);
        ring.write(item(1)).unwrap();
        let drained = ring.close();
        assert_eq!(drained.len(), 1);
        assert_eq!(ring.get_one(), Err(PoolError::Eof));
        assert_eq!(ring.write(item(2)), Err(PoolError::Eof));
        // idempotent
        assert!(ring.close().is_empty());
    }

    #[test]
    fn blocking_get_wakes_on_put() {
        let ring = StdArc::new(RingBuffer::<Option<Box<u32>>>::new(2).with_blocking(true));
        let r2 = StdArc::clone(&ring);
        let handle = thread::spawn(move || r2.get_one().unwrap());
        thread::sleep(Duration::from_millis(50));
        ring.write(item(7)).unwrap();
        let got = handle.join().unwrap();
        assert_eq!(*got.unwrap(), 7);
    }

    #[test]
    fn blocking_write_wakes_on_get() {
        let ring = StdArc::new(RingBuffer::<Option<Box<u32>>>::new(1).with_blocking(true));
        ring.write(item(1)).unwrap();
        let r2 = StdArc::clone(&ring);
        let handle = thread::spawn(move || r2.write(item(2)));
        thread::sleep(Duration::from_millis(50));
        assert_eq!(ring.blocked_writers(), 1);
        ring.get_one().unwrap();
        handle.join().unwrap().unwrap();
        assert_eq!(*ring.get_one().unwrap().unwrap(), 2);
    }

    #[test]
    fn read_timeout_elapses() {
        let ring = RingBuffer::<Option<Box<u32>>>::new(1)
            .with_blocking(true)
            .with_read_timeout(Duration::from_millis(30));
        assert_eq!(ring.get_one(), Err(PoolError::DeadlineExceeded));
    }

    #[test]
    fn pre_read_block_hook_avoids_suspension() {
        let hook_fired = StdArc::new(AtomicBool::new(false));
        let fired = StdArc::clone(&hook_fired);
        let ring = RingBuffer::<Option<Box<u32>>>::new(1)
            .with_blocking(true)
            .with_read_timeout(Duration::from_millis(200))
            .with_pre_read_block_hook(move || {
                fired.store(true, Ordering::SeqCst);
                false
            });
        assert_eq!(ring.get_one(), Err(PoolError::DeadlineExceeded));
        assert!(hook_fired.load(Ordering::SeqCst));
    }

    #[test]
    fn get_n_view_two_parts_on_wrap() {
        let ring: RingBuffer<Option<Box<u32>>> = RingBuffer::new(4);
        for i in 1..=4u32 {
            ring.write(item(i)).unwrap();
        }
        ring.get_one().unwrap();
        ring.get_one().unwrap();
        ring.write(item(5)).unwrap();
        ring.write(item(6)).unwrap();
        // r=2, w=2(wrapped, full) -> view should return two runs
        let (p1, p2) = ring.get_all_view();
        let all: Vec<u32> = p1.into_iter().chain(p2).map(|b| *b.unwrap()).collect();
        assert_eq!(all, vec![3, 4, 5, 6]);
        assert!(ring.is_empty());
    }

    #[test]
    fn peek_does_not_consume() {
        let ring: RingBuffer<Option<Box<u32>>> = RingBuffer::new(4);
        ring.write(item(1)).unwrap();
        ring.write(item(2)).unwrap();
        assert_eq!(*ring.peek_one().unwrap().unwrap(), 1);
        assert_eq!(ring.length(), 2);
        let peeked = ring.peek_n(2);
        assert_eq!(peeked.len(), 2);
        assert_eq!(ring.length(), 2);
    }
}
