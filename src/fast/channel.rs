// src/fast/channel.rs
//! A bounded, lock-free MPMC queue wrapping [`crossbeam::queue::ArrayQueue`].
//!
//! L1 never blocks: a miss here always falls through to L2 (the ring
//! buffer). This is deliberately not a ring buffer of its own — `ArrayQueue`
//! gives wait-free `push`/`pop` under contention, which is the point of
//! having a fast path at all.

use crate::handle::Poolable;
use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicBool, Ordering};

/// The non-blocking fast-path queue sitting in front of the ring buffer.
///
/// The capacity controller replaces this channel wholesale on grow/shrink,
/// swapping the pointer held in the pool's `ArcSwap`. A caller that already
/// loaded the pre-swap `Arc<FastChannel>` may still be holding it when the
/// swap happens — `closed` lets a write against that retired instance fail
/// cleanly (returning the item back to the caller, which falls through to
/// L2) instead of silently landing in a queue nobody will ever drain again.
pub struct FastChannel<T: Poolable> {
    queue: ArrayQueue<T>,
    closed: AtomicBool,
}

impl<T: Poolable> FastChannel<T> {
    /// Creates a new fast channel with the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity.max(1)),
            closed: AtomicBool::new(false),
        }
    }

    /// Attempts to pop an item without blocking. Returns `None` on a miss.
    pub fn try_get(&self) -> Option<T> {
        self.queue.pop()
    }

    /// Attempts to push an item without blocking. Returns the item back on
    /// failure — either the queue is full, or this instance has been
    /// retired by [`FastChannel::close`] — so the caller can fall through
    /// to L2 either way.
    pub fn try_put(&self, item: T) -> Result<(), T> {
        if self.closed.load(Ordering::Acquire) {
            return Err(item);
        }
        self.queue.push(item)
    }

    /// Number of items currently queued.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// `true` if no items are queued.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Fixed capacity of the channel.
    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// `true` if the channel is at capacity.
    pub fn is_full(&self) -> bool {
        self.queue.is_full()
    }

    /// Retires this channel and drains every item it held, for the caller to
    /// clean up or redistribute. The channel itself never invokes a cleaner.
    ///
    /// Marks the channel closed *before* draining, so any `try_put` that
    /// raced in on a stale `Arc` — loaded before this channel was replaced —
    /// observes the closed flag and fails cleanly rather than enqueuing into
    /// a queue this call is about to declare empty and abandon. Idempotent.
    pub fn close(&self) -> Vec<T> {
        self.closed.store(true, Ordering::Release);
        let mut drained = Vec::with_capacity(self.queue.len());
        while let Some(item) = self.queue.pop() {
            drained.push(item);
        }
        drained
    }
}
