// src/pool/state.rs
//! Shared pool state: the data the capacity controller, refill coordinator,
//! and facade all operate on.

use crate::config::PoolConfig;
use crate::error::Result;
use crate::fast::FastChannel;
use crate::handle::Poolable;
use crate::ring::RingBuffer;
use crate::stats::Stats;
use arc_swap::ArcSwap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::thread::JoinHandle;

/// Where the pool is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Under construction; not yet observable by callers.
    Initializing,
    /// Normal operation.
    Active,
    /// `close()` called; draining outstanding objects.
    Closing,
    /// Fully closed; all operations short-circuit.
    Closed,
}

/// Allocator: produces a fresh `T`. Called at construction, on growth, and
/// during on-demand refill creation.
pub type Allocator<T> = Box<dyn Fn() -> Result<T> + Send + Sync>;

/// Cleaner: resets a returned `T` to a reusable state. Must be total — any
/// panic is caught and the object is dropped instead of returned to the pool.
pub type Cleaner<T> = Box<dyn Fn(T) -> T + Send + Sync>;

/// The L2 ring buffer pointer plus the growth-blocked flag, both mutated
/// together under `M`'s write lock.
pub(crate) struct Reconfig<T: Poolable> {
    pub(crate) l2: Arc<RingBuffer<T>>,
    pub(crate) growth_blocked: bool,
}

/// State owned by the single-flight refill coordinator (C4).
pub(crate) struct RefillGate {
    pub(crate) busy: Mutex<bool>,
    pub(crate) cv: Condvar,
}

impl RefillGate {
    pub(crate) fn new() -> Self {
        Self {
            busy: Mutex::new(false),
            cv: Condvar::new(),
        }
    }
}

/// Rolling state for the background shrink task's underutilization window.
pub(crate) struct ShrinkWindow {
    pub(crate) underutil_count: u32,
}

/// All state shared between the capacity controller, refill coordinator,
/// and pool facade. Always accessed through `Arc<PoolInner<T>>`.
pub(crate) struct PoolInner<T: Poolable> {
    pub(crate) config: PoolConfig,
    pub(crate) allocator: Allocator<T>,
    pub(crate) cleaner: Cleaner<T>,
    /// `M`: the coarse reconfiguration lock guarding L2's pointer and the
    /// growth-blocked flag.
    pub(crate) reconfig: RwLock<Reconfig<T>>,
    /// L1's pointer, swapped wholesale by the capacity controller.
    pub(crate) l1: ArcSwap<FastChannel<T>>,
    pub(crate) stats: Stats,
    pub(crate) refill: RefillGate,
    /// Signaled whenever capacity changes in a way that might unpark a
    /// shrink task parked at `max_consecutive_shrinks`.
    pub(crate) shrink_cv: Condvar,
    pub(crate) shrink_window: Mutex<ShrinkWindow>,
    pub(crate) lifecycle: Mutex<Lifecycle>,
    pub(crate) closed: AtomicBool,
    pub(crate) shrink_thread: Mutex<Option<JoinHandle<()>>>,
}
