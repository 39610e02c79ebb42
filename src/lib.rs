// src/lib.rs
//! # surgepool
//!
//! A generic, adaptive, thread-safe object pool for pointer-like resources.
//!
//! The pool amortizes allocation cost under bursty concurrent demand by
//! recycling objects between producers that [`Pool::put`] and consumers
//! that [`Pool::get`], while keeping memory footprint responsive to actual
//! load through automatic growth and shrink.
//!
//! Two tiers back every pool: a lock-free bounded queue (`L1`, the fast
//! path) in front of a blocking bounded ring buffer (`L2`, the slow path).
//! A capacity controller grows and shrinks both tiers from workload
//! statistics; a single-flight refill coordinator moves objects from `L2`
//! into `L1` without letting concurrent misses stampede the slow path.
//!
//! ```
//! use surgepool::{Pool, PoolConfig};
//!
//! let pool: Pool<Option<Box<u64>>> = Pool::new(
//!     PoolConfig::new(4, 16),
//!     || Ok(Some(Box::new(0u64))),
//!     |mut obj| { if let Some(v) = obj.as_deref_mut() { *v = 0; } obj },
//! ).unwrap();
//!
//! let obj = pool.get().unwrap();
//! pool.put(obj).unwrap();
//! pool.close().unwrap();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod capacity;
pub mod config;
pub mod error;
pub mod fast;
pub mod handle;
pub mod pool;
mod refill;
pub mod ring;
pub mod stats;

pub use config::{GrowthParams, PoolConfig, ShrinkAggressiveness, ShrinkParams};
pub use error::{PoolError, Result};
pub use handle::Poolable;
pub use pool::Pool;
pub use stats::PoolStats;

/// Commonly used imports.
pub mod prelude {
    pub use crate::config::{GrowthParams, PoolConfig, ShrinkAggressiveness, ShrinkParams};
    pub use crate::error::{PoolError, Result};
    pub use crate::handle::Poolable;
    pub use crate::pool::Pool;
    pub use crate::stats::PoolStats;
}

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_allocator() -> (impl Fn() -> Result<Option<Box<u64>>>, Arc<AtomicUsize>) {
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

    #[test]
    fn smoke_get_put_close() {
        let (allocator, _count) = counting_allocator();
        let pool: Pool<Option<Box<u64>>> =
            Pool::new(PoolConfig::new(8, 32), allocator, reset_cleaner).unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let obj = pool.get().unwrap();
            assert!(obj.is_some());
            handles.push(obj);
        }
        for h in handles {
            pool.put(h).unwrap();
        }

        let one_more = pool.get().unwrap();
        assert!(one_more.is_some());
        pool.put(one_more).unwrap();

        pool.close().unwrap();
    }

    #[test]
    fn closed_pool_get_returns_sentinel() {
        let (allocator, _count) = counting_allocator();
        let pool: Pool<Option<Box<u64>>> =
            Pool::new(PoolConfig::new(2, 8), allocator, reset_cleaner).unwrap();
        pool.close().unwrap();
        assert!(pool.get().unwrap().is_none());
        assert_eq!(pool.put(Some(Box::new(1))), Err(PoolError::Eof));
    }

    #[test]
    fn invalid_config_rejected() {
        let (allocator, _count) = counting_allocator();
        let bad = PoolConfig::new(10, 5); // hard_limit < initial_capacity
        let result = Pool::new(bad, allocator, reset_cleaner);
        assert!(matches!(result, Err(PoolError::InvalidConfig(_))));
    }

    #[test]
    fn snapshot_reflects_activity() {
        let (allocator, _count) = counting_allocator();
        let pool: Pool<Option<Box<u64>>> =
            Pool::new(PoolConfig::new(4, 16), allocator, reset_cleaner).unwrap();
        let obj = pool.get().unwrap();
        let stats = pool.snapshot();
        assert_eq!(stats.objects_in_use, 1);
        assert_eq!(stats.total_gets, 1);
        pool.put(obj).unwrap();
        pool.close().unwrap();
    }
}
