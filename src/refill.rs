// src/refill.rs
//! The refill coordinator (C4): single-flight movement of objects from L2
//! into L1, shielding the rest of the pool from a thundering herd of
//! simultaneous L1 misses.

use crate::error::{PoolError, Result};
use crate::handle::Poolable;
use crate::pool::state::PoolInner;
use crate::ring::RingBuffer;
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::warn;

const SPILL_WRITE_RETRIES: u32 = 5;
const SPILL_WRITE_BACKOFF: Duration = Duration::from_millis(10);

/// RAII guard standing in for the spec's `defer { broadcast(); release() }`:
/// whichever thread wins the single-flight race holds this until it drops,
/// which always runs — including on an early return or a panic inside
/// `handle_refill_scenarios`.
struct RefillGuard<'a, T: Poolable> {
    inner: &'a PoolInner<T>,
}

impl<T: Poolable> Drop for RefillGuard<'_, T> {
    fn drop(&mut self) {
        *self.inner.refill.busy.lock().unwrap() = false;
        self.inner.refill.cv.notify_all();
    }
}

impl<T: Poolable> PoolInner<T> {
    /// Attempts to satisfy an L1 miss. At most one caller at a time performs
    /// the refill scenarios; the rest wait on the refill condvar and retry
    /// L1 themselves once the winner finishes.
    pub(crate) fn try_refill_and_get_l1(&self) -> Result<Option<T>> {
        let mut busy = self.refill.busy.lock().unwrap();
        if !*busy {
            *busy = true;
            drop(busy);
            let _guard = RefillGuard { inner: self };
            return self.handle_refill_scenarios();
        }

        // Lost the race: wait for the winner to finish, then retry L1 myself.
        while *busy {
            busy = self.refill.cv.wait(busy).unwrap();
        }
        drop(busy);
        Ok(self.l1.load().try_get())
    }

    fn handle_refill_scenarios(&self) -> Result<Option<T>> {
        // 1. Well-stocked shortcut.
        let l1 = self.l1.load();
        let occupancy_pct = if l1.capacity() == 0 {
            100
        } else {
            (l1.len() * 100) / l1.capacity()
        };
        if occupancy_pct > self.config.refill_percent as usize {
            return Ok(l1.try_get());
        }
        drop(l1);

        // 2. On-demand creation, if there's still room below the ceiling.
        if let Some(item) = self.try_on_demand_create()? {
            return Ok(Some(item));
        }

        // 3. Refill from L2.
        self.refill_from_l2()?;
        Ok(self.l1.load().try_get())
    }

    fn try_on_demand_create(&self) -> Result<Option<T>> {
        let cfg = self.reconfig.write().unwrap();
        let objects_tracked = self.stats.objects_in_use() + cfg.l2.length() + self.l1.load().len();
        let space_available = cfg.l2.capacity().saturating_sub(objects_tracked);
        if space_available == 0 {
            return Ok(None);
        }

        let l1_snapshot = self.l1.load_full();
        let fill_target = (l1_snapshot.capacity() * self.config.fill_aggressiveness as usize / 100)
            .saturating_sub(l1_snapshot.len());
        let to_create = self.config.alloc_amount.min(space_available).min(fill_target.max(1));
        let l2 = Arc::clone(&cfg.l2);
        drop(cfg);

        // Reload L1 on every iteration rather than reusing one snapshot: the
        // capacity controller may swap the pointer mid-loop, and a write
        // must land on whichever channel is current or fall back to L2 —
        // never vanish into a channel nobody can reach anymore.
        for _ in 0..to_create {
            let obj = (self.allocator)()?;
            if let Err(obj) = self.l1.load().try_put(obj) {
                let _ = l2.write(obj);
            }
        }
        Ok(self.l1.load().try_get())
    }

    fn refill_from_l2(&self) -> Result<()> {
        let cfg = self.reconfig.read().unwrap();
        let l2_len = cfg.l2.length();
        if l2_len == 0 {
            let growth_blocked = cfg.growth_blocked;
            drop(cfg);
            if !growth_blocked {
                match self.grow_l2() {
                    Ok(()) | Err(PoolError::GrowthBlocked) => {}
                    Err(e) => return Err(e),
                }
            }
            return Ok(());
        }

        let l1_snapshot = self.l1.load_full();
        let fill_target = (l1_snapshot.capacity() * self.config.fill_aggressiveness as usize / 100)
            .saturating_sub(l1_snapshot.len());
        if fill_target == 0 {
            return Ok(());
        }
        let take = fill_target.min(l2_len);
        let (p1, p2) = cfg.l2.get_n_view(take);
        let l2 = Arc::clone(&cfg.l2);
        drop(cfg);

        let mut spill: VecDeque<T> = VecDeque::new();
        for item in p1.into_iter().chain(p2) {
            if let Err(item) = self.l1.load().try_put(item) {
                spill.push_back(item);
            }
        }
        if !spill.is_empty() {
            self.write_back_spill(&l2, &mut spill);
        }
        Ok(())
    }

    /// Writes items pulled out of L2 back into it after an L1 refill that
    /// didn't fit them all. A concurrent `put` can fill L2 in the gap
    /// between the original read and this write-back, so a soft failure is
    /// retried with backoff rather than treated as fatal. If retries are
    /// exhausted with items still unwritten, they are handed to the cleaner
    /// and the loss is logged — they must not simply vanish uncounted.
    fn write_back_spill(&self, l2: &Arc<RingBuffer<T>>, spill: &mut VecDeque<T>) {
        let mut attempt = 0;
        loop {
            let (_written, res) = l2.write_many(spill);
            match res {
                Ok(()) => return,
                Err(e) if e.is_soft() && attempt < SPILL_WRITE_RETRIES => {
                    attempt += 1;
                    thread::sleep(SPILL_WRITE_BACKOFF);
                }
                Err(e) => {
                    let dropped = spill.len();
                    warn!(
                        error = %e,
                        dropped,
                        "refill spill-back exhausted retries; cleaning remaining items instead of dropping them"
                    );
                    for item in spill.drain(..) {
                        let _ = (self.cleaner)(item);
                    }
                    return;
                }
            }
        }
    }
}
