// src/capacity.rs
//! The capacity controller (C3): growth and shrink for both tiers, plus the
//! buffer/channel reallocation that backs them. Every mutating operation
//! here runs with the pool's reconfiguration lock held exclusively.

use crate::error::{PoolError, Result};
use crate::fast::FastChannel;
use crate::handle::Poolable;
use crate::pool::state::PoolInner;
use crate::ring::RingBuffer;
use std::collections::VecDeque;
use std::sync::Arc;

/// Applies the threshold/big/controlled growth formula shared by both tiers.
fn growth_target(current: usize, initial: usize, threshold_factor: f64, big: f64, controlled: f64) -> usize {
    let threshold = initial as f64 * threshold_factor;
    let delta = if (current as f64) < threshold {
        (initial as f64 * big).max(1.0)
    } else {
        initial as f64 * controlled
    };
    current + delta.round().max(1.0) as usize
}

impl<T: Poolable> PoolInner<T> {
    /// Grows L2, migrating existing items and topping up to the new capacity
    /// with fresh allocator objects. Then grows L1 if the growth-event
    /// trigger has been reached. Returns [`PoolError::GrowthBlocked`] without
    /// changing anything if the hard limit was already hit.
    pub(crate) fn grow_l2(&self) -> Result<()> {
        let mut cfg = self.reconfig.write().unwrap();
        if cfg.growth_blocked {
            return Err(PoolError::GrowthBlocked);
        }

        let current_l2 = cfg.l2.capacity();
        let gp = &self.config.growth;
        let mut new_l2 = growth_target(
            current_l2,
            self.config.initial_capacity,
            gp.threshold_factor,
            gp.big_growth_factor,
            gp.controlled_growth_factor,
        );

        let mut became_blocked = false;
        if new_l2 > self.config.hard_limit {
            new_l2 = self.config.hard_limit;
            became_blocked = true;
        }
        if new_l2 <= current_l2 {
            cfg.growth_blocked = became_blocked;
            return Ok(());
        }

        let new_ring = Arc::new(RingBuffer::new(new_l2));
        new_ring.copy_config(&cfg.l2);

        let (p1, p2) = cfg.l2.get_all_view();
        let mut items: VecDeque<T> = p1.into_iter().chain(p2).collect();
        let (_written, res) = new_ring.write_many(&mut items);
        res?;

        let remaining = new_l2 - current_l2;
        for _ in 0..remaining {
            match (self.allocator)() {
                Ok(obj) => {
                    if new_ring.write(obj).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    // Roll back: the old buffer is still empty and intact,
                    // so hand the already-migrated items back to it.
                    let (back1, back2) = new_ring.get_all_view();
                    let mut restore: VecDeque<T> = back1.into_iter().chain(back2).collect();
                    let _ = cfg.l2.write_many(&mut restore);
                    return Err(e);
                }
            }
        }

        let old = std::mem::replace(&mut cfg.l2, new_ring);
        old.close();
        cfg.growth_blocked = became_blocked;
        self.stats.note_growth(new_l2);
        // Demand just grew the pool, which is the opposite signal from the
        // one that drove the last run of shrinks — let the background task
        // reconsider instead of staying parked on a stale streak.
        self.stats.reset_consecutive_shrinks();
        drop(cfg);

        self.shrink_cv.notify_all();
        self.maybe_grow_l1()?;
        Ok(())
    }

    /// Grows L1 if `total_growth_events - last_L1_resize_at_growth` has
    /// reached `l1_growth_trigger`. No-op if channel growth is disabled.
    pub(crate) fn maybe_grow_l1(&self) -> Result<()> {
        if !self.config.channel_growth_enabled {
            return Ok(());
        }
        let growth_events = self.stats.total_growth_events();
        if growth_events.saturating_sub(self.stats.last_l1_resize_at_growth())
            < self.config.growth.l1_growth_trigger
        {
            return Ok(());
        }

        let current_l1 = self.stats.current_l1_cap();
        let gp = &self.config.growth;
        let new_l1 = growth_target(
            current_l1,
            self.config.l1_initial_capacity,
            gp.threshold_factor,
            gp.big_growth_factor,
            gp.controlled_growth_factor,
        )
        .max(current_l1 + 1);

        let new_channel = Arc::new(FastChannel::new(new_l1));
        let old_channel = self.l1.swap(Arc::clone(&new_channel));

        let l2 = Arc::clone(&self.reconfig.read().unwrap().l2);
        // `close()` marks the retired channel before draining it, so a `put`
        // that raced in with a pre-swap `Arc` fails cleanly against it
        // instead of enqueuing into a queue nobody will read again.
        for item in old_channel.close() {
            if let Err(spilled) = new_channel.try_put(item) {
                let _ = l2.write(spilled);
            }
        }

        self.stats.note_l1_resize(new_l1, growth_events);
        Ok(())
    }

    /// Shrinks L2 by `shrink_percent`, respecting the floor and in-flight
    /// object count. Returns `Ok(true)` if a shrink actually happened.
    pub(crate) fn shrink_l2(&self) -> Result<bool> {
        let mut cfg = self.reconfig.write().unwrap();
        let current_l2 = cfg.l2.capacity();
        let sp = &self.config.shrink;

        let mut new_l2 = current_l2 * (100usize.saturating_sub(sp.shrink_percent as usize)) / 100;
        let l1_len = self.l1.load().len();
        let l2_len = cfg.l2.length();
        if new_l2 == 0
            || current_l2 == self.config.min_capacity
            || new_l2 >= current_l2
            || (l1_len + l2_len) == 0
        {
            return Ok(false);
        }

        let objects_in_use = self.stats.objects_in_use();
        new_l2 = new_l2.max(self.config.min_capacity).max(objects_in_use);
        if new_l2 >= current_l2 {
            return Ok(false);
        }

        if new_l2 < self.config.hard_limit && cfg.growth_blocked {
            cfg.growth_blocked = false;
        }

        let new_ring = Arc::new(RingBuffer::new(new_l2));
        new_ring.copy_config(&cfg.l2);

        let move_n = new_l2.saturating_sub(objects_in_use).min(cfg.l2.length());
        let (p1, p2) = cfg.l2.get_n_view(move_n);
        let mut items: VecDeque<T> = p1.into_iter().chain(p2).collect();
        let (_written, _res) = new_ring.write_many(&mut items);

        let old = std::mem::replace(&mut cfg.l2, new_ring);
        let dropped = old.close();
        for item in dropped {
            let _ = (self.cleaner)(item);
        }

        self.stats.note_shrink(new_l2);
        drop(cfg);

        self.maybe_shrink_l1()?;
        Ok(true)
    }

    /// Shrinks L1 by `l1_shrink_percent` if the shrink-event trigger has
    /// been reached. Items that don't fit the smaller channel spill to L2
    /// rather than being dropped.
    pub(crate) fn maybe_shrink_l1(&self) -> Result<()> {
        if !self.config.channel_growth_enabled {
            return Ok(());
        }
        let shrink_events = self.stats.total_shrink_events();
        if shrink_events.saturating_sub(self.stats.last_l1_resize_at_shrink())
            < self.config.shrink.l1_shrink_trigger
        {
            return Ok(());
        }

        let current_l1 = self.stats.current_l1_cap();
        let sp = &self.config.shrink;
        let mut new_l1 =
            current_l1 * (100usize.saturating_sub(sp.l1_shrink_percent as usize)) / 100;
        new_l1 = new_l1.max(self.config.l1_min_capacity);
        if new_l1 >= current_l1 {
            return Ok(());
        }

        let objects_in_use = self.stats.objects_in_use();
        let move_budget = new_l1.saturating_sub(objects_in_use);
        if move_budget == 0 {
            return Ok(());
        }

        let new_channel = Arc::new(FastChannel::new(new_l1));
        // Swap the pointer *before* draining the old channel, not after: if
        // the drain ran first, the pointer would still reference the old
        // channel for the whole drain window, and a `put` that loaded that
        // old `Arc` could enqueue into it right after the drain observed it
        // empty, orphaning the object. Swapping first, then calling
        // `close()` (which marks the old channel retired before draining),
        // means any such write either lands before the swap — and gets
        // captured by the drain below — or fails cleanly against the
        // closed flag.
        let old_channel = self.l1.swap(Arc::clone(&new_channel));
        let l2 = Arc::clone(&self.reconfig.read().unwrap().l2);

        let mut moved = 0usize;
        for item in old_channel.close() {
            if moved < move_budget {
                match new_channel.try_put(item) {
                    Ok(()) => moved += 1,
                    Err(spilled) => {
                        let _ = l2.write(spilled);
                    }
                }
            } else {
                let _ = l2.write(item);
            }
        }

        self.stats.note_l1_shrink(new_l1, shrink_events);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn growth_target_uses_big_factor_below_threshold() {
        // initial=10, threshold_factor=2 -> threshold=20; current=10 < 20
        let t = growth_target(10, 10, 2.0, 0.5, 1.0);
        assert_eq!(t, 15); // 10 + max(1, 10*0.5)
    }

    #[test]
    fn growth_target_uses_controlled_factor_above_threshold() {
        let t = growth_target(25, 10, 2.0, 0.5, 1.0);
        assert_eq!(t, 35); // 25 + 10*1.0
    }

    #[test]
    fn growth_target_never_zero_delta() {
        let t = growth_target(4, 4, 2.0, 0.0, 0.0);
        assert!(t > 4);
    }
}
