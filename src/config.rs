// src/config.rs
//! Configuration for the adaptive pool.

use crate::error::{PoolError, Result};
use std::time::Duration;

/// Parameters governing L2 (and, derived from it, L1) growth.
///
/// See the growth formula in the capacity controller: below
/// `initial_L2 * threshold_factor` growth is "big" (exponential-ish),
/// above it growth is "controlled" (linear-ish).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrowthParams {
    /// Fraction of `initial_capacity` below which growth uses `big_growth_factor`.
    pub threshold_factor: f64,
    /// Growth factor applied to `initial_capacity` while under threshold.
    pub big_growth_factor: f64,
    /// Growth factor applied to `initial_capacity` once past threshold.
    pub controlled_growth_factor: f64,
    /// Number of L2 growth events between L1 resizes.
    pub l1_growth_trigger: u64,
}

impl Default for GrowthParams {
    fn default() -> Self {
        Self {
            threshold_factor: 2.0,
            big_growth_factor: 0.5,
            controlled_growth_factor: 1.0,
            l1_growth_trigger: 3,
        }
    }
}

/// Parameters governing L2 (and, derived from it, L1) shrink.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShrinkParams {
    /// How often the background shrink task wakes up to evaluate utilization.
    pub check_interval: Duration,
    /// Minimum time between two shrink events.
    pub cooldown: Duration,
    /// Utilization (percent) at or below which a round counts as underutilized.
    pub min_utilization_before_shrink: u8,
    /// Percentage to cut L2 capacity by on a shrink event.
    pub shrink_percent: u8,
    /// Consecutive underutilized rounds required before shrinking.
    pub stable_underutilization_rounds: u32,
    /// After this many shrinks in a row, the background task parks until a `get` wakes it.
    pub max_consecutive_shrinks: u32,
    /// Number of L2 shrink events between L1 shrinks.
    pub l1_shrink_trigger: u64,
    /// Percentage to cut L1 capacity by on an L1 shrink event.
    pub l1_shrink_percent: u8,
}

/// Named shrink-aggressiveness presets, selecting a row of [`ShrinkParams`].
///
/// Mirrors the teacher crate's `PoolConfig::small()/large()/network()`
/// preset pattern, reinterpreted as a single-axis "how eager is this pool
/// to give memory back" dial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShrinkAggressiveness {
    /// Shrinks rarely and by small amounts; favors steady memory over reclaiming it.
    Conservative = 1,
    /// The default: moderate cooldown, moderate cuts.
    #[default]
    Balanced = 2,
    /// Shrinks more readily.
    Aggressive = 3,
    /// Shrinks readily and by larger amounts.
    VeryAggressive = 4,
    /// Reclaims memory as fast as the stability window allows.
    Extreme = 5,
}

impl ShrinkAggressiveness {
    /// Returns the [`ShrinkParams`] row for this level.
    pub fn params(self) -> ShrinkParams {
        match self {
            ShrinkAggressiveness::Conservative => ShrinkParams {
                check_interval: Duration::from_secs(60),
                cooldown: Duration::from_secs(120),
                min_utilization_before_shrink: 20,
                shrink_percent: 10,
                stable_underutilization_rounds: 5,
                max_consecutive_shrinks: 2,
                l1_shrink_trigger: 5,
                l1_shrink_percent: 10,
            },
            ShrinkAggressiveness::Balanced => ShrinkParams {
                check_interval: Duration::from_secs(30),
                cooldown: Duration::from_secs(60),
                min_utilization_before_shrink: 30,
                shrink_percent: 25,
                stable_underutilization_rounds: 3,
                max_consecutive_shrinks: 3,
                l1_shrink_trigger: 3,
                l1_shrink_percent: 25,
            },
            ShrinkAggressiveness::Aggressive => ShrinkParams {
                check_interval: Duration::from_secs(15),
                cooldown: Duration::from_secs(30),
                min_utilization_before_shrink: 40,
                shrink_percent: 35,
                stable_underutilization_rounds: 2,
                max_consecutive_shrinks: 4,
                l1_shrink_trigger: 2,
                l1_shrink_percent: 35,
            },
            ShrinkAggressiveness::VeryAggressive => ShrinkParams {
                check_interval: Duration::from_secs(10),
                cooldown: Duration::from_secs(15),
                min_utilization_before_shrink: 50,
                shrink_percent: 45,
                stable_underutilization_rounds: 2,
                max_consecutive_shrinks: 5,
                l1_shrink_trigger: 2,
                l1_shrink_percent: 45,
            },
            ShrinkAggressiveness::Extreme => ShrinkParams {
                check_interval: Duration::from_millis(5000),
                cooldown: Duration::from_secs(5),
                min_utilization_before_shrink: 60,
                shrink_percent: 50,
                stable_underutilization_rounds: 1,
                max_consecutive_shrinks: 8,
                l1_shrink_trigger: 1,
                l1_shrink_percent: 50,
            },
        }
    }
}

/// Configuration for pool behavior.
///
/// Construct via [`PoolConfig::new`] (or [`PoolConfig::default`]) and
/// customize with the builder methods, then validate with
/// [`PoolConfig::validate`] — [`crate::Pool::new`] does this for you and
/// returns [`PoolError::InvalidConfig`] on failure.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Starting L2 capacity; also the default L1 capacity if `l1_initial_capacity` is unset.
    pub initial_capacity: usize,
    /// Absolute ceiling on L2 capacity.
    pub hard_limit: usize,
    /// L2 capacity never shrinks below this floor.
    pub min_capacity: usize,
    /// Starting L1 capacity.
    pub l1_initial_capacity: usize,
    /// L1 capacity never shrinks below this floor.
    pub l1_min_capacity: usize,
    /// Whether L1 is allowed to grow/shrink at all.
    pub channel_growth_enabled: bool,
    /// Growth parameters, shared by both tiers.
    pub growth: GrowthParams,
    /// Shrink parameters, shared by both tiers.
    pub shrink: ShrinkParams,
    /// Target L1 occupancy (percent of L1 capacity) on refill/init fill.
    pub fill_aggressiveness: u8,
    /// L1 occupancy percent below which a refill is triggered.
    pub refill_percent: u8,
    /// Percent of `initial_capacity` to pre-allocate at construction.
    pub alloc_percent: u8,
    /// Batch size for on-demand allocation during refill.
    pub alloc_amount: usize,
    /// Number of times the ring buffer's pre-read-block hook may try to drain L1 into L2.
    pub pre_read_block_hook_attempts: usize,
    /// Whether the L2 ring buffer blocks on empty/full instead of returning immediately.
    pub blocking: bool,
    /// Timeout for a blocked L2 read (reader waiting for data).
    pub read_timeout: Option<Duration>,
    /// Timeout for a blocked L2 write (writer waiting for space).
    pub write_timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        let initial_capacity = 64;
        Self {
            initial_capacity,
            hard_limit: 10_000,
            min_capacity: 32,
            l1_initial_capacity: initial_capacity,
            l1_min_capacity: initial_capacity,
            channel_growth_enabled: true,
            growth: GrowthParams::default(),
            shrink: ShrinkAggressiveness::Balanced.params(),
            fill_aggressiveness: 80,
            refill_percent: 20,
            alloc_percent: 50,
            alloc_amount: 8,
            pre_read_block_hook_attempts: 3,
            blocking: false,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

impl PoolConfig {
    /// Creates a config with `initial_capacity` and `hard_limit`, defaults otherwise.
    pub fn new(initial_capacity: usize, hard_limit: usize) -> Self {
        Self {
            initial_capacity,
            hard_limit,
            l1_initial_capacity: initial_capacity,
            l1_min_capacity: initial_capacity,
            ..Self::default()
        }
    }

    /// Sets the hard limit (absolute L2 ceiling).
    pub fn with_hard_limit(mut self, hard_limit: usize) -> Self {
        self.hard_limit = hard_limit;
        self
    }

    /// Sets the L2 capacity floor.
    pub fn with_min_capacity(mut self, min_capacity: usize) -> Self {
        self.min_capacity = min_capacity;
        self
    }

    /// Sets L1 initial and minimum capacity together.
    pub fn with_l1_capacity(mut self, initial: usize, min: usize) -> Self {
        self.l1_initial_capacity = initial;
        self.l1_min_capacity = min;
        self
    }

    /// Enables or disables blocking L2 semantics.
    pub fn with_blocking(mut self, blocking: bool) -> Self {
        self.blocking = blocking;
        self
    }

    /// Sets the blocked-reader (`get`) timeout.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Sets the blocked-writer (`put`) timeout.
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }

    /// Selects a named shrink-aggressiveness preset.
    pub fn with_shrink_aggressiveness(mut self, level: ShrinkAggressiveness) -> Self {
        self.shrink = level.params();
        self
    }

    /// Overrides individual growth parameters.
    pub fn with_growth(mut self, growth: GrowthParams) -> Self {
        self.growth = growth;
        self
    }

    /// Sets preallocation percent/batch-allocation amount.
    pub fn with_alloc(mut self, alloc_percent: u8, alloc_amount: usize) -> Self {
        self.alloc_percent = alloc_percent;
        self.alloc_amount = alloc_amount;
        self
    }

    /// Sets the L1 target-fill and refill-trigger percentages.
    pub fn with_fill_aggressiveness(mut self, fill_aggressiveness: u8, refill_percent: u8) -> Self {
        self.fill_aggressiveness = fill_aggressiveness;
        self.refill_percent = refill_percent;
        self
    }

    /// Sets how many times the pre-read-block hook may try to drain L1 into L2.
    pub fn with_pre_read_block_hook_attempts(mut self, attempts: usize) -> Self {
        self.pre_read_block_hook_attempts = attempts;
        self
    }

    /// Validates the configuration, returning [`PoolError::InvalidConfig`] on failure.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(PoolError::InvalidConfig(msg.to_string()));

        if self.initial_capacity == 0 {
            return fail("initial_capacity must be > 0");
        }
        if self.hard_limit < self.initial_capacity {
            return fail("hard_limit must be >= initial_capacity");
        }
        if self.hard_limit < self.min_capacity {
            return fail("hard_limit must be >= min_capacity");
        }
        if self.min_capacity == 0 {
            return fail("min_capacity must be > 0");
        }
        if self.l1_initial_capacity == 0 {
            return fail("l1_initial_capacity must be > 0");
        }
        if self.l1_min_capacity == 0 {
            return fail("l1_min_capacity must be > 0");
        }
        if self.growth.threshold_factor <= 0.0 {
            return fail("growth.threshold_factor must be > 0");
        }
        if self.growth.big_growth_factor <= 0.0 && self.growth.controlled_growth_factor <= 0.0 {
            return fail("at least one growth factor must be > 0");
        }
        for (name, pct) in [
            ("fill_aggressiveness", self.fill_aggressiveness),
            ("refill_percent", self.refill_percent),
            ("alloc_percent", self.alloc_percent),
            ("shrink.min_utilization_before_shrink", self.shrink.min_utilization_before_shrink),
            ("shrink.shrink_percent", self.shrink.shrink_percent),
            ("shrink.l1_shrink_percent", self.shrink.l1_shrink_percent),
        ] {
            if pct > 100 {
                return fail(&format!("{name} must be a percentage in 0..=100"));
            }
        }
        if self.shrink.shrink_percent == 0 {
            return fail("shrink.shrink_percent must be > 0");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(PoolConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_hard_limit_below_initial() {
        let cfg = PoolConfig::new(100, 10);
        assert!(matches!(cfg.validate(), Err(PoolError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_zero_initial_capacity() {
        let cfg = PoolConfig::new(0, 10);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_bad_percent() {
        let mut cfg = PoolConfig::default();
        cfg.fill_aggressiveness = 150;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn builder_chains() {
        let cfg = PoolConfig::new(10, 100)
            .with_min_capacity(5)
            .with_blocking(true)
            .with_shrink_aggressiveness(ShrinkAggressiveness::Aggressive);
        assert_eq!(cfg.min_capacity, 5);
        assert!(cfg.blocking);
        assert_eq!(cfg.shrink.shrink_percent, 35);
        assert!(cfg.validate().is_ok());
    }
}
