//! Credit Ledger
//!
//! Turns producer work into attempt opportunities for consumers.
//!
//! # Accrual (producers)
//!
//! A producer on tier `t` earns one crossing for every
//! `base_threshold × (1 + scaling)^t` units of work. Work below one crossing
//! is carried on the item to the next accrual. Each crossing adds
//! `consumer_count / max(1, producer_count)` credits to the pool, so the
//! consumer population as a whole receives as many attempts as the producer
//! population earns, whatever the ratio between them.
//!
//! The ratio is cached and only recomputed when an epoch completes (or on
//! resync / restore); within an epoch every producer is credited at the same
//! rate.
//!
//! # Distribution (consumers)
//!
//! Each visited consumer takes `pool / consumer_count` credits, computed
//! live. The integer part is granted outright; the fractional part becomes
//! one extra attempt with exactly that probability, so the expected number
//! of attempts equals the credits taken. The credits are removed from the
//! pool immediately. The pool is never reset: residue carries across epochs.
//!
//! # Critical Invariants
//!
//! - `pool >= 0` at all times

use crate::models::{TierChain, TrackedItem};
use crate::rng::RngManager;

/// Result of one producer accrual
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Accrual {
    /// Whole thresholds crossed by this delta (plus carried work)
    pub crossings: u32,
    /// Credits added to the pool
    pub pool_added: f64,
}

/// Owner of the shared credit pool
#[derive(Debug, Clone)]
pub struct CreditLedger {
    base_threshold: f64,
    pool: f64,
    /// consumers per producer, cached per epoch
    ratio: f64,
}

impl CreditLedger {
    /// Create an empty ledger
    ///
    /// # Panics
    /// Panics if `base_threshold` is not positive
    pub fn new(base_threshold: f64) -> Self {
        assert!(base_threshold > 0.0, "base_threshold must be positive");
        Self {
            base_threshold,
            pool: 0.0,
            ratio: 0.0,
        }
    }

    /// Work needed for one crossing on `tier`
    ///
    /// # Example
    ///
    /// ```
    /// use tier_ladder_engine::credit::CreditLedger;
    /// use tier_ladder_engine::models::{TierCatalog, TierChain};
    ///
    /// let chain = TierChain::build(&TierCatalog::linear(&["a", "b", "c"]), 0.5).unwrap();
    /// let ledger = CreditLedger::new(3.0);
    /// assert_eq!(ledger.threshold_for(&chain, 0), 3.0);
    /// assert_eq!(ledger.threshold_for(&chain, 1), 4.5);
    /// ```
    pub fn threshold_for(&self, chain: &TierChain, tier: usize) -> f64 {
        let multiplier = chain.tier(tier).map_or(1.0, |t| t.cost_multiplier);
        self.base_threshold * multiplier
    }

    /// Credit a producer's work delta
    ///
    /// Negative or non-finite deltas are ignored. The item's carried work is
    /// updated in place.
    pub fn accrue(&mut self, item: &mut TrackedItem, work_delta: f64, chain: &TierChain) -> Accrual {
        let delta = if work_delta.is_finite() && work_delta > 0.0 {
            work_delta
        } else {
            0.0
        };
        let threshold = self.threshold_for(chain, item.tier());
        let total = item.work_carry() + delta;
        let crossings = (total / threshold).floor();
        item.set_work_carry((total - crossings * threshold).max(0.0));

        let crossings = crossings as u32;
        let pool_added = f64::from(crossings) * self.ratio;
        self.pool += pool_added;
        Accrual {
            crossings,
            pool_added,
        }
    }

    /// Hand one consumer its share of the pool, as whole attempts
    ///
    /// # Example
    ///
    /// ```
    /// use tier_ladder_engine::credit::CreditLedger;
    /// use tier_ladder_engine::RngManager;
    ///
    /// let mut ledger = CreditLedger::new(1.0);
    /// ledger.set_pool(10.0);
    /// let mut rng = RngManager::new(1);
    ///
    /// // 10 credits over 5 consumers: exactly 2 attempts, no fraction
    /// assert_eq!(ledger.distribute(5, &mut rng), 2);
    /// assert_eq!(ledger.pool(), 8.0);
    /// ```
    pub fn distribute(&mut self, consumer_count: usize, rng: &mut RngManager) -> u32 {
        if consumer_count == 0 || self.pool <= 0.0 {
            return 0;
        }
        let share = self.pool / consumer_count as f64;
        let whole = share.floor();
        let fraction = share - whole;
        self.pool = (self.pool - share).max(0.0);

        let extra = if fraction > 0.0 && rng.chance(fraction) {
            1
        } else {
            0
        };
        whole as u32 + extra
    }

    /// Recompute the consumers-per-producer ratio used by [`accrue`](Self::accrue)
    pub fn recompute_ratio(&mut self, producer_count: usize, consumer_count: usize) {
        self.ratio = consumer_count as f64 / producer_count.max(1) as f64;
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    pub fn pool(&self) -> f64 {
        self.pool
    }

    pub fn base_threshold(&self) -> f64 {
        self.base_threshold
    }

    /// Restore a checkpointed pool (clamped to be non-negative)
    pub fn set_pool(&mut self, pool: f64) {
        self.pool = if pool.is_finite() { pool.max(0.0) } else { 0.0 };
    }

    /// Restore a checkpointed ratio
    pub fn set_ratio(&mut self, ratio: f64) {
        self.ratio = if ratio.is_finite() { ratio.max(0.0) } else { 0.0 };
    }

    /// Drop the pool (administrative resync)
    pub fn reset(&mut self) {
        self.pool = 0.0;
    }
}
