//! Transition Engine
//!
//! Resolves granted attempts into tier changes.
//!
//! # Attempt
//!
//! One call makes a single uniform draw against
//! `effective = chance × attempts`. The product is deliberately not capped
//! at 1.0, so a large batched grant can guarantee success. This is not the
//! same as `attempts` independent Bernoulli trials
//! (`1 − (1 − chance)^attempts`); the single-draw form is the intended
//! balance and must stay as is.
//!
//! On failure the chance grows by
//! `base_chance × accumulation_rate% × attempts` (pity scales with the
//! attempt units spent in the call). On success the destination is the next
//! tier for simple chains, or a bucket-table draw for weighted chains.
//!
//! # Resolve
//!
//! A grant is re-applied against each newly reached tier until a draw fails
//! or the terminal tier is reached. The chance resets to base whenever the
//! item leaves a tier.

pub mod buckets;

use crate::config::AccumulationRate;
use crate::models::TierChain;
use crate::rng::RngManager;
pub use buckets::{BucketTable, BUCKET_COUNT};

/// Mutable part of an item the engine works on
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransitionState {
    pub tier: usize,
    /// Fraction, 0.01 = 1%
    pub chance: f64,
    /// Diagnostic attempt-unit counter
    pub attempts: u64,
}

/// Outcome of a single draw
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Draw failed (or the tier is terminal); pity applied
    Failed,
    /// Draw succeeded; the item moves to `to`
    Advanced { to: usize },
}

/// Result of resolving a whole grant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolution {
    /// State after the last draw
    pub state: TransitionState,
    /// Tier the item was on before resolving
    pub origin: usize,
    /// Number of successful draws (tier steps or jumps)
    pub successes: u32,
}

impl Resolution {
    pub fn advanced(&self) -> bool {
        self.state.tier > self.origin
    }
}

/// Probabilistic tier advancement with pity accumulation
#[derive(Debug, Clone)]
pub struct TransitionEngine {
    base_chance: f64,
    accumulation_rate: AccumulationRate,
    buckets: BucketTable,
    weighted: bool,
    terminal: usize,
}

impl TransitionEngine {
    /// Create an engine for `chain`
    ///
    /// `base_chance` is a fraction (0.01 = 1%).
    pub fn new(base_chance: f64, accumulation_rate: AccumulationRate, chain: &TierChain) -> Self {
        let mut engine = Self {
            base_chance,
            accumulation_rate,
            buckets: BucketTable::default(),
            weighted: false,
            terminal: 0,
        };
        engine.rebuild(chain);
        engine
    }

    /// Rebuild lookup tables after the chain was rebuilt
    pub fn rebuild(&mut self, chain: &TierChain) {
        self.weighted = chain.is_weighted();
        self.buckets = if self.weighted {
            BucketTable::build(chain)
        } else {
            BucketTable::default()
        };
        self.terminal = chain.terminal();
    }

    pub fn base_chance(&self) -> f64 {
        self.base_chance
    }

    /// Chance added per failed attempt unit
    ///
    /// ```
    /// use tier_ladder_engine::config::AccumulationRate;
    /// use tier_ladder_engine::models::{TierCatalog, TierChain};
    /// use tier_ladder_engine::transition::TransitionEngine;
    ///
    /// let chain = TierChain::build(&TierCatalog::linear(&["a", "b"]), 0.0).unwrap();
    /// let engine = TransitionEngine::new(0.01, AccumulationRate::Low, &chain);
    /// assert!((engine.pity_per_attempt() - 0.002).abs() < 1e-12);
    /// ```
    pub fn pity_per_attempt(&self) -> f64 {
        self.base_chance * self.accumulation_rate.percent() / 100.0
    }

    pub fn is_terminal(&self, tier: usize) -> bool {
        tier >= self.terminal
    }

    /// Single draw for `attempts` attempt units
    ///
    /// Terminal tiers never advance and accumulate no pity.
    pub fn attempt(
        &self,
        state: &mut TransitionState,
        attempts: u32,
        rng: &mut RngManager,
    ) -> AttemptOutcome {
        if attempts == 0 || self.is_terminal(state.tier) {
            return AttemptOutcome::Failed;
        }
        state.attempts += u64::from(attempts);

        let effective = state.chance * f64::from(attempts);
        if rng.chance(effective) {
            let to = self.select_destination(state.tier, rng);
            state.tier = to;
            state.chance = self.base_chance;
            AttemptOutcome::Advanced { to }
        } else {
            state.chance += self.pity_per_attempt() * f64::from(attempts);
            AttemptOutcome::Failed
        }
    }

    /// Apply a grant repeatedly until a draw fails or the terminal tier is hit
    pub fn resolve(
        &self,
        mut state: TransitionState,
        attempts: u32,
        rng: &mut RngManager,
    ) -> Resolution {
        let origin = state.tier;
        let mut successes = 0;
        while !self.is_terminal(state.tier) {
            match self.attempt(&mut state, attempts, rng) {
                AttemptOutcome::Advanced { .. } => successes += 1,
                AttemptOutcome::Failed => break,
            }
        }
        Resolution {
            state,
            origin,
            successes,
        }
    }

    fn select_destination(&self, source: usize, rng: &mut RngManager) -> usize {
        if self.weighted {
            if let Some(dest) = self.buckets.select(source, rng) {
                return dest;
            }
        }
        (source + 1).min(self.terminal)
    }

    /// Expose the weighted destination draw (used by distribution tests)
    pub fn sample_destination(&self, source: usize, rng: &mut RngManager) -> usize {
        self.select_destination(source, rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TierCatalog;

    fn engine(rate: AccumulationRate) -> TransitionEngine {
        let chain = TierChain::build(&TierCatalog::linear(&["a", "b", "c", "d"]), 0.0).unwrap();
        TransitionEngine::new(0.01, rate, &chain)
    }

    fn state(tier: usize, chance: f64) -> TransitionState {
        TransitionState {
            tier,
            chance,
            attempts: 0,
        }
    }

    #[test]
    fn test_guaranteed_success_when_effective_chance_reaches_one() {
        let engine = engine(AccumulationRate::Off);
        let mut rng = RngManager::new(1);
        let mut s = state(0, 0.01);
        assert_eq!(
            engine.attempt(&mut s, 100, &mut rng),
            AttemptOutcome::Advanced { to: 1 }
        );
        assert_eq!(s.chance, 0.01, "chance resets on leaving the tier");
        assert_eq!(s.attempts, 100);
    }

    #[test]
    fn test_pity_scales_with_attempt_units() {
        let engine = engine(AccumulationRate::High);
        let mut rng = RngManager::new(1);
        let mut s = state(0, 0.0);
        engine.attempt(&mut s, 5, &mut rng);
        assert!((s.chance - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_terminal_never_attempts() {
        let engine = engine(AccumulationRate::High);
        let mut rng = RngManager::new(1);
        let mut s = state(3, 0.5);
        assert_eq!(engine.attempt(&mut s, 10, &mut rng), AttemptOutcome::Failed);
        assert_eq!(s.chance, 0.5);
        assert_eq!(s.attempts, 0);
    }

    #[test]
    fn test_resolve_stops_at_terminal() {
        let engine = engine(AccumulationRate::Off);
        let mut rng = RngManager::new(9);
        let resolution = engine.resolve(state(0, 0.01), 1000, &mut rng);
        assert_eq!(resolution.state.tier, 3);
        assert_eq!(resolution.successes, 3);
        assert!(resolution.advanced());
    }

    #[test]
    fn test_resolve_zero_attempts_is_noop() {
        let engine = engine(AccumulationRate::High);
        let mut rng = RngManager::new(9);
        let before = rng.get_state();
        let resolution = engine.resolve(state(1, 0.3), 0, &mut rng);
        assert!(!resolution.advanced());
        assert_eq!(resolution.state.chance, 0.3);
        assert_eq!(rng.get_state(), before);
    }
}
