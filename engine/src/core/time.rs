//! Cycle clock for the batch scheduler
//!
//! The host drives the engine one tick at a time. A scheduling batch runs on
//! every `cycle_period`-th tick; the ticks in between only do bounded
//! reservation housekeeping.

use serde::{Deserialize, Serialize};

/// Counts host ticks and decides which of them run a batch
///
/// # Example
/// ```
/// use tier_ladder_engine::CycleClock;
///
/// let mut clock = CycleClock::new(10);
/// assert!(clock.is_batch_tick()); // tick 0 runs a batch
///
/// clock.advance_tick();
/// assert_eq!(clock.current_tick(), 1);
/// assert!(!clock.is_batch_tick());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleClock {
    /// Total ticks elapsed since the engine started
    current_tick: u64,
    /// Ticks between two scheduling batches (K)
    cycle_period: u64,
}

impl CycleClock {
    /// Create a new clock
    ///
    /// # Panics
    /// Panics if `cycle_period` is zero
    pub fn new(cycle_period: u64) -> Self {
        assert!(cycle_period > 0, "cycle_period must be positive");
        Self {
            current_tick: 0,
            cycle_period,
        }
    }

    /// Resume a clock at a checkpointed tick
    pub fn resume_at(cycle_period: u64, current_tick: u64) -> Self {
        let mut clock = Self::new(cycle_period);
        clock.current_tick = current_tick;
        clock
    }

    /// Advance time by one tick
    pub fn advance_tick(&mut self) {
        self.current_tick += 1;
    }

    /// Current tick (total ticks since start)
    pub fn current_tick(&self) -> u64 {
        self.current_tick
    }

    /// Whether the current tick runs a scheduling batch
    pub fn is_batch_tick(&self) -> bool {
        self.current_tick % self.cycle_period == 0
    }

    /// Number of batches run so far, counting the current tick if it is one
    ///
    /// ```
    /// use tier_ladder_engine::CycleClock;
    ///
    /// let clock = CycleClock::resume_at(10, 25);
    /// assert_eq!(clock.batches_elapsed(), 3); // ticks 0, 10, 20
    /// ```
    pub fn batches_elapsed(&self) -> u64 {
        self.current_tick / self.cycle_period + 1
    }

    /// Ticks between batches
    pub fn cycle_period(&self) -> u64 {
        self.cycle_period
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "cycle_period must be positive")]
    fn test_zero_cycle_period_panics() {
        CycleClock::new(0);
    }

    #[test]
    fn test_batch_ticks_follow_period() {
        let mut clock = CycleClock::new(3);
        let mut batch_ticks = Vec::new();
        for _ in 0..10 {
            if clock.is_batch_tick() {
                batch_ticks.push(clock.current_tick());
            }
            clock.advance_tick();
        }
        assert_eq!(batch_ticks, vec![0, 3, 6, 9]);
    }

    #[test]
    fn test_period_of_one_batches_every_tick() {
        let mut clock = CycleClock::new(1);
        for _ in 0..5 {
            assert!(clock.is_batch_tick());
            clock.advance_tick();
        }
    }
}
