//! xorshift64* random number generator
//!
//! Every probabilistic decision in the engine (transition draws, bucket
//! lookups, fractional credit rounding) is taken from one seeded stream so a
//! run can be replayed exactly from its seed and its input events.

use serde::{Deserialize, Serialize};

/// Deterministic random number generator using xorshift64*
///
/// # Example
/// ```
/// use tier_ladder_engine::RngManager;
///
/// let mut rng = RngManager::new(12345);
/// let draw = rng.next_f64();
/// assert!((0.0..1.0).contains(&draw));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RngManager {
    state: u64,
}

impl RngManager {
    /// Create a new RNG with given seed
    ///
    /// A zero seed is replaced by 1, since xorshift never leaves the zero state.
    pub fn new(seed: u64) -> Self {
        let state = if seed == 0 { 1 } else { seed };
        Self { state }
    }

    /// Generate next random u64 value
    pub fn next(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    /// Uniform index in `[0, bound)`
    ///
    /// # Panics
    /// Panics if `bound` is zero
    ///
    /// # Example
    /// ```
    /// use tier_ladder_engine::RngManager;
    ///
    /// let mut rng = RngManager::new(7);
    /// assert!(rng.below(1000) < 1000);
    /// ```
    pub fn below(&mut self, bound: usize) -> usize {
        assert!(bound > 0, "bound must be positive");
        (self.next() % bound as u64) as usize
    }

    /// Generate random f64 in range [0.0, 1.0)
    pub fn next_f64(&mut self) -> f64 {
        let value = self.next();
        (value >> 11) as f64 * (1.0 / ((1u64 << 53) as f64))
    }

    /// Bernoulli draw: true with probability `p`
    ///
    /// Values of `p` at or above 1.0 always succeed, values at or below 0.0
    /// never do. One draw is consumed either way so the stream position
    /// does not depend on `p`.
    pub fn chance(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }

    /// Get current RNG state (for checkpointing/replay)
    ///
    /// `RngManager::new(state)` resumes the exact same sequence.
    pub fn get_state(&self) -> u64 {
        self.state
    }
}
