//! Bucket tables for weighted branching chains
//!
//! For a chain where a transition landing on tier `t` continues to `t + 1`
//! with probability `p_t`, the final destination from a source tier follows
//! a truncated geometric-like distribution. Instead of walking the chain on
//! every success, each source tier gets a fixed-size table whose slots hold
//! destination ordinals in proportion to their probability; one uniform slot
//! draw then selects the destination in O(1).
//!
//! Construction walks the intermediate tiers in order:
//!
//! ```text
//! remaining = 1.0
//! for t in source+1 .. terminal:
//!     share   = remaining × (1 − p_t)
//!     buckets = round(share × BUCKET_COUNT), at least 1 if share > 0
//!     remaining ×= p_t
//! terminal gets whatever buckets are left
//! ```
//!
//! The minimum of one bucket keeps rare stops reachable; the terminal tier
//! absorbs rounding.

use crate::models::TierChain;
use crate::rng::RngManager;

/// Slots per source-tier table
pub const BUCKET_COUNT: usize = 1000;

/// Per-source-tier destination tables
#[derive(Debug, Clone, Default)]
pub struct BucketTable {
    /// `tables[source]` has `BUCKET_COUNT` destination ordinals, or is empty
    /// for the terminal tier
    tables: Vec<Vec<usize>>,
}

impl BucketTable {
    /// Build tables for every source tier of `chain`
    pub fn build(chain: &TierChain) -> Self {
        let terminal = chain.terminal();
        let tables = (0..chain.len())
            .map(|source| {
                if source >= terminal {
                    Vec::new()
                } else {
                    Self::build_for_source(chain, source, terminal)
                }
            })
            .collect();
        Self { tables }
    }

    fn build_for_source(chain: &TierChain, source: usize, terminal: usize) -> Vec<usize> {
        let mut slots = Vec::with_capacity(BUCKET_COUNT);
        let mut remaining = 1.0_f64;

        for dest in (source + 1)..terminal {
            let left = BUCKET_COUNT - slots.len();
            if left == 0 {
                break;
            }
            let p_continue = chain.tier(dest).map_or(0.0, |t| t.continue_probability);
            let share = remaining * (1.0 - p_continue);
            let mut count = (share * BUCKET_COUNT as f64).round() as usize;
            if share > 0.0 {
                count = count.max(1);
            }
            let count = count.min(left);
            slots.extend(std::iter::repeat(dest).take(count));
            remaining *= p_continue;
        }

        slots.resize(BUCKET_COUNT, terminal);
        slots
    }

    /// Draw a destination for a success on `source`
    ///
    /// Returns `None` for the terminal tier or an unknown ordinal.
    pub fn select(&self, source: usize, rng: &mut RngManager) -> Option<usize> {
        let table = self.tables.get(source)?;
        if table.is_empty() {
            return None;
        }
        Some(table[rng.below(table.len())])
    }

    /// Number of slots `source` assigns to `dest`
    pub fn slots_for(&self, source: usize, dest: usize) -> usize {
        self.tables
            .get(source)
            .map_or(0, |t| t.iter().filter(|&&d| d == dest).count())
    }
}
