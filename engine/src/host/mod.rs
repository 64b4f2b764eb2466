//! Host interfaces
//!
//! The engine never touches host entities directly. Everything it needs from
//! the outside world goes through the narrow traits below, so the same
//! engine can drive a game mod, a simulation, or the in-memory host used by
//! the tests.
//!
//! - [`ItemSource`]: full enumeration, used by administrative resync
//! - [`MetricSource`]: validity checks and producer work counters
//! - [`Mutator`]: the tier-change primitive
//! - [`ResourceQuery`]: external resource pool lookups (gated mode)
//! - [`NotificationSink`]: per-epoch transition summaries
//!
//! [`Host`] bundles the traits the scheduler needs on every tick.

pub mod memory;

use crate::error::MutationError;
use crate::models::{ItemId, ItemObservation, Tier, TrackedItem};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use memory::InMemoryHost;

/// Enumerates every qualifying host entity
pub trait ItemSource {
    fn enumerate(&self) -> Vec<ItemObservation>;
}

/// Validity and work-metric lookups
pub trait MetricSource {
    /// False once the host no longer knows the entity
    fn is_valid(&self, id: ItemId) -> bool;

    /// Monotonic work counter of a producer; `None` if unavailable
    fn work_counter(&self, id: ItemId) -> Option<f64>;

    /// Work units per counter increment (e.g. recipe energy)
    fn unit_cost(&self, id: ItemId) -> f64;

    /// Tier the entity is on now, by name; `None` if unknown
    fn tier_name(&self, id: ItemId) -> Option<String>;
}

/// Result of a successful mutation request
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome {
    /// The host swapped the entity synchronously for a new one
    Replaced(ItemObservation),
    /// The host placed an out-of-band order; the outcome arrives later
    Deferred,
}

/// Tier-change primitive
pub trait Mutator {
    fn mutate(
        &mut self,
        item: &TrackedItem,
        destination: &Tier,
    ) -> Result<MutationOutcome, MutationError>;
}

/// External resource pool lookups for resource-gated mode
pub trait ResourceQuery {
    /// Units of `resource` at `tier` currently in `pool`
    fn available_count(&self, pool: &str, resource: &str, tier: &str) -> u32;

    /// Pools the item may draw a resource unit from, in preference order
    fn pools_for(&self, item: &TrackedItem) -> Vec<String>;

    /// Whether the item is still waiting for its external transition
    fn is_awaiting(&self, item_id: ItemId) -> bool;
}

/// Receives one summary per completed epoch
pub trait NotificationSink {
    fn epoch_summary(&mut self, summary: &EpochSummary);
}

/// Everything the scheduler needs on a tick
pub trait Host: MetricSource + Mutator + ResourceQuery + NotificationSink {}

impl<T> Host for T where T: MetricSource + Mutator + ResourceQuery + NotificationSink {}

/// Transitions of one epoch, counted per `(kind, destination tier)`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochSummary {
    pub epoch: u64,
    /// kind -> destination tier -> count
    pub counts: BTreeMap<String, BTreeMap<String, u32>>,
}

impl EpochSummary {
    pub fn new(epoch: u64) -> Self {
        Self {
            epoch,
            counts: BTreeMap::new(),
        }
    }

    pub fn record(&mut self, kind: &str, tier: &str) {
        *self
            .counts
            .entry(kind.to_string())
            .or_default()
            .entry(tier.to_string())
            .or_insert(0) += 1;
    }

    pub fn count(&self, kind: &str, tier: &str) -> u32 {
        self.counts
            .get(kind)
            .and_then(|tiers| tiers.get(tier))
            .copied()
            .unwrap_or(0)
    }

    pub fn total(&self) -> u32 {
        self.counts.values().flat_map(|tiers| tiers.values()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts_by_kind_and_tier() {
        let mut summary = EpochSummary::new(3);
        summary.record("furnace", "uncommon");
        summary.record("furnace", "uncommon");
        summary.record("furnace", "rare");
        summary.record("inserter", "uncommon");

        assert_eq!(summary.count("furnace", "uncommon"), 2);
        assert_eq!(summary.count("inserter", "rare"), 0);
        assert_eq!(summary.total(), 4);
        assert!(!summary.is_empty());
    }
}
