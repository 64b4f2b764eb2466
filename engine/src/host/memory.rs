//! In-memory host for tests and demos.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::MutationError;
use crate::host::{
    EpochSummary, ItemSource, MetricSource, MutationOutcome, Mutator, NotificationSink,
    ResourceQuery,
};
use crate::models::{Category, ItemId, ItemObservation, Tier, TrackedItem};

/// One simulated host entity.
#[derive(Debug, Clone, PartialEq)]
pub struct HostEntity {
    pub kind: String,
    pub category: Category,
    pub tier_name: String,
    /// Work counter (producers only).
    pub counter: Option<f64>,
}

/// Hash-map backed host.
///
/// Mutations replace the entity with a fresh id on the destination tier,
/// unless deferral is switched on, in which case the entity is marked as
/// awaiting and left alone until [`complete_deferred`](Self::complete_deferred)
/// or [`abort_deferred`](Self::abort_deferred).
#[derive(Debug, Clone, Default)]
pub struct InMemoryHost {
    entities: BTreeMap<ItemId, HostEntity>,
    next_id: u64,
    unit_costs: HashMap<String, f64>,
    defer_mutations: bool,
    failing: HashSet<ItemId>,
    /// (pool, resource, tier) -> units
    resources: HashMap<(String, String, String), u32>,
    pools: Vec<String>,
    awaiting: HashMap<ItemId, String>,
    summaries: Vec<EpochSummary>,
    mutation_calls: usize,
}

impl InMemoryHost {
    /// Create an empty host.
    pub fn new() -> Self {
        Self {
            next_id: 1,
            ..Default::default()
        }
    }

    /// Add an entity with a fresh id and return its observation.
    pub fn spawn(&mut self, kind: &str, category: Category, tier_name: &str) -> ItemObservation {
        let id = ItemId(self.next_id);
        self.next_id += 1;
        let counter = match category {
            Category::Producer => Some(0.0),
            Category::Consumer => None,
        };
        self.entities.insert(
            id,
            HostEntity {
                kind: kind.to_string(),
                category,
                tier_name: tier_name.to_string(),
                counter,
            },
        );
        ItemObservation {
            id,
            kind: kind.to_string(),
            category,
            tier_name: tier_name.to_string(),
        }
    }

    /// Remove an entity, as if the host destroyed it.
    pub fn remove(&mut self, id: ItemId) -> Option<HostEntity> {
        self.awaiting.remove(&id);
        self.entities.remove(&id)
    }

    pub fn entity(&self, id: ItemId) -> Option<&HostEntity> {
        self.entities.get(&id)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Count entities of `kind` on `tier_name`.
    pub fn count_on_tier(&self, kind: &str, tier_name: &str) -> usize {
        self.entities
            .values()
            .filter(|e| e.kind == kind && e.tier_name == tier_name)
            .count()
    }

    /// Advance a producer's work counter.
    pub fn add_work(&mut self, id: ItemId, delta: f64) {
        if let Some(counter) = self.entities.get_mut(&id).and_then(|e| e.counter.as_mut()) {
            *counter += delta;
        }
    }

    /// Overwrite a producer's work counter (may go backwards).
    pub fn set_counter(&mut self, id: ItemId, value: Option<f64>) {
        if let Some(entity) = self.entities.get_mut(&id) {
            entity.counter = value;
        }
    }

    /// Work units per counter increment for every entity of `kind`
    /// (default 1.0).
    pub fn set_unit_cost(&mut self, kind: &str, cost: f64) {
        self.unit_costs.insert(kind.to_string(), cost);
    }

    pub fn set_defer_mutations(&mut self, defer: bool) {
        self.defer_mutations = defer;
    }

    /// Make every mutation of `id` fail.
    pub fn fail_mutations_for(&mut self, id: ItemId) {
        self.failing.insert(id);
    }

    /// Register a pool returned by `pools_for`.
    pub fn add_pool(&mut self, pool: &str) {
        if !self.pools.iter().any(|p| p == pool) {
            self.pools.push(pool.to_string());
        }
    }

    pub fn set_available(&mut self, pool: &str, resource: &str, tier: &str, units: u32) {
        self.add_pool(pool);
        self.resources
            .insert((pool.to_string(), resource.to_string(), tier.to_string()), units);
    }

    /// Finish a deferred mutation: consume one unit and move the entity.
    ///
    /// Returns false if the entity was not awaiting.
    pub fn complete_deferred(&mut self, id: ItemId) -> bool {
        let Some(tier_name) = self.awaiting.remove(&id) else {
            return false;
        };
        let Some(kind) = self.entities.get(&id).map(|e| e.kind.clone()) else {
            return false;
        };
        self.consume_unit(&kind, &tier_name);
        if let Some(entity) = self.entities.get_mut(&id) {
            entity.tier_name = tier_name;
        }
        true
    }

    /// Drop a deferred mutation without consuming anything.
    pub fn abort_deferred(&mut self, id: ItemId) -> bool {
        self.awaiting.remove(&id).is_some()
    }

    pub fn summaries(&self) -> &[EpochSummary] {
        &self.summaries
    }

    pub fn mutation_calls(&self) -> usize {
        self.mutation_calls
    }

    fn consume_unit(&mut self, kind: &str, tier_name: &str) {
        for pool in &self.pools {
            let key = (pool.clone(), kind.to_string(), tier_name.to_string());
            if let Some(units) = self.resources.get_mut(&key) {
                if *units > 0 {
                    *units -= 1;
                    return;
                }
            }
        }
    }
}

impl ItemSource for InMemoryHost {
    fn enumerate(&self) -> Vec<ItemObservation> {
        self.entities
            .iter()
            .map(|(id, e)| ItemObservation {
                id: *id,
                kind: e.kind.clone(),
                category: e.category,
                tier_name: e.tier_name.clone(),
            })
            .collect()
    }
}

impl MetricSource for InMemoryHost {
    fn is_valid(&self, id: ItemId) -> bool {
        self.entities.contains_key(&id)
    }

    fn work_counter(&self, id: ItemId) -> Option<f64> {
        self.entities.get(&id).and_then(|e| e.counter)
    }

    fn unit_cost(&self, id: ItemId) -> f64 {
        self.entities
            .get(&id)
            .and_then(|e| self.unit_costs.get(&e.kind))
            .copied()
            .unwrap_or(1.0)
    }

    fn tier_name(&self, id: ItemId) -> Option<String> {
        self.entities.get(&id).map(|e| e.tier_name.clone())
    }
}

impl Mutator for InMemoryHost {
    fn mutate(
        &mut self,
        item: &TrackedItem,
        destination: &Tier,
    ) -> Result<MutationOutcome, MutationError> {
        self.mutation_calls += 1;
        if self.failing.contains(&item.id()) {
            return Err(MutationError::new(format!("{} is blocked", item.id())));
        }
        let Some(entity) = self.entities.get(&item.id()).cloned() else {
            return Err(MutationError::new(format!("{} does not exist", item.id())));
        };

        if self.defer_mutations {
            self.awaiting.insert(item.id(), destination.name.clone());
            return Ok(MutationOutcome::Deferred);
        }

        self.consume_unit(&entity.kind, &destination.name);
        self.entities.remove(&item.id());
        Ok(MutationOutcome::Replaced(self.spawn(
            &entity.kind,
            entity.category,
            &destination.name,
        )))
    }
}

impl ResourceQuery for InMemoryHost {
    fn available_count(&self, pool: &str, resource: &str, tier: &str) -> u32 {
        self.resources
            .get(&(pool.to_string(), resource.to_string(), tier.to_string()))
            .copied()
            .unwrap_or(0)
    }

    fn pools_for(&self, _item: &TrackedItem) -> Vec<String> {
        self.pools.clone()
    }

    fn is_awaiting(&self, item_id: ItemId) -> bool {
        self.awaiting.contains_key(&item_id)
    }
}

impl NotificationSink for InMemoryHost {
    fn epoch_summary(&mut self, summary: &EpochSummary) {
        self.summaries.push(summary.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TierCatalog, TierChain};

    #[test]
    fn test_replacement_gets_new_id_on_destination() {
        let chain = TierChain::build(&TierCatalog::linear(&["normal", "rare"]), 0.0).unwrap();
        let mut host = InMemoryHost::new();
        let obs = host.spawn("drill", Category::Producer, "normal");
        let item = TrackedItem::new(obs.id, "drill", Category::Producer, 0, 0.01);

        let outcome = host.mutate(&item, chain.tier(1).unwrap()).unwrap();
        match outcome {
            MutationOutcome::Replaced(new) => {
                assert_ne!(new.id, obs.id);
                assert_eq!(new.tier_name, "rare");
                assert!(!host.is_valid(obs.id));
            }
            MutationOutcome::Deferred => panic!("expected replacement"),
        }
    }

    #[test]
    fn test_deferred_completion_consumes_unit() {
        let chain = TierChain::build(&TierCatalog::linear(&["normal", "rare"]), 0.0).unwrap();
        let mut host = InMemoryHost::new();
        host.set_available("net", "chest", "rare", 2);
        host.set_defer_mutations(true);
        let obs = host.spawn("chest", Category::Consumer, "normal");
        let item = TrackedItem::new(obs.id, "chest", Category::Consumer, 0, 0.01);

        assert_eq!(
            host.mutate(&item, chain.tier(1).unwrap()).unwrap(),
            MutationOutcome::Deferred
        );
        assert!(host.is_awaiting(obs.id));
        assert!(host.complete_deferred(obs.id));
        assert_eq!(host.available_count("net", "chest", "rare"), 1);
        assert_eq!(host.entity(obs.id).unwrap().tier_name, "rare");
    }
}
