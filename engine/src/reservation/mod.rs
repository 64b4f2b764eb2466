//! Reservation Manager (resource-gated mode)
//!
//! In resource-gated mode a transition has to consume one unit of a
//! matching resource (same resource name, destination tier) from an external
//! pool. The consuming action completes out of band, zero or more ticks later
//! or never, so units are reserved locally first and reconciled when the
//! host signals confirm or cancel.
//!
//! # Counters
//!
//! Per `(pool, resource, tier)`:
//!
//! - `available`: last external snapshot, refreshed one tier per lookup
//!   (round-robin) to bound query cost
//! - `reserved`: locally authoritative, one per outstanding order
//! - `settling`: confirmed since the last refresh of that tier
//!
//! `remaining = available - reserved - settling`. A confirm moves one unit
//! from `reserved` to `settling` instead of touching `available`; the next
//! refresh replaces `available` with the external count (which already
//! reflects the consumption) and clears `settling`. The consumption is
//! therefore subtracted exactly once.
//!
//! # Safety Bias
//!
//! Every way local and external state can diverge (a stale snapshot, a
//! unit consumed by someone else, a lost signal) lowers `remaining`. The
//! manager can undercount availability but never over-allocate.

use crate::host::ResourceQuery;
use crate::models::{ItemId, TierChain};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound::{Excluded, Unbounded};
use thiserror::Error;

/// Identifier of an outstanding order, monotonically increasing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "order-{}", self.0)
    }
}

/// Reservation signal errors (non-fatal drift)
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReservationError {
    #[error("unknown order {0}")]
    UnknownOrder(OrderId),
}

/// One reserved unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub item_id: ItemId,
    pub pool: String,
    pub resource: String,
    pub tier: usize,
}

/// Counters for one `(pool, resource, tier)`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TierCounts {
    pub available: u32,
    pub reserved: u32,
    pub settling: u32,
}

impl TierCounts {
    /// Units that can still be reserved
    pub fn remaining(&self) -> u32 {
        self.available
            .saturating_sub(self.reserved.saturating_add(self.settling))
    }
}

/// Local counters disagreed with a fresh external snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriftRecord {
    pub pool: String,
    pub resource: String,
    pub tier: usize,
    pub available: u32,
    pub reserved: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct ResourceKey {
    pool: String,
    resource: String,
}

#[derive(Debug, Clone, Default)]
struct KeyEntry {
    /// Indexed by tier ordinal
    counts: Vec<TierCounts>,
    populated: bool,
    refresh_cursor: usize,
}

/// Reservation bookkeeping for resource-gated transitions
#[derive(Debug, Clone)]
pub struct ReservationManager {
    tier_names: Vec<String>,
    table: BTreeMap<ResourceKey, KeyEntry>,
    orders: BTreeMap<OrderId, Order>,
    next_order: u64,
    /// Last order checked by `process_pending`
    scan_cursor: OrderId,
    drift: Vec<DriftRecord>,
}

impl ReservationManager {
    pub fn new(chain: &TierChain) -> Self {
        Self {
            tier_names: chain.iter().map(|t| t.name.clone()).collect(),
            table: BTreeMap::new(),
            orders: BTreeMap::new(),
            next_order: 1,
            scan_cursor: OrderId(0),
            drift: Vec::new(),
        }
    }

    /// Rebuild from checkpointed orders; reserved counts are recomputed
    pub fn from_orders(chain: &TierChain, orders: Vec<Order>, next_order: u64) -> Self {
        let mut manager = Self::new(chain);
        let highest = orders.iter().map(|o| o.id.0).max().unwrap_or(0);
        manager.next_order = next_order.max(highest + 1);
        for order in orders {
            manager.orders.insert(order.id, order);
        }
        manager.recount_reserved();
        manager
    }

    /// Adopt a rebuilt chain
    ///
    /// The availability snapshot is dropped and re-populated on next use.
    /// Orders are remapped to the new ordinals; orders whose tier no longer
    /// exists are returned so the caller can release their items.
    pub fn rebuild(
        &mut self,
        chain: &TierChain,
        remap: impl Fn(usize) -> Option<usize>,
    ) -> Vec<Order> {
        self.tier_names = chain.iter().map(|t| t.name.clone()).collect();
        self.table.clear();

        let mut dropped = Vec::new();
        let ids: Vec<OrderId> = self.orders.keys().copied().collect();
        for id in ids {
            let new_tier = self.orders.get(&id).and_then(|o| remap(o.tier));
            match new_tier {
                Some(tier) => {
                    if let Some(order) = self.orders.get_mut(&id) {
                        order.tier = tier;
                    }
                }
                None => {
                    if let Some(order) = self.orders.remove(&id) {
                        dropped.push(order);
                    }
                }
            }
        }
        self.recount_reserved();
        dropped
    }

    fn recount_reserved(&mut self) {
        for entry in self.table.values_mut() {
            for counts in &mut entry.counts {
                counts.reserved = 0;
            }
        }
        let orders: Vec<(ResourceKey, usize)> = self
            .orders
            .values()
            .map(|o| (ResourceKey::new(&o.pool, &o.resource), o.tier))
            .collect();
        for (key, tier) in orders {
            if let Some(counts) = self.counts_mut(key, tier) {
                counts.reserved = counts.reserved.saturating_add(1);
            }
        }
    }

    fn entry_mut(&mut self, key: ResourceKey) -> &mut KeyEntry {
        let tiers = self.tier_names.len();
        let entry = self.table.entry(key).or_default();
        if entry.counts.len() < tiers {
            entry.counts.resize(tiers, TierCounts::default());
        }
        entry
    }

    fn counts_mut(&mut self, key: ResourceKey, tier: usize) -> Option<&mut TierCounts> {
        self.entry_mut(key).counts.get_mut(tier)
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Best tier in `(current_tier, ceiling]` with a unit left to reserve
    ///
    /// The first lookup for a `(pool, resource)` populates every tier; later
    /// lookups refresh one tier each, round-robin. Tiers are scanned from
    /// the ceiling downward so the best reachable upgrade wins.
    pub fn find_available<Q: ResourceQuery + ?Sized>(
        &mut self,
        source: &Q,
        pool: &str,
        resource: &str,
        current_tier: usize,
        ceiling: usize,
    ) -> Option<usize> {
        let tier_count = self.tier_names.len();
        if tier_count < 2 {
            return None;
        }
        let key = ResourceKey::new(pool, resource);
        let populated = self.entry_mut(key.clone()).populated;

        if populated {
            let entry = self.entry_mut(key.clone());
            // Tier 0 is never a destination
            let tier = 1 + entry.refresh_cursor % (tier_count - 1);
            entry.refresh_cursor = (entry.refresh_cursor + 1) % (tier_count - 1);
            self.refresh_tier(source, &key, tier);
        } else {
            for tier in 1..tier_count {
                self.refresh_tier(source, &key, tier);
            }
            self.entry_mut(key.clone()).populated = true;
        }

        let top = ceiling.min(tier_count - 1);
        let entry = self.entry_mut(key);
        ((current_tier + 1)..=top)
            .rev()
            .find(|&tier| entry.counts[tier].remaining() > 0)
    }

    fn refresh_tier<Q: ResourceQuery + ?Sized>(
        &mut self,
        source: &Q,
        key: &ResourceKey,
        tier: usize,
    ) {
        let Some(tier_name) = self.tier_names.get(tier) else {
            return;
        };
        let available = source.available_count(&key.pool, &key.resource, tier_name);
        let Some(counts) = self.counts_mut(key.clone(), tier) else {
            return;
        };
        counts.available = available;
        counts.settling = 0;
        let reserved = counts.reserved;

        if available < reserved {
            tracing::debug!(
                pool = %key.pool,
                resource = %key.resource,
                tier,
                available,
                reserved,
                "reservation drift: fewer units available than reserved"
            );
            self.drift.push(DriftRecord {
                pool: key.pool.clone(),
                resource: key.resource.clone(),
                tier,
                available,
                reserved,
            });
        }
    }

    // ========================================================================
    // Order lifecycle
    // ========================================================================

    /// Reserve exactly one unit and enqueue an order for it
    pub fn reserve(&mut self, pool: &str, resource: &str, tier: usize, item_id: ItemId) -> OrderId {
        let id = OrderId(self.next_order);
        self.next_order += 1;

        if let Some(counts) = self.counts_mut(ResourceKey::new(pool, resource), tier) {
            counts.reserved = counts.reserved.saturating_add(1);
        }
        self.orders.insert(
            id,
            Order {
                id,
                item_id,
                pool: pool.to_string(),
                resource: resource.to_string(),
                tier,
            },
        );
        id
    }

    /// External signal: the consuming action completed
    pub fn confirm(&mut self, order_id: OrderId) -> Result<Order, ReservationError> {
        let order = self.take_order(order_id)?;
        if let Some(counts) = self.counts_mut(ResourceKey::new(&order.pool, &order.resource), order.tier) {
            counts.reserved = counts.reserved.saturating_sub(1);
            counts.settling = counts.settling.saturating_add(1);
        }
        Ok(order)
    }

    /// External signal: the consuming action was aborted
    pub fn cancel(&mut self, order_id: OrderId) -> Result<Order, ReservationError> {
        let order = self.take_order(order_id)?;
        self.release(&order);
        Ok(order)
    }

    fn take_order(&mut self, order_id: OrderId) -> Result<Order, ReservationError> {
        self.orders.remove(&order_id).ok_or_else(|| {
            tracing::debug!(order = %order_id, "signal for unknown order ignored");
            ReservationError::UnknownOrder(order_id)
        })
    }

    fn release(&mut self, order: &Order) {
        if let Some(counts) = self.counts_mut(ResourceKey::new(&order.pool, &order.resource), order.tier) {
            counts.reserved = counts.reserved.saturating_sub(1);
        }
    }

    /// Reclaim orders whose item stopped awaiting confirmation
    ///
    /// Checks at most `limit` orders, continuing round-robin from where the
    /// previous call stopped. A missed signal is treated as a cancel.
    pub fn process_pending<Q: ResourceQuery + ?Sized>(
        &mut self,
        source: &Q,
        limit: usize,
    ) -> Vec<Order> {
        let ids: Vec<OrderId> = self
            .orders
            .range((Excluded(self.scan_cursor), Unbounded))
            .chain(self.orders.range(..=self.scan_cursor))
            .map(|(id, _)| *id)
            .take(limit)
            .collect();

        let mut reclaimed = Vec::new();
        for id in ids {
            self.scan_cursor = id;
            let awaiting = self
                .orders
                .get(&id)
                .map_or(true, |order| source.is_awaiting(order.item_id));
            if !awaiting {
                if let Some(order) = self.orders.remove(&id) {
                    self.release(&order);
                    reclaimed.push(order);
                }
            }
        }
        reclaimed
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Drift observed since the last call
    pub fn take_drift(&mut self) -> Vec<DriftRecord> {
        std::mem::take(&mut self.drift)
    }

    pub fn order(&self, order_id: OrderId) -> Option<&Order> {
        self.orders.get(&order_id)
    }

    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.values()
    }

    pub fn outstanding(&self) -> usize {
        self.orders.len()
    }

    pub fn next_order_id(&self) -> u64 {
        self.next_order
    }

    /// Current counters, if the key has been touched
    pub fn counts(&self, pool: &str, resource: &str, tier: usize) -> Option<TierCounts> {
        self.table
            .get(&ResourceKey::new(pool, resource))
            .and_then(|entry| entry.counts.get(tier).copied())
    }
}

impl ResourceKey {
    fn new(pool: &str, resource: &str) -> Self {
        Self {
            pool: pool.to_string(),
            resource: resource.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TierCatalog, TrackedItem};
    use std::cell::RefCell;
    use std::collections::{HashMap, HashSet};

    #[derive(Default)]
    struct FakePool {
        counts: RefCell<HashMap<String, u32>>,
        awaiting: HashSet<ItemId>,
    }

    impl FakePool {
        fn set(&self, tier: &str, n: u32) {
            self.counts.borrow_mut().insert(tier.to_string(), n);
        }
    }

    impl ResourceQuery for FakePool {
        fn available_count(&self, _pool: &str, _resource: &str, tier: &str) -> u32 {
            self.counts.borrow().get(tier).copied().unwrap_or(0)
        }

        fn pools_for(&self, _item: &TrackedItem) -> Vec<String> {
            vec!["net".to_string()]
        }

        fn is_awaiting(&self, item_id: ItemId) -> bool {
            self.awaiting.contains(&item_id)
        }
    }

    fn chain() -> TierChain {
        TierChain::build(&TierCatalog::linear(&["t0", "t1", "t2", "t3"]), 0.0).unwrap()
    }

    #[test]
    fn test_prefers_highest_tier_under_ceiling() {
        let pool = FakePool::default();
        pool.set("t1", 1);
        pool.set("t2", 1);
        pool.set("t3", 1);
        let mut manager = ReservationManager::new(&chain());

        assert_eq!(manager.find_available(&pool, "net", "gear", 0, 2), Some(2));
        assert_eq!(manager.find_available(&pool, "net", "gear", 0, 3), Some(3));
        assert_eq!(manager.find_available(&pool, "net", "gear", 2, 2), None);
    }

    #[test]
    fn test_reserved_units_are_not_offered_again() {
        let pool = FakePool::default();
        pool.set("t1", 1);
        let mut manager = ReservationManager::new(&chain());

        assert_eq!(manager.find_available(&pool, "net", "gear", 0, 1), Some(1));
        manager.reserve("net", "gear", 1, ItemId(1));
        assert_eq!(manager.find_available(&pool, "net", "gear", 0, 1), None);
    }

    #[test]
    fn test_cancel_releases_unit() {
        let pool = FakePool::default();
        pool.set("t1", 1);
        let mut manager = ReservationManager::new(&chain());
        manager.find_available(&pool, "net", "gear", 0, 1);
        let order = manager.reserve("net", "gear", 1, ItemId(1));

        manager.cancel(order).unwrap();
        assert_eq!(manager.counts("net", "gear", 1).unwrap().reserved, 0);
        assert_eq!(manager.find_available(&pool, "net", "gear", 0, 1), Some(1));
        assert_eq!(
            manager.cancel(order),
            Err(ReservationError::UnknownOrder(order))
        );
    }

    #[test]
    fn test_round_robin_refresh_skips_root() {
        let pool = FakePool::default();
        let mut manager = ReservationManager::new(&chain());
        manager.find_available(&pool, "net", "gear", 0, 3);

        // t1..t3 refresh in turn; a change on t2 shows up on the second call
        pool.set("t2", 4);
        manager.find_available(&pool, "net", "gear", 0, 3);
        assert_eq!(manager.counts("net", "gear", 2).unwrap().available, 0);
        manager.find_available(&pool, "net", "gear", 0, 3);
        assert_eq!(manager.counts("net", "gear", 2).unwrap().available, 4);
    }

    #[test]
    fn test_drift_recorded_when_snapshot_below_reserved() {
        let pool = FakePool::default();
        pool.set("t1", 2);
        let chain = TierChain::build(&TierCatalog::linear(&["t0", "t1"]), 0.0).unwrap();
        let mut manager = ReservationManager::new(&chain);
        manager.find_available(&pool, "net", "gear", 0, 1);
        manager.reserve("net", "gear", 1, ItemId(1));
        manager.reserve("net", "gear", 1, ItemId(2));

        pool.set("t1", 1);
        assert_eq!(manager.find_available(&pool, "net", "gear", 0, 1), None);
        let drift = manager.take_drift();
        assert_eq!(drift.len(), 1);
        assert_eq!(drift[0].reserved, 2);
        assert!(manager.take_drift().is_empty());
    }

    #[test]
    fn test_process_pending_is_bounded_and_round_robin() {
        let pool = FakePool::default();
        let mut manager = ReservationManager::new(&chain());
        for i in 0..5 {
            manager.reserve("net", "gear", 1, ItemId(i));
        }

        // Nothing is awaiting, but only two orders are looked at per call
        assert_eq!(manager.process_pending(&pool, 2).len(), 2);
        assert_eq!(manager.outstanding(), 3);
        let second: Vec<u64> = manager
            .process_pending(&pool, 2)
            .iter()
            .map(|o| o.id.0)
            .collect();
        assert_eq!(second, vec![3, 4]);
        assert_eq!(manager.process_pending(&pool, 2).len(), 1);
        assert_eq!(manager.outstanding(), 0);
    }

    #[test]
    fn test_rebuild_remaps_and_drops_orders() {
        let mut manager = ReservationManager::new(&chain());
        let keep = manager.reserve("net", "gear", 1, ItemId(1));
        manager.reserve("net", "gear", 3, ItemId(2));

        let new_chain =
            TierChain::build(&TierCatalog::linear(&["t0", "new", "t1", "t2"]), 0.0).unwrap();
        let dropped = manager.rebuild(&new_chain, |old| match old {
            1 => Some(2),
            _ => None,
        });
        assert_eq!(dropped.len(), 1);
        assert_eq!(manager.order(keep).unwrap().tier, 2);
        assert_eq!(manager.counts("net", "gear", 2).unwrap().reserved, 1);
    }
}
