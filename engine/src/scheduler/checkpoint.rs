//! Checkpoint - Save/Load Engine State
//!
//! Serializes the logical engine state so a host can persist it with its own
//! save data and resume scheduling exactly where it stopped.
//!
//! Tiers are stored by name, never by ordinal, so a snapshot survives
//! serialization round-trips of the catalog. The reservation availability
//! snapshot is not stored; it is re-populated from the external pools on the
//! first lookup after restore.
//!
//! # Critical Invariants
//!
//! - **Determinism**: restoring and continuing yields the same draws as never
//!   having stopped (RNG state, registry order and cursor are preserved)
//! - **Registry Integrity**: no duplicate ids, cursor within bounds
//! - **Ledger Integrity**: pool is finite and non-negative
//! - **Config Matching**: state can only be loaded with the config and
//!   catalog that produced it

use crate::error::EngineError;
use crate::host::EpochSummary;
use crate::models::{Category, ItemId, TierChain, TrackedItem};
use crate::reservation::{Order, OrderId};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;

// ============================================================================
// Snapshot Structures
// ============================================================================

/// Complete scheduler state snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Unique id of this snapshot (uuid v4)
    pub snapshot_id: String,

    /// Tick the next `tick()` call will run
    pub current_tick: u64,

    /// Epochs completed so far
    pub epoch: u64,

    /// RNG state at time of snapshot (CRITICAL for determinism)
    pub rng_state: u64,

    /// Tracked items in registry order
    pub items: Vec<ItemSnapshot>,

    pub cursor: usize,
    pub epoch_end: usize,

    pub credit_pool: f64,

    /// Consumers per producer cached at the start of the epoch
    pub credit_ratio: f64,

    /// Transitions tallied for the epoch in progress
    pub epoch_tally: EpochSummary,

    /// Outstanding reservation orders (resource-gated mode)
    pub orders: Vec<OrderSnapshot>,
    pub next_order_id: u64,

    /// SHA256 hash of config and tier catalog (for validation)
    pub config_hash: String,
}

/// Tracked item snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSnapshot {
    pub id: ItemId,
    pub kind: String,
    pub category: Category,
    pub tier: String,
    pub transition_chance: f64,
    pub metric_baseline: f64,
    pub work_carry: f64,
    pub attempts: u64,
    pub pending: bool,
    pub pending_order: Option<OrderId>,
}

impl ItemSnapshot {
    pub fn capture(item: &TrackedItem, chain: &TierChain) -> Self {
        ItemSnapshot {
            id: item.id(),
            kind: item.kind().to_string(),
            category: item.category(),
            tier: chain.name_of(item.tier()).to_string(),
            transition_chance: item.transition_chance(),
            metric_baseline: item.metric_baseline(),
            work_carry: item.work_carry(),
            attempts: item.attempts(),
            pending: item.is_pending(),
            pending_order: item.pending_order(),
        }
    }

    /// Rebuild the item against `chain`; `None` if the tier is unknown
    pub fn restore(self, chain: &TierChain) -> Option<TrackedItem> {
        let tier = chain.ordinal_of(&self.tier)?;
        Some(TrackedItem::from_snapshot(
            self.id,
            self.kind,
            self.category,
            tier,
            self.transition_chance,
            self.metric_baseline,
            self.work_carry,
            self.attempts,
            self.pending,
            self.pending_order,
        ))
    }
}

/// Reservation order snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub id: OrderId,
    pub item_id: ItemId,
    pub pool: String,
    pub resource: String,
    pub tier: String,
}

impl OrderSnapshot {
    pub fn capture(order: &Order, chain: &TierChain) -> Self {
        OrderSnapshot {
            id: order.id,
            item_id: order.item_id,
            pool: order.pool.clone(),
            resource: order.resource.clone(),
            tier: chain.name_of(order.tier).to_string(),
        }
    }

    pub fn restore(self, chain: &TierChain) -> Option<Order> {
        let tier = chain.ordinal_of(&self.tier)?;
        Some(Order {
            id: self.id,
            item_id: self.item_id,
            pool: self.pool,
            resource: self.resource,
            tier,
        })
    }
}

impl StateSnapshot {
    pub fn to_json(&self) -> Result<String, EngineError> {
        serde_json::to_string(self)
            .map_err(|e| EngineError::Serialization(format!("Snapshot serialization failed: {}", e)))
    }

    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        serde_json::from_str(json)
            .map_err(|e| EngineError::Serialization(format!("Snapshot parse failed: {}", e)))
    }
}

/// Fresh snapshot id
pub(crate) fn new_snapshot_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// ============================================================================
// Config Hashing
// ============================================================================

/// Compute deterministic SHA256 hash of config
///
/// Uses canonical JSON serialization with sorted keys so the hash does not
/// depend on map iteration order.
pub fn compute_config_hash<T: Serialize>(config: &T) -> Result<String, EngineError> {
    use serde_json::Value;
    use std::collections::BTreeMap;

    let value = serde_json::to_value(config).map_err(|e| {
        EngineError::Serialization(format!("Config serialization failed: {}", e))
    })?;

    fn canonicalize(value: Value) -> Value {
        match value {
            Value::Object(map) => {
                let sorted: BTreeMap<String, Value> =
                    map.into_iter().map(|(k, v)| (k, canonicalize(v))).collect();
                Value::Object(sorted.into_iter().collect())
            }
            Value::Array(arr) => Value::Array(arr.into_iter().map(canonicalize).collect()),
            other => other,
        }
    }

    let json = serde_json::to_string(&canonicalize(value)).map_err(|e| {
        EngineError::Serialization(format!("Config serialization failed: {}", e))
    })?;

    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

// ============================================================================
// Validation Functions
// ============================================================================

/// Validate state snapshot integrity against the chain it will be loaded into
///
/// Orders may reference items that are no longer tracked; those are
/// reclaimed by the pending scan once the host reports them as not awaiting.
pub fn validate_snapshot(snapshot: &StateSnapshot, chain: &TierChain) -> Result<(), EngineError> {
    // 1. Registry uniqueness
    let mut seen = HashSet::new();
    for item in &snapshot.items {
        if !seen.insert(item.id) {
            return Err(EngineError::StateValidation(format!(
                "Duplicate item {} in registry",
                item.id
            )));
        }
        if chain.ordinal_of(&item.tier).is_none() {
            return Err(EngineError::StateValidation(format!(
                "Item {} on unknown tier {}",
                item.id, item.tier
            )));
        }
    }

    // 2. Cursor bounds
    if !(snapshot.cursor <= snapshot.epoch_end && snapshot.epoch_end <= snapshot.items.len()) {
        return Err(EngineError::StateValidation(format!(
            "Cursor {} / epoch end {} out of bounds for {} items",
            snapshot.cursor,
            snapshot.epoch_end,
            snapshot.items.len()
        )));
    }

    // 3. Pool
    if !(snapshot.credit_pool.is_finite() && snapshot.credit_pool >= 0.0) {
        return Err(EngineError::StateValidation(format!(
            "Credit pool must be finite and non-negative, got {}",
            snapshot.credit_pool
        )));
    }

    if !(snapshot.credit_ratio.is_finite() && snapshot.credit_ratio >= 0.0) {
        return Err(EngineError::StateValidation(format!(
            "Credit ratio must be finite and non-negative, got {}",
            snapshot.credit_ratio
        )));
    }

    // 4. Orders
    let mut order_ids = HashSet::new();
    for order in &snapshot.orders {
        if !order_ids.insert(order.id) {
            return Err(EngineError::StateValidation(format!(
                "Duplicate order {}",
                order.id
            )));
        }
        if chain.ordinal_of(&order.tier).is_none() {
            return Err(EngineError::StateValidation(format!(
                "Order {} on unknown tier {}",
                order.id, order.tier
            )));
        }
    }

    Ok(())
}
