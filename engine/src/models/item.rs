//! Tracked items
//!
//! A tracked item is the engine's view of one host entity that can climb the
//! tier ladder. Producers carry their own work metric; consumers only ever
//! receive attempts from the shared credit pool.

use crate::reservation::OrderId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable host-assigned identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(pub u64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Item family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Exposes a monotonically increasing work counter
    Producer,
    /// Draws attempts from the credit pool
    Consumer,
}

/// What the host reports about an entity when it is created, cloned or
/// enumerated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemObservation {
    pub id: ItemId,
    /// Host entity or resource name (e.g. the prototype name)
    pub kind: String,
    pub category: Category,
    /// Current tier, by name
    pub tier_name: String,
}

impl ItemObservation {
    pub fn new(id: u64, kind: &str, category: Category, tier_name: &str) -> Self {
        Self {
            id: ItemId(id),
            kind: kind.to_string(),
            category,
            tier_name: tier_name.to_string(),
        }
    }
}

/// Per-item scheduling state
///
/// # Example
/// ```
/// use tier_ladder_engine::models::{Category, ItemId, TrackedItem};
///
/// let item = TrackedItem::new(ItemId(7), "assembler", Category::Producer, 0, 0.01);
/// assert_eq!(item.transition_chance(), 0.01);
/// assert!(item.is_producer());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedItem {
    id: ItemId,
    kind: String,
    category: Category,
    /// Ordinal into the current TierChain
    tier: usize,
    /// Base chance plus accumulated pity, as a fraction (0.01 = 1%)
    transition_chance: f64,
    /// Last observed host work counter (producers only)
    metric_baseline: f64,
    /// Work below one threshold crossing, carried to the next accrual
    work_carry: f64,
    /// Attempt units spent on this item (diagnostic)
    attempts: u64,
    /// Set while an external transition is in flight
    pending: bool,
    /// Reservation backing the in-flight transition (resource-gated mode)
    pending_order: Option<OrderId>,
}

impl TrackedItem {
    pub fn new(id: ItemId, kind: &str, category: Category, tier: usize, chance: f64) -> Self {
        Self {
            id,
            kind: kind.to_string(),
            category,
            tier,
            transition_chance: chance,
            metric_baseline: 0.0,
            work_carry: 0.0,
            attempts: 0,
            pending: false,
            pending_order: None,
        }
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn is_producer(&self) -> bool {
        self.category == Category::Producer
    }

    pub fn tier(&self) -> usize {
        self.tier
    }

    pub fn transition_chance(&self) -> f64 {
        self.transition_chance
    }

    pub fn metric_baseline(&self) -> f64 {
        self.metric_baseline
    }

    pub fn work_carry(&self) -> f64 {
        self.work_carry
    }

    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    pub fn pending_order(&self) -> Option<OrderId> {
        self.pending_order
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub(crate) fn set_tier(&mut self, tier: usize) {
        self.tier = tier;
    }

    pub(crate) fn set_transition_chance(&mut self, chance: f64) {
        self.transition_chance = chance;
    }

    pub(crate) fn set_metric_baseline(&mut self, baseline: f64) {
        self.metric_baseline = baseline;
    }

    pub(crate) fn set_work_carry(&mut self, carry: f64) {
        self.work_carry = carry;
    }

    pub(crate) fn add_attempts(&mut self, attempts: u64) {
        self.attempts += attempts;
    }

    /// Mark the item as awaiting an external transition
    pub(crate) fn set_pending(&mut self, order: Option<OrderId>) {
        self.pending = true;
        self.pending_order = order;
    }

    pub(crate) fn clear_pending(&mut self) {
        self.pending = false;
        self.pending_order = None;
    }

    /// Rebuild an item from checkpointed fields
    #[allow(clippy::too_many_arguments)]
    pub fn from_snapshot(
        id: ItemId,
        kind: String,
        category: Category,
        tier: usize,
        transition_chance: f64,
        metric_baseline: f64,
        work_carry: f64,
        attempts: u64,
        pending: bool,
        pending_order: Option<OrderId>,
    ) -> Self {
        Self {
            id,
            kind,
            category,
            tier,
            transition_chance,
            metric_baseline,
            work_carry,
            attempts,
            pending: pending || pending_order.is_some(),
            pending_order,
        }
    }
}
