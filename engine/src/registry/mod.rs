//! Item Registry
//!
//! Owns the tracked-item set with O(1) register, unregister and lookup.
//!
//! # Layout
//!
//! Items live in a dense `Vec` with a `HashMap<ItemId, usize>` index, the
//! usual swap-to-end slot map. The vector is also the scheduler's scan
//! order, split into three regions by the epoch cursor:
//!
//! ```text
//! [0, cursor)           visited this epoch
//! [cursor, epoch_end)   still pending this epoch
//! [epoch_end, len)      registered during this epoch, first visited next epoch
//! ```
//!
//! Removal fills the hole from the end of the hole's own region and then
//! cascades one slot to the right per region boundary, so every element stays
//! in its region. When the removed index is inside the visited region the
//! cursor moves back by one: the freed visited slot becomes the pending slot
//! that the swapped-in element occupies, so it is neither skipped nor
//! visited twice.
//!
//! # Critical Invariants
//!
//! 1. `items.len() == index.len()`
//! 2. `index[items[i].id] == i` for every `i`
//! 3. No id appears twice in `items`
//! 4. `cursor <= epoch_end <= items.len()`

use crate::models::{Category, ItemId, TrackedItem};
use std::collections::HashMap;

/// Tracked-item set plus the scheduler's epoch cursor
#[derive(Debug, Clone, Default)]
pub struct Registry {
    items: Vec<TrackedItem>,
    index: HashMap<ItemId, usize>,
    producer_count: usize,
    consumer_count: usize,
    /// Next position to visit in the current epoch
    cursor: usize,
    /// End of the pending region for the current epoch
    epoch_end: usize,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an item
    ///
    /// Idempotent: if the id is already tracked the existing entry is
    /// returned untouched together with `false`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use tier_ladder_engine::models::{Category, ItemId, TrackedItem};
    /// use tier_ladder_engine::Registry;
    ///
    /// let mut registry = Registry::new();
    /// let item = TrackedItem::new(ItemId(1), "inserter", Category::Consumer, 0, 0.01);
    ///
    /// let (_, inserted) = registry.register(item.clone());
    /// assert!(inserted);
    /// let (_, inserted) = registry.register(item);
    /// assert!(!inserted);
    /// assert_eq!(registry.count(), 1);
    /// ```
    pub fn register(&mut self, item: TrackedItem) -> (&TrackedItem, bool) {
        if let Some(&idx) = self.index.get(&item.id()) {
            return (&self.items[idx], false);
        }

        match item.category() {
            Category::Producer => self.producer_count += 1,
            Category::Consumer => self.consumer_count += 1,
        }
        let idx = self.items.len();
        self.index.insert(item.id(), idx);
        self.items.push(item);
        (&self.items[idx], true)
    }

    /// Unregister an item, returning it if it was tracked
    pub fn unregister(&mut self, id: ItemId) -> Option<TrackedItem> {
        let mut hole = *self.index.get(&id)?;

        if hole < self.cursor {
            let boundary = self.cursor - 1;
            self.swap_slots(hole, boundary);
            hole = boundary;
            self.cursor -= 1;
        }
        if hole < self.epoch_end {
            let boundary = self.epoch_end - 1;
            self.swap_slots(hole, boundary);
            hole = boundary;
            self.epoch_end -= 1;
        }
        let last = self.items.len() - 1;
        self.swap_slots(hole, last);

        let removed = self.items.pop()?;
        self.index.remove(&id);
        match removed.category() {
            Category::Producer => self.producer_count -= 1,
            Category::Consumer => self.consumer_count -= 1,
        }
        Some(removed)
    }

    /// Swap two slots and fix both index entries
    fn swap_slots(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        self.items.swap(a, b);
        self.index.insert(self.items[a].id(), a);
        self.index.insert(self.items[b].id(), b);
    }

    pub fn get(&self, id: ItemId) -> Option<&TrackedItem> {
        self.index.get(&id).map(|&idx| &self.items[idx])
    }

    pub fn get_mut(&mut self, id: ItemId) -> Option<&mut TrackedItem> {
        match self.index.get(&id) {
            Some(&idx) => Some(&mut self.items[idx]),
            None => None,
        }
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn count(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn producer_count(&self) -> usize {
        self.producer_count
    }

    pub fn consumer_count(&self) -> usize {
        self.consumer_count
    }

    /// Items in scan order
    pub fn iter(&self) -> impl Iterator<Item = &TrackedItem> {
        self.items.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut TrackedItem> {
        self.items.iter_mut()
    }

    // ========================================================================
    // Epoch cursor
    // ========================================================================

    /// Start a new pass over everything currently registered
    pub fn begin_epoch(&mut self) {
        self.cursor = 0;
        self.epoch_end = self.items.len();
    }

    /// Id at the cursor, advancing past it; `None` once the epoch is exhausted
    pub fn next_in_epoch(&mut self) -> Option<ItemId> {
        if self.cursor >= self.epoch_end {
            return None;
        }
        let id = self.items[self.cursor].id();
        self.cursor += 1;
        Some(id)
    }

    pub fn epoch_exhausted(&self) -> bool {
        self.cursor >= self.epoch_end
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn epoch_end(&self) -> usize {
        self.epoch_end
    }

    /// Restore cursor positions from a checkpoint
    ///
    /// Positions are clamped so the cursor invariant holds even for a
    /// hand-edited snapshot.
    pub fn restore_cursor(&mut self, cursor: usize, epoch_end: usize) {
        self.epoch_end = epoch_end.min(self.items.len());
        self.cursor = cursor.min(self.epoch_end);
    }

    /// Drop everything (administrative resync)
    pub fn clear(&mut self) {
        self.items.clear();
        self.index.clear();
        self.producer_count = 0;
        self.consumer_count = 0;
        self.cursor = 0;
        self.epoch_end = 0;
    }

    /// Check the structural invariants; used by tests and checkpoint restore
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.items.len() != self.index.len() {
            return Err(format!(
                "array length {} != index length {}",
                self.items.len(),
                self.index.len()
            ));
        }
        for (i, item) in self.items.iter().enumerate() {
            if self.index.get(&item.id()) != Some(&i) {
                return Err(format!("index entry for {} does not point at slot {}", item.id(), i));
            }
        }
        if !(self.cursor <= self.epoch_end && self.epoch_end <= self.items.len()) {
            return Err(format!(
                "cursor {} / epoch_end {} out of bounds for {} items",
                self.cursor,
                self.epoch_end,
                self.items.len()
            ));
        }
        let producers = self.items.iter().filter(|i| i.is_producer()).count();
        if producers != self.producer_count
            || self.items.len() - producers != self.consumer_count
        {
            return Err("category counters out of sync".to_string());
        }
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
