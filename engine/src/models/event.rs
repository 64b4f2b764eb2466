//! Event logging for the observability sink.
//!
//! The engine never fails a batch because of a single item. Whatever went
//! wrong (a stale reference, a failed mutation, reservation drift) is
//! recorded here instead, together with the normal lifecycle of items and
//! epochs, so the host can render, count or persist it.
//!
//! # Event Types
//!
//! - **Registry**: item registered / unregistered
//! - **Transition**: tier change applied, deferred, or refused
//! - **Recovery**: stale references, mutation failures, reservation drift
//! - **Reservation**: order confirm / cancel / reclaim
//! - **Epoch**: full pass completed, chain rebuilt, resync
//!
//! # Example
//!
//! ```rust
//! use tier_ladder_engine::models::{Event, EventLog, ItemId};
//!
//! let mut log = EventLog::new();
//! log.log(Event::StaleReference { tick: 10, item_id: ItemId(4) });
//!
//! assert_eq!(log.events_of_type("StaleReference").len(), 1);
//! assert_eq!(log.events_for_item(ItemId(4)).len(), 1);
//! ```

use crate::models::item::ItemId;
use crate::reservation::OrderId;
use serde::Serialize;

/// Engine event capturing a state change or a recovered error.
///
/// All events include the tick they happened on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Event {
    /// Item entered tracking
    Registered {
        tick: u64,
        item_id: ItemId,
        kind: String,
        tier: String,
    },

    /// Item left tracking (destroyed, excluded, replaced, or terminal)
    Unregistered { tick: u64, item_id: ItemId },

    /// Host replaced the item synchronously with one on a higher tier
    Transitioned {
        tick: u64,
        item_id: ItemId,
        new_item_id: ItemId,
        kind: String,
        from: String,
        to: String,
    },

    /// Host accepted the transition but completes it out of band
    TransitionDeferred {
        tick: u64,
        item_id: ItemId,
        kind: String,
        from: String,
        to: String,
        order_id: Option<OrderId>,
    },

    /// Resource-gated mode found no unit for any reachable tier
    ReservationUnavailable {
        tick: u64,
        item_id: ItemId,
        kind: String,
        from: String,
        ceiling: String,
    },

    /// Item became invalid between scheduling and processing
    StaleReference { tick: u64, item_id: ItemId },

    /// Host mutation primitive failed; the item was dropped from tracking
    MutationFailure {
        tick: u64,
        item_id: ItemId,
        kind: String,
        from: String,
        to: String,
        reason: String,
    },

    /// Local reservation counts disagreed with the external snapshot
    ReservationDrift {
        tick: u64,
        pool: String,
        resource: String,
        tier: usize,
        available: u32,
        reserved: u32,
    },

    /// External signal confirmed an order
    OrderConfirmed {
        tick: u64,
        order_id: OrderId,
        item_id: ItemId,
    },

    /// External signal cancelled an order
    OrderCancelled {
        tick: u64,
        order_id: OrderId,
        item_id: ItemId,
    },

    /// Order reclaimed because its item stopped awaiting confirmation
    OrderReclaimed {
        tick: u64,
        order_id: OrderId,
        item_id: ItemId,
    },

    /// Scheduler cursor completed a full pass
    EpochComplete {
        tick: u64,
        epoch: u64,
        transitions: u32,
        pool: f64,
    },

    /// Tier chain rebuilt from a changed catalog
    ChainRebuilt {
        tick: u64,
        tiers: usize,
        dropped_items: usize,
    },

    /// Registry and pool rebuilt from a fresh enumeration
    Resynced { tick: u64, items: usize },
}

impl Event {
    /// Get the tick number when this event occurred
    pub fn tick(&self) -> u64 {
        match self {
            Event::Registered { tick, .. }
            | Event::Unregistered { tick, .. }
            | Event::Transitioned { tick, .. }
            | Event::TransitionDeferred { tick, .. }
            | Event::ReservationUnavailable { tick, .. }
            | Event::StaleReference { tick, .. }
            | Event::MutationFailure { tick, .. }
            | Event::ReservationDrift { tick, .. }
            | Event::OrderConfirmed { tick, .. }
            | Event::OrderCancelled { tick, .. }
            | Event::OrderReclaimed { tick, .. }
            | Event::EpochComplete { tick, .. }
            | Event::ChainRebuilt { tick, .. }
            | Event::Resynced { tick, .. } => *tick,
        }
    }

    /// Get a short description of the event type
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::Registered { .. } => "Registered",
            Event::Unregistered { .. } => "Unregistered",
            Event::Transitioned { .. } => "Transitioned",
            Event::TransitionDeferred { .. } => "TransitionDeferred",
            Event::ReservationUnavailable { .. } => "ReservationUnavailable",
            Event::StaleReference { .. } => "StaleReference",
            Event::MutationFailure { .. } => "MutationFailure",
            Event::ReservationDrift { .. } => "ReservationDrift",
            Event::OrderConfirmed { .. } => "OrderConfirmed",
            Event::OrderCancelled { .. } => "OrderCancelled",
            Event::OrderReclaimed { .. } => "OrderReclaimed",
            Event::EpochComplete { .. } => "EpochComplete",
            Event::ChainRebuilt { .. } => "ChainRebuilt",
            Event::Resynced { .. } => "Resynced",
        }
    }

    /// Get item ID if the event relates to a specific item
    pub fn item_id(&self) -> Option<ItemId> {
        match self {
            Event::Registered { item_id, .. }
            | Event::Unregistered { item_id, .. }
            | Event::Transitioned { item_id, .. }
            | Event::TransitionDeferred { item_id, .. }
            | Event::ReservationUnavailable { item_id, .. }
            | Event::StaleReference { item_id, .. }
            | Event::MutationFailure { item_id, .. }
            | Event::OrderConfirmed { item_id, .. }
            | Event::OrderCancelled { item_id, .. }
            | Event::OrderReclaimed { item_id, .. } => Some(*item_id),
            _ => None,
        }
    }
}

/// Event log for storing and querying engine events.
///
/// With a capacity limit the oldest events are discarded once the log is
/// full; [`dropped`](Self::dropped) counts them. Hosts that want every event
/// drain the log regularly.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<Event>,
    /// 0 = unbounded
    capacity: usize,
    dropped: u64,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log that keeps at most `capacity` events (0 = unbounded)
    pub fn with_capacity_limit(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    pub fn log(&mut self, event: Event) {
        if self.capacity > 0 && self.events.len() >= self.capacity {
            // Trim at least a tenth at once so a full log is not shifted on every push
            let excess = self.events.len() + 1 - self.capacity;
            let cut = excess.max(self.capacity / 10).min(self.events.len());
            self.events.drain(..cut);
            self.dropped += cut as u64;
        }
        self.events.push(event);
    }

    /// Events discarded because the log was full
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn events_at_tick(&self, tick: u64) -> Vec<&Event> {
        self.events.iter().filter(|e| e.tick() == tick).collect()
    }

    pub fn events_of_type(&self, event_type: &str) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    pub fn events_for_item(&self, item_id: ItemId) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.item_id() == Some(item_id))
            .collect()
    }

    /// Hand all buffered events to the host and empty the log
    pub fn drain(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_limit_discards_oldest() {
        let mut log = EventLog::with_capacity_limit(20);
        for tick in 0..50 {
            log.log(Event::StaleReference {
                tick,
                item_id: ItemId(tick),
            });
            assert!(log.len() <= 20);
        }
        assert_eq!(log.events().last().map(Event::tick), Some(49));
        assert_eq!(log.dropped() + log.len() as u64, 50);
        // Oldest survivors are contiguous with the newest
        let first = log.events()[0].tick();
        assert_eq!(first + log.len() as u64, 50);
    }

    #[test]
    fn test_unbounded_by_default() {
        let mut log = EventLog::new();
        for tick in 0..1000 {
            log.log(Event::StaleReference {
                tick,
                item_id: ItemId(tick),
            });
        }
        assert_eq!(log.len(), 1000);
        assert_eq!(log.dropped(), 0);
    }

    #[test]
    fn test_event_tick_and_type() {
        let event = Event::MutationFailure {
            tick: 42,
            item_id: ItemId(9),
            kind: "furnace".to_string(),
            from: "normal".to_string(),
            to: "uncommon".to_string(),
            reason: "blocked".to_string(),
        };
        assert_eq!(event.tick(), 42);
        assert_eq!(event.event_type(), "MutationFailure");
        assert_eq!(event.item_id(), Some(ItemId(9)));
    }

    #[test]
    fn test_epoch_events_have_no_item() {
        let event = Event::EpochComplete {
            tick: 5,
            epoch: 1,
            transitions: 3,
            pool: 0.5,
        };
        assert_eq!(event.item_id(), None);
    }

    #[test]
    fn test_drain_empties_log() {
        let mut log = EventLog::new();
        log.log(Event::Resynced { tick: 1, items: 4 });
        log.log(Event::StaleReference {
            tick: 2,
            item_id: ItemId(1),
        });

        let drained = log.drain();
        assert_eq!(drained.len(), 2);
        assert!(log.is_empty());
        assert_eq!(log.events_at_tick(2).len(), 0);
    }
}
