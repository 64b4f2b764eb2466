//! Domain models for the tier ladder engine

pub mod event;
pub mod item;
pub mod tier;

// Re-exports
pub use event::{Event, EventLog};
pub use item::{Category, ItemId, ItemObservation, TrackedItem};
pub use tier::{Tier, TierCatalog, TierChain, TierDefinition};
