//! Tier Ladder Engine
//!
//! Amortized, probabilistic tier advancement for large dynamic populations
//! of tracked items, with deterministic execution.
//!
//! # Architecture
//!
//! - **core**: Cycle clock
//! - **models**: Domain types (TrackedItem, TierChain, Event)
//! - **registry**: O(1) tracked-item set with the epoch scan cursor
//! - **credit**: Producer work to consumer attempts
//! - **transition**: Attempt resolution, pity, bucket tables
//! - **reservation**: Resource-gated bookkeeping
//! - **scheduler**: Main batch loop and checkpointing
//! - **host**: Traits for the outside world, plus an in-memory host
//! - **rng**: Deterministic random number generation
//!
//! # Critical Invariants
//!
//! 1. All randomness is deterministic (seeded RNG)
//! 2. The credit pool never goes negative
//! 3. Every tracked item is visited exactly once per epoch
//! 4. Reservations can undercount availability but never over-allocate

// Module declarations
pub mod config;
pub mod core;
pub mod credit;
pub mod error;
pub mod host;
pub mod models;
pub mod profiler;
pub mod registry;
pub mod reservation;
pub mod rng;
pub mod scheduler;
pub mod telemetry;
pub mod transition;

// Re-exports for convenience
pub use config::{AccumulationRate, EngineConfig, ProfilingConfig, ProfilingDetail};
pub use core::CycleClock;
pub use credit::{Accrual, CreditLedger};
pub use error::{EngineError, MutationError};
pub use host::{
    EpochSummary, Host, InMemoryHost, ItemSource, MetricSource, MutationOutcome, Mutator,
    NotificationSink, ResourceQuery,
};
pub use models::{
    Category, Event, EventLog, ItemId, ItemObservation, Tier, TierCatalog, TierChain,
    TierDefinition, TrackedItem,
};
pub use registry::Registry;
pub use reservation::{Order, OrderId, ReservationError, ReservationManager};
pub use rng::RngManager;
pub use scheduler::{BatchScheduler, EngineStats, StateSnapshot, TickResult};
pub use transition::{AttemptOutcome, Resolution, TransitionEngine, TransitionState};
