//! Engine error types
//!
//! Only configuration problems are blocking. Per-item conditions (stale
//! references, mutation failures, reservation drift) never surface as
//! errors from a batch; they are recorded in the event log instead.

use crate::reservation::ReservationError;
use thiserror::Error;

/// Errors returned by engine construction and administrative operations
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    /// Tier catalog is missing links or is otherwise not a single chain.
    /// Scheduling must not begin.
    #[error("Tier catalog inconsistent: {0}")]
    ConfigInconsistency(String),

    /// Engine options out of range or unparsable
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Checkpoint (de)serialization failure
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Checkpoint does not satisfy registry or ledger invariants
    #[error("State validation error: {0}")]
    StateValidation(String),

    /// Reservation signal for an order the engine does not know about
    #[error("Reservation error: {0}")]
    Reservation(#[from] ReservationError),
}

/// Failure reported by the host's mutation primitive
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("mutation failed: {reason}")]
pub struct MutationError {
    /// Host-supplied description, forwarded to the event log
    pub reason: String,
}

impl MutationError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}
