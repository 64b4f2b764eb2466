//! Batch scheduler - the engine's main loop
//!
//! See `engine.rs` for the tick loop and `checkpoint.rs` for save/restore.

pub mod checkpoint;
pub mod engine;

pub use checkpoint::{ItemSnapshot, OrderSnapshot, StateSnapshot};
pub use engine::{BatchScheduler, EngineStats, TickResult};
