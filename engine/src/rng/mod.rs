//! Seeded randomness for the scheduler
//!
//! The scheduler owns exactly one [`RngManager`]; its state is part of every
//! checkpoint.

mod xorshift;

pub use xorshift::RngManager;
