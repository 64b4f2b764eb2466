//! Time management

pub mod time;

pub use time::CycleClock;
