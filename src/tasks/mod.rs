//! Background Tasks Module
//!
//! Contains background tasks that run for the life of the process.
//!
//! # Tasks
//! - Day rollover: flushes the cache at local midnight, with an interval
//!   safety check
//! - Eviction sweep: runs quota cleanup at a configured interval

mod rollover;
mod sweep;

pub use rollover::DayTracker;
pub use sweep::spawn_sweep_task;
