//! Matchday Cache - A persistent local cache for sports data
//!
//! Best-effort key/value cache over SQLite with TTL expiration, calendar-day
//! invalidation, a compacting JSON codec and quota-driven eviction.

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod tasks;

pub use cache::{Cache, CacheEntry, CacheStats, EntryStore, QuotaReport};
pub use config::CacheConfig;
pub use error::{CacheError, Result};
pub use tasks::{spawn_sweep_task, DayTracker};
