//! Cache Module
//!
//! Persistent local cache with TTL expiration, calendar-day invalidation,
//! a compacting codec and quota-driven eviction.

pub mod codec;
mod entry;
mod facade;
pub mod quota;
mod sqlite;
mod stats;
mod store;


// Re-export public types
pub use codec::{Codec, SubstitutionTable};
pub use entry::{CacheEntry, Tier};
pub use facade::Cache;
pub use quota::{EvictionOutcome, QuotaReport};
pub use sqlite::SqliteStore;
pub use stats::CacheStats;
pub use store::{EntryStore, MemoryStore};
