//! Cache Entry Module
//!
//! Defines the unit of storage: a codec payload plus the metadata used for
//! TTL, day-rollover and quota accounting.

use std::fmt;
use std::str::FromStr;

use crate::error::CacheError;

// == Codec Tier ==
/// Which codec path produced a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Plain serialized JSON
    Passthrough,
    /// Dictionary-compacted JSON
    Compacted,
}

impl Tier {
    /// Stable tag persisted alongside the payload.
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Passthrough => "passthrough",
            Tier::Compacted => "compacted",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "passthrough" => Ok(Tier::Passthrough),
            "compacted" => Ok(Tier::Compacted),
            other => Err(CacheError::Decode(format!("unknown codec tier: {other}"))),
        }
    }
}

// == Cache Entry ==
/// Represents a single stored record.
///
/// Entries are never updated in place; a `set` on an existing key replaces
/// the whole entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Caller-chosen identifier
    pub key: String,
    /// Codec output
    pub payload: String,
    /// Last write time (Unix milliseconds)
    pub written_at: u64,
    /// Day-of-month at write time (1..=31)
    pub day_stamp: u32,
    /// Codec format tag
    pub schema_version: String,
    /// Codec path used for `payload`
    pub tier: Tier,
    /// Byte length of `payload`
    pub size_bytes: u64,
    /// Time-to-live in milliseconds
    pub ttl_ms: u64,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new entry. `size_bytes` is always derived from `payload`.
    ///
    /// # Arguments
    /// * `key` - The key to store under
    /// * `payload` - Codec output
    /// * `tier` - Codec path that produced `payload`
    /// * `written_at` - Write time in Unix milliseconds
    /// * `day_stamp` - Day-of-month at write time
    /// * `ttl_ms` - Time-to-live in milliseconds
    pub fn new(
        key: String,
        payload: String,
        tier: Tier,
        written_at: u64,
        day_stamp: u32,
        ttl_ms: u64,
    ) -> Self {
        let size_bytes = payload.len() as u64;

        Self {
            key,
            payload,
            written_at,
            day_stamp,
            schema_version: crate::cache::codec::SCHEMA_VERSION.to_string(),
            tier,
            size_bytes,
            ttl_ms,
        }
    }

    // == Is Expired ==
    /// Checks if the TTL has elapsed at `now_ms`.
    ///
    /// Boundary condition: the entry is still live when exactly `ttl_ms` has
    /// elapsed and expires one millisecond later.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.age_ms(now_ms) > self.ttl_ms
    }

    /// Checks if the entry belongs to a calendar day other than `today`.
    pub fn is_stale_day(&self, today: u32) -> bool {
        self.day_stamp != today
    }

    /// Milliseconds since the entry was written.
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.written_at)
    }

    /// Returns remaining TTL in milliseconds (0 once expired).
    pub fn ttl_remaining_ms(&self, now_ms: u64) -> u64 {
        self.ttl_ms.saturating_sub(self.age_ms(now_ms))
    }
}
