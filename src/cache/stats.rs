//! Cache Statistics Module
//!
//! Tracks how reads resolve and how much the cache has shed.

// == Cache Stats ==
/// Counters for cache activity since process start.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads that returned a value
    pub hits: u64,
    /// Reads that returned nothing, for any reason
    pub misses: u64,
    /// Misses caused by an elapsed TTL
    pub expirations: u64,
    /// Misses caused by an entry from another calendar day
    pub day_invalidations: u64,
    /// Misses caused by an undecodable payload
    pub decode_failures: u64,
    /// Entries removed by eviction sweeps
    pub evictions: u64,
    /// Day rollovers that flushed the store
    pub rollovers: u64,
    /// Storage failures swallowed by best-effort operations
    pub store_errors: u64,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no reads have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_expiration(&mut self) {
        self.expirations += 1;
        self.misses += 1;
    }

    pub fn record_day_invalidation(&mut self) {
        self.day_invalidations += 1;
        self.misses += 1;
    }

    pub fn record_decode_failure(&mut self) {
        self.decode_failures += 1;
        self.misses += 1;
    }

    pub fn record_evictions(&mut self, count: usize) {
        self.evictions += count as u64;
    }

    pub fn record_store_error(&mut self) {
        self.store_errors += 1;
    }
}
