//! Cache Facade
//!
//! `try_*` methods return a `Result`; the plain forms log the error and
//! return a safe default.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::codec::{Codec, SubstitutionTable};
use crate::cache::quota::{select_evictions, EvictionOutcome, QuotaReport};
use crate::cache::sqlite::SqliteStore;
use crate::cache::store::{EntryStore, MemoryStore};
use crate::cache::{CacheEntry, CacheStats};
use crate::clock::{Clock, SystemClock};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::tasks::DayTracker;

// == Cache ==
/// Persistent local cache. Clones share state.
#[derive(Clone)]
pub struct Cache {
    inner: Arc<CacheInner>,
}

struct CacheInner {
    store: Arc<dyn EntryStore>,
    clock: Arc<dyn Clock>,
    codec: Codec,
    tracker: DayTracker,
    config: CacheConfig,
    stats: Mutex<CacheStats>,
}

impl Cache {
    // == Constructors ==
    /// Creates a cache over `store` using the football field dictionary.
    pub fn new(store: Arc<dyn EntryStore>, clock: Arc<dyn Clock>, config: CacheConfig) -> Self {
        let codec = Codec::new(SubstitutionTable::football(), config.compact_min_len);
        Self::with_codec(store, clock, codec, config)
    }

    /// Creates a cache with a custom codec.
    pub fn with_codec(
        store: Arc<dyn EntryStore>,
        clock: Arc<dyn Clock>,
        codec: Codec,
        config: CacheConfig,
    ) -> Self {
        let tracker = DayTracker::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            config.safety_check_interval,
        );

        Self {
            inner: Arc::new(CacheInner {
                store,
                clock,
                codec,
                tracker,
                config,
                stats: Mutex::new(CacheStats::new()),
            }),
        }
    }

    /// SQLite-backed cache at `config.db_path` on the system clock.
    pub fn sqlite(config: CacheConfig) -> Self {
        let store = Arc::new(SqliteStore::new(config.db_path.clone()));
        Self::new(store, Arc::new(SystemClock), config)
    }

    /// Non-durable cache on the system clock.
    pub fn memory(config: CacheConfig) -> Self {
        Self::new(Arc::new(MemoryStore::new()), Arc::new(SystemClock), config)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    pub fn tracker(&self) -> &DayTracker {
        &self.inner.tracker
    }

    // == Lifecycle ==
    /// Opens the store and starts the day tracker. An unavailable store is
    /// logged and retried by later operations.
    pub async fn start(&self) {
        if let Err(e) = self.inner.store.open().await {
            warn!("Cache storage unavailable at startup: {}", e);
        }
        self.inner.tracker.start().await;
    }

    pub fn stop(&self) {
        self.inner.tracker.stop();
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = match self.inner.stats.lock() {
            Ok(stats) => stats.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        stats.rollovers = self.inner.tracker.rollover_count();
        stats
    }

    // == Get ==
    /// Day-stale, expired and undecodable entries are deleted and reported
    /// as misses. A value that does not fit `T` is an error; the entry stays.
    pub async fn try_get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let entry = match self.inner.store.get_raw(key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                self.record(CacheStats::record_miss);
                return Ok(None);
            }
            Err(CacheError::Decode(e)) => {
                warn!("Dropping unreadable entry {}: {}", key, e);
                self.discard(key).await;
                self.record(CacheStats::record_decode_failure);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let today = self.inner.clock.today();
        if entry.is_stale_day(today) {
            debug!("Entry {} is from day {}, today is {}", key, entry.day_stamp, today);
            self.discard(key).await;
            self.record(CacheStats::record_day_invalidation);
            if let Err(e) = self.inner.tracker.check_rollover().await {
                warn!("Day rollover after stale read failed: {}", e);
            }
            return Ok(None);
        }

        if entry.is_expired(self.inner.clock.now_ms()) {
            debug!("Entry {} expired", key);
            self.discard(key).await;
            self.record(CacheStats::record_expiration);
            return Ok(None);
        }

        let value = match self.inner.codec.decode_entry(&entry) {
            Ok(value) => value,
            Err(e) => {
                warn!("Dropping undecodable entry {}: {}", key, e);
                self.discard(key).await;
                self.record(CacheStats::record_decode_failure);
                return Ok(None);
            }
        };

        match serde_json::from_value(value) {
            Ok(value) => {
                self.record(CacheStats::record_hit);
                Ok(Some(value))
            }
            Err(e) => {
                self.record(CacheStats::record_miss);
                Err(CacheError::Decode(format!("{key}: {e}")))
            }
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let result = self.try_get(key).await;
        self.or_default("get", key, result, None)
    }

    // == Set ==
    /// Stores a value under `key`, replacing any previous entry.
    ///
    /// # Arguments
    /// * `key` - The key to store under
    /// * `value` - Any serializable value
    /// * `ttl` - Time-to-live (uses the configured default if None)
    pub async fn try_set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let value = serde_json::to_value(value).map_err(|e| CacheError::Encode(e.to_string()))?;
        let encoded = self.inner.codec.compress(&value)?;
        let ttl = ttl.unwrap_or(self.inner.config.default_ttl);

        let entry = CacheEntry::new(
            key.to_string(),
            encoded.payload,
            encoded.tier,
            self.inner.clock.now_ms(),
            self.inner.clock.today(),
            duration_ms(ttl),
        );
        debug!(
            "Storing {} ({} bytes, {}, ttl {:?})",
            key, entry.size_bytes, entry.tier, ttl
        );

        self.inner.store.put(entry).await
    }

    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Option<Duration>) -> bool {
        let result = self.try_set(key, value, ttl).await.map(|_| true);
        self.or_default("set", key, result, false)
    }

    // == Delete ==
    /// Removes an entry. Returns whether it existed.
    pub async fn try_delete(&self, key: &str) -> Result<bool> {
        self.inner.store.remove(key).await
    }

    /// Returns `true` unless the store failed, even for a missing key.
    pub async fn delete(&self, key: &str) -> bool {
        let result = self.try_delete(key).await.map(|_| true);
        self.or_default("delete", key, result, false)
    }

    // == Clear ==
    pub async fn try_clear(&self) -> Result<()> {
        self.inner.store.remove_all().await
    }

    pub async fn clear(&self) -> bool {
        let result = self.try_clear().await.map(|_| true);
        self.or_default("clear", "*", result, false)
    }

    // == Quota ==
    pub async fn try_quota(&self) -> Result<QuotaReport> {
        let entries = self.inner.store.scan().await?;
        Ok(QuotaReport::measure(&entries, self.inner.config.quota_bytes))
    }

    /// An unreadable store reports as empty.
    pub async fn get_quota(&self) -> QuotaReport {
        let result = self.try_quota().await;
        self.or_default("quota", "*", result, QuotaReport::empty(self.inner.config.quota_bytes))
    }

    // == Cleanup ==
    /// At or above the pressure threshold, removes entries older than the
    /// max age, oldest first, until usage drops below it.
    pub async fn try_cleanup(&self) -> Result<EvictionOutcome> {
        let config = &self.inner.config;
        let entries = self.inner.store.scan().await?;
        let report = QuotaReport::measure(&entries, config.quota_bytes);

        if !report.is_under_pressure(config.pressure_percent) {
            debug!("Cleanup skipped: usage at {}%", report.percentage);
            return Ok(EvictionOutcome::default());
        }

        let victims = select_evictions(
            &entries,
            self.inner.clock.now_ms(),
            duration_ms(config.max_age),
            config.pressure_bytes(),
        );

        let mut outcome = EvictionOutcome::default();
        for victim in victims {
            match self.inner.store.remove(&victim.key).await {
                Ok(true) => {
                    outcome.removed += 1;
                    outcome.freed_bytes += victim.size_bytes;
                }
                Ok(false) => {}
                Err(e) => {
                    self.record(|s| s.record_evictions(outcome.removed));
                    return Err(e);
                }
            }
        }

        self.record(|s| s.record_evictions(outcome.removed));
        info!(
            "Cleanup at {}% usage evicted {} entries ({} bytes)",
            report.percentage, outcome.removed, outcome.freed_bytes
        );
        Ok(outcome)
    }

    pub async fn cleanup(&self) -> bool {
        let result = self.try_cleanup().await.map(|_| true);
        self.or_default("cleanup", "*", result, false)
    }

    // == Helpers ==
    async fn discard(&self, key: &str) {
        if let Err(e) = self.inner.store.remove(key).await {
            warn!("Failed to remove invalid entry {}: {}", key, e);
            self.record(CacheStats::record_store_error);
        }
    }

    fn record(&self, f: impl FnOnce(&mut CacheStats)) {
        let mut stats = match self.inner.stats.lock() {
            Ok(stats) => stats,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut *stats);
    }

    fn or_default<T>(&self, op: &str, key: &str, result: Result<T>, default: T) -> T {
        match result {
            Ok(value) => value,
            Err(e) => {
                warn!("Cache {} for {} failed: {}", op, key, e);
                if e.is_storage() {
                    self.record(CacheStats::record_store_error);
                }
                default
            }
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
