//! Configuration Module
//!
//! Handles loading and managing cache configuration. The library takes a
//! `CacheConfig` value; only the runner binary reads environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Default storage budget (500 MiB).
pub const DEFAULT_QUOTA_BYTES: u64 = 500 * 1024 * 1024;

/// One day, the default TTL and eviction staleness threshold.
pub const ONE_DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Path of the SQLite database file
    pub db_path: PathBuf,
    /// Storage budget used for quota percentage
    pub quota_bytes: u64,
    /// Usage percentage at which `cleanup` starts evicting
    pub pressure_percent: f64,
    /// Entries older than this are eligible for eviction
    pub max_age: Duration,
    /// TTL applied when `set` is called without one
    pub default_ttl: Duration,
    /// Minimum array length for the compaction tier
    pub compact_min_len: usize,
    /// Interval of the day-change safety check
    pub safety_check_interval: Duration,
    /// Interval of the periodic cleanup task
    pub sweep_interval: Duration,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_DB_PATH` - SQLite file (default: matchday-cache.sqlite3)
    /// - `CACHE_QUOTA_BYTES` - Storage budget (default: 524288000)
    /// - `CACHE_PRESSURE_PERCENT` - Eviction trigger (default: 80)
    /// - `CACHE_MAX_AGE_SECS` - Eviction staleness threshold (default: 86400)
    /// - `CACHE_DEFAULT_TTL_SECS` - Default TTL (default: 86400)
    /// - `CACHE_COMPACT_MIN_LEN` - Compaction tier threshold (default: 10)
    /// - `CACHE_SAFETY_CHECK_SECS` - Day check interval (default: 3600)
    /// - `CACHE_SWEEP_INTERVAL_SECS` - Cleanup task interval (default: 600)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            db_path: env::var("CACHE_DB_PATH")
                .ok()
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            quota_bytes: parse_var("CACHE_QUOTA_BYTES").unwrap_or(defaults.quota_bytes),
            pressure_percent: parse_var("CACHE_PRESSURE_PERCENT")
                .unwrap_or(defaults.pressure_percent),
            max_age: parse_var("CACHE_MAX_AGE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.max_age),
            default_ttl: parse_var("CACHE_DEFAULT_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.default_ttl),
            compact_min_len: parse_var("CACHE_COMPACT_MIN_LEN")
                .unwrap_or(defaults.compact_min_len),
            safety_check_interval: parse_var("CACHE_SAFETY_CHECK_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.safety_check_interval),
            sweep_interval: parse_var("CACHE_SWEEP_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
        }
    }

    /// Byte count at which usage is considered under pressure.
    pub fn pressure_bytes(&self) -> u64 {
        (self.quota_bytes as f64 * self.pressure_percent / 100.0).ceil() as u64
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("matchday-cache.sqlite3"),
            quota_bytes: DEFAULT_QUOTA_BYTES,
            pressure_percent: 80.0,
            max_age: ONE_DAY,
            default_ttl: ONE_DAY,
            compact_min_len: 10,
            safety_check_interval: Duration::from_secs(60 * 60),
            sweep_interval: Duration::from_secs(600),
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}
