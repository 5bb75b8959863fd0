//! Quota Module
//!
//! Usage accounting against a fixed byte budget, and selection of entries
//! to evict when usage crosses the pressure threshold.

use crate::cache::CacheEntry;

// == Quota Report ==
/// Aggregate stored bytes relative to the budget.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuotaReport {
    /// Sum of `size_bytes` over all entries
    pub used_bytes: u64,
    /// Budget minus usage (saturating)
    pub available_bytes: u64,
    /// Usage as a percentage of budget, rounded to two decimals
    pub percentage: f64,
}

impl QuotaReport {
    /// Builds a report for `used_bytes` against `budget_bytes`.
    pub fn new(used_bytes: u64, budget_bytes: u64) -> Self {
        let percentage = if budget_bytes == 0 {
            100.0
        } else {
            let raw = used_bytes as f64 / budget_bytes as f64 * 100.0;
            (raw * 100.0).round() / 100.0
        };

        Self {
            used_bytes,
            available_bytes: budget_bytes.saturating_sub(used_bytes),
            percentage,
        }
    }

    /// Report for an empty store, used as the safe default.
    pub fn empty(budget_bytes: u64) -> Self {
        Self::new(0, budget_bytes)
    }

    /// Sums entry sizes into a report.
    pub fn measure<'a>(entries: impl IntoIterator<Item = &'a CacheEntry>, budget_bytes: u64) -> Self {
        let used = entries.into_iter().map(|e| e.size_bytes).sum();
        Self::new(used, budget_bytes)
    }

    pub fn is_under_pressure(&self, pressure_percent: f64) -> bool {
        self.percentage >= pressure_percent
    }
}

// == Eviction ==
/// Result of an eviction sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionOutcome {
    /// Number of entries removed
    pub removed: usize,
    /// Bytes released
    pub freed_bytes: u64,
}

/// Picks entries to evict from a scan ordered oldest first.
///
/// Walks the scan and takes every entry older than `max_age_ms` until usage
/// falls below `pressure_bytes`. Stops at the first entry that is young
/// enough, since everything after it is younger still.
pub fn select_evictions(
    entries: &[CacheEntry],
    now_ms: u64,
    max_age_ms: u64,
    pressure_bytes: u64,
) -> Vec<&CacheEntry> {
    let mut used: u64 = entries.iter().map(|e| e.size_bytes).sum();
    let mut victims = Vec::new();

    for entry in entries {
        if used < pressure_bytes || entry.age_ms(now_ms) <= max_age_ms {
            break;
        }
        used = used.saturating_sub(entry.size_bytes);
        victims.push(entry);
    }

    victims
}
