//! Eviction Sweep Task
//!
//! Background task that periodically runs the cache's quota cleanup.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::Cache;

/// Shortest accepted interval between sweeps.
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Spawns a background task that runs `Cache::try_cleanup` on an interval.
///
/// The task runs in an infinite loop, sleeping for the specified interval
/// between sweeps. A failed sweep is logged and retried on the next tick.
/// Intervals below [`MIN_SWEEP_INTERVAL`] are raised to it.
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during shutdown.
///
/// # Example
/// ```ignore
/// let cache = Cache::sqlite(CacheConfig::default());
/// let sweep_handle = spawn_sweep_task(cache.clone(), Duration::from_secs(600));
/// // Later, during shutdown:
/// sweep_handle.abort();
/// ```
pub fn spawn_sweep_task(cache: Cache, interval: Duration) -> JoinHandle<()> {
    let interval = interval.max(MIN_SWEEP_INTERVAL);

    tokio::spawn(async move {
        info!("Starting eviction sweep task with interval of {:?}", interval);

        loop {
            tokio::time::sleep(interval).await;

            match cache.try_cleanup().await {
                Ok(outcome) if outcome.removed > 0 => {
                    info!(
                        "Eviction sweep: removed {} entries ({} bytes)",
                        outcome.removed, outcome.freed_bytes
                    );
                }
                Ok(_) => debug!("Eviction sweep: nothing to remove"),
                Err(e) => warn!("Eviction sweep failed: {}", e),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::cache::MemoryStore;
    use crate::clock::MockClock;
    use crate::config::CacheConfig;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    #[tokio::test(start_paused = true)]
    async fn test_sweep_task_evicts_under_pressure() {
        let clock = MockClock::from_rfc3339("2024-05-14T10:00:00+00:00").unwrap();
        let store = Arc::new(MemoryStore::new());
        let config = CacheConfig {
            quota_bytes: 100,
            ..CacheConfig::default()
        };
        let cache = Cache::new(store.clone(), Arc::new(clock.clone()), config);

        cache.set("old", &"x".repeat(90), Some(DAY * 7)).await;
        clock.advance(DAY * 2);

        let handle = spawn_sweep_task(cache.clone(), Duration::from_secs(1));
        tokio::time::sleep(Duration::from_millis(1_500)).await;

        assert!(store.is_empty().await, "stale entry should have been swept");
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_task_preserves_entries_below_pressure() {
        let clock = MockClock::from_rfc3339("2024-05-14T10:00:00+00:00").unwrap();
        let store = Arc::new(MemoryStore::new());
        let cache = Cache::new(store.clone(), Arc::new(clock.clone()), CacheConfig::default());

        cache.set("old", "value", Some(DAY * 7)).await;
        clock.advance(DAY * 2);

        let handle = spawn_sweep_task(cache, Duration::from_secs(1));
        tokio::time::sleep(Duration::from_millis(1_500)).await;

        assert_eq!(store.len().await, 1);
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_is_clamped() {
        let clock = MockClock::from_rfc3339("2024-05-14T10:00:00+00:00").unwrap();
        let store = Arc::new(MemoryStore::new());
        let config = CacheConfig {
            quota_bytes: 100,
            ..CacheConfig::default()
        };
        let cache = Cache::new(store.clone(), Arc::new(clock.clone()), config);

        cache.set("old", &"x".repeat(90), Some(DAY * 7)).await;
        clock.advance(DAY * 2);

        let handle = spawn_sweep_task(cache, Duration::ZERO);
        tokio::time::sleep(MIN_SWEEP_INTERVAL / 2).await;
        assert_eq!(store.len().await, 1, "no sweep before the minimum interval");

        tokio::time::sleep(MIN_SWEEP_INTERVAL).await;
        assert!(store.is_empty().await);
        handle.abort();
    }

    #[tokio::test]
    async fn test_sweep_task_can_be_aborted() {
        let cache = Cache::memory(CacheConfig::default());

        let handle = spawn_sweep_task(cache, Duration::from_secs(1));
        handle.abort();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_finished(), "Task should be finished after abort");
    }
}
