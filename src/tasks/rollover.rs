//! Day Rollover Tracker
//!
//! Keeps track of the calendar day the cache belongs to and flushes the
//! store when the day changes. Two background tasks drive it: one fires at
//! every local midnight, the other re-checks the wall clock on a fixed
//! interval in case long timers were delayed (suspended laptops, throttled
//! background processes).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::cache::EntryStore;
use crate::clock::{duration_until_next_midnight, Clock};
use crate::error::Result;

// == Day Tracker ==
/// Tracks the current cache day and owns the rollover tasks.
///
/// Cloning is cheap; clones share state and tasks.
#[derive(Clone)]
pub struct DayTracker {
    inner: Arc<TrackerInner>,
}

struct TrackerInner {
    store: Arc<dyn EntryStore>,
    clock: Arc<dyn Clock>,
    safety_check_interval: Duration,
    day_tx: watch::Sender<u32>,
    rollovers: AtomicU64,
    /// Serializes rollovers so a day change flushes exactly once
    rollover_lock: tokio::sync::Mutex<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl DayTracker {
    // == Constructor ==
    /// Creates a tracker whose current day is read from `clock`.
    ///
    /// # Arguments
    /// * `store` - Store to flush on rollover and to hold the day marker
    /// * `clock` - Wall-clock source
    /// * `safety_check_interval` - Period of the fallback day check
    pub fn new(
        store: Arc<dyn EntryStore>,
        clock: Arc<dyn Clock>,
        safety_check_interval: Duration,
    ) -> Self {
        let (day_tx, _) = watch::channel(clock.today());

        Self {
            inner: Arc::new(TrackerInner {
                store,
                clock,
                safety_check_interval,
                day_tx,
                rollovers: AtomicU64::new(0),
                rollover_lock: tokio::sync::Mutex::new(()),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Day-of-month the cache currently belongs to.
    pub fn current_day(&self) -> u32 {
        *self.inner.day_tx.borrow()
    }

    /// Receiver that observes every rollover.
    pub fn subscribe(&self) -> watch::Receiver<u32> {
        self.inner.day_tx.subscribe()
    }

    /// Number of rollovers that flushed the store.
    pub fn rollover_count(&self) -> u64 {
        self.inner.rollovers.load(Ordering::Relaxed)
    }

    /// Compares the clock's day with the tracked day and flushes on change.
    ///
    /// Returns `true` if a rollover happened.
    pub async fn check_rollover(&self) -> Result<bool> {
        self.inner.check_rollover().await
    }

    // == Reconcile ==
    /// Compares the persisted day marker with today.
    ///
    /// Detects a day boundary crossed while the process was not running.
    /// A missing marker is written without flushing.
    pub async fn reconcile(&self) -> Result<bool> {
        let inner = &self.inner;
        let _guard = inner.rollover_lock.lock().await;
        let today = inner.clock.today();

        match inner.store.load_day_marker().await? {
            Some(day) if day != today => {
                info!("Cache last used on day {}, today is {}; flushing", day, today);
                inner.store.remove_all().await?;
                let saved = inner.store.save_day_marker(today).await;
                inner.rollovers.fetch_add(1, Ordering::Relaxed);
                inner.day_tx.send_replace(today);
                saved.map(|_| true)
            }
            Some(_) => Ok(false),
            None => {
                debug!("No day marker found, recording day {}", today);
                inner.store.save_day_marker(today).await?;
                Ok(false)
            }
        }
    }

    // == Start ==
    /// Reconciles with the persisted marker and spawns the midnight and
    /// safety-check tasks. Calling it again while running is a no-op.
    pub async fn start(&self) {
        if self.is_running() {
            return;
        }

        if let Err(e) = self.reconcile().await {
            warn!("Day marker reconciliation failed: {}", e);
        }

        let mut tasks = lock_tasks(&self.inner.tasks);
        if !tasks.is_empty() {
            return;
        }

        tasks.push(tokio::spawn(midnight_loop(Arc::clone(&self.inner))));
        tasks.push(tokio::spawn(safety_check_loop(Arc::clone(&self.inner))));
        info!(
            "Day tracker started on day {} (safety check every {:?})",
            self.current_day(),
            self.inner.safety_check_interval
        );
    }

    // == Stop ==
    /// Aborts both background tasks.
    pub fn stop(&self) {
        let mut tasks = lock_tasks(&self.inner.tasks);
        if tasks.is_empty() {
            return;
        }
        for handle in tasks.drain(..) {
            handle.abort();
        }
        info!("Day tracker stopped");
    }

    pub fn is_running(&self) -> bool {
        !lock_tasks(&self.inner.tasks).is_empty()
    }
}

impl TrackerInner {
    async fn check_rollover(&self) -> Result<bool> {
        let _guard = self.rollover_lock.lock().await;
        let today = self.clock.today();
        let current = *self.day_tx.borrow();

        if today == current {
            return Ok(false);
        }

        info!("Day changed: {} -> {}, flushing cache", current, today);
        self.store.remove_all().await?;

        let saved = self.store.save_day_marker(today).await;
        self.rollovers.fetch_add(1, Ordering::Relaxed);
        self.day_tx.send_replace(today);

        saved.map(|_| true)
    }

    async fn run_check(&self, source: &str) {
        if let Err(e) = self.check_rollover().await {
            warn!("Day rollover from {} failed: {}", source, e);
        }
    }
}

fn lock_tasks(tasks: &Mutex<Vec<JoinHandle<()>>>) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
    match tasks.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Sleeps until each local midnight, then checks for a rollover.
async fn midnight_loop(inner: Arc<TrackerInner>) {
    loop {
        let wait = duration_until_next_midnight(&inner.clock.now());
        debug!("Next midnight check in {:?}", wait);
        tokio::time::sleep(wait).await;

        inner.run_check("midnight timer").await;
    }
}

/// Compares the wall-clock day to the tracked day on a fixed interval.
async fn safety_check_loop(inner: Arc<TrackerInner>) {
    // interval() panics on a zero period
    let period = inner.safety_check_interval.max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;

        let tracked = *inner.day_tx.borrow();
        if inner.clock.today() != tracked {
            inner.run_check("safety check").await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheEntry, MemoryStore, Tier};
    use crate::clock::MockClock;

    const TEN_DAYS: Duration = Duration::from_secs(10 * 24 * 60 * 60);

    fn setup(start: &str, safety: Duration) -> (DayTracker, Arc<MemoryStore>, MockClock) {
        let clock = MockClock::from_rfc3339(start).unwrap();
        let store = Arc::new(MemoryStore::new());
        let tracker = DayTracker::new(store.clone(), Arc::new(clock.clone()), safety);
        (tracker, store, clock)
    }

    async fn seed(store: &MemoryStore, day: u32) {
        let entry = CacheEntry::new(
            "live_matches".to_string(),
            "[]".to_string(),
            Tier::Passthrough,
            0,
            day,
            60_000,
        );
        store.put(entry).await.unwrap();
    }

    #[tokio::test]
    async fn test_check_rollover_same_day_is_noop() {
        let (tracker, store, _clock) = setup("2024-05-14T10:00:00+00:00", TEN_DAYS);
        seed(&store, 14).await;

        assert!(!tracker.check_rollover().await.unwrap());
        assert_eq!(store.len().await, 1);
        assert_eq!(tracker.rollover_count(), 0);
    }

    #[tokio::test]
    async fn test_check_rollover_flushes_on_new_day() {
        let (tracker, store, clock) = setup("2024-05-14T23:59:00+00:00", TEN_DAYS);
        seed(&store, 14).await;

        clock.advance(Duration::from_secs(120));
        assert!(tracker.check_rollover().await.unwrap());
        assert!(!tracker.check_rollover().await.unwrap(), "second check is a no-op");

        assert!(store.is_empty().await);
        assert_eq!(tracker.current_day(), 15);
        assert_eq!(store.load_day_marker().await.unwrap(), Some(15));
        assert_eq!(tracker.rollover_count(), 1);
    }

    #[tokio::test]
    async fn test_reconcile_flushes_stale_marker() {
        let (tracker, store, _clock) = setup("2024-05-14T08:00:00+00:00", TEN_DAYS);
        store.save_day_marker(13).await.unwrap();
        seed(&store, 13).await;

        assert!(tracker.reconcile().await.unwrap());
        assert!(store.is_empty().await);
        assert_eq!(store.load_day_marker().await.unwrap(), Some(14));
    }

    #[tokio::test]
    async fn test_reconcile_writes_missing_marker() {
        let (tracker, store, _clock) = setup("2024-05-14T08:00:00+00:00", TEN_DAYS);
        seed(&store, 14).await;

        assert!(!tracker.reconcile().await.unwrap());
        assert_eq!(store.len().await, 1);
        assert_eq!(store.load_day_marker().await.unwrap(), Some(14));
    }

    #[tokio::test(start_paused = true)]
    async fn test_midnight_task_flushes() {
        let (tracker, store, clock) = setup("2024-05-14T23:00:00+00:00", TEN_DAYS);
        seed(&store, 14).await;
        let mut rx = tracker.subscribe();

        tracker.start().await;
        clock.advance(Duration::from_secs(2 * 60 * 60));

        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), 15);
        assert!(store.is_empty().await);
        assert_eq!(store.load_day_marker().await.unwrap(), Some(15));

        tracker.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_midnight_task_rearms() {
        let (tracker, store, clock) = setup("2024-05-14T23:00:00+00:00", TEN_DAYS);
        seed(&store, 14).await;
        let mut rx = tracker.subscribe();

        tracker.start().await;

        clock.advance(Duration::from_secs(2 * 60 * 60));
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), 15);
        assert_eq!(tracker.rollover_count(), 1);

        seed(&store, 15).await;
        clock.advance(Duration::from_secs(24 * 60 * 60));
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), 16);

        assert_eq!(tracker.rollover_count(), 2);
        assert!(store.is_empty().await);
        assert_eq!(store.load_day_marker().await.unwrap(), Some(16));

        tracker.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_safety_check_catches_missed_midnight() {
        let (tracker, store, clock) = setup("2024-05-14T10:00:00+00:00", Duration::from_secs(3_600));
        seed(&store, 14).await;
        let mut rx = tracker.subscribe();

        tracker.start().await;
        let started = tokio::time::Instant::now();

        // Wall clock jumps a day while timers did not run
        clock.advance(Duration::from_secs(24 * 60 * 60));

        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), 15);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(3_600));
        assert!(elapsed < Duration::from_secs(2 * 3_600), "midnight timer was not needed");
        assert!(store.is_empty().await);

        tracker.stop();
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let (tracker, _store, _clock) = setup("2024-05-14T10:00:00+00:00", TEN_DAYS);
        assert!(!tracker.is_running());

        tracker.start().await;
        tracker.start().await;
        assert!(tracker.is_running());

        tracker.stop();
        assert!(!tracker.is_running());
    }
}
