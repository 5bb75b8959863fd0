//! Clock Module
//!
//! Wall-clock abstraction so TTL, day-rollover and eviction can run against
//! real local time in production and a controlled clock in tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Datelike, FixedOffset, Local};

// == Clock Trait ==
/// Source of local wall-clock time.
pub trait Clock: Send + Sync + 'static {
    /// Current local date and time
    fn now(&self) -> DateTime<FixedOffset>;

    /// Milliseconds since UNIX epoch
    fn now_ms(&self) -> u64 {
        self.now().timestamp_millis().max(0) as u64
    }

    /// Calendar day-of-month (1..=31)
    fn today(&self) -> u32 {
        self.now().day()
    }
}

impl<T: Clock> Clock for Arc<T> {
    fn now(&self) -> DateTime<FixedOffset> {
        (**self).now()
    }
}

// == System Clock ==
/// Real local clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        let now = Local::now();
        now.with_timezone(now.offset())
    }
}

// == Mock Clock ==
/// Manually driven clock for deterministic tests.
///
/// Clones share the same underlying time.
#[derive(Debug, Clone)]
pub struct MockClock {
    now: Arc<Mutex<DateTime<FixedOffset>>>,
}

impl MockClock {
    /// Creates a mock clock frozen at `start`.
    pub fn new(start: DateTime<FixedOffset>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Creates a mock clock from an RFC 3339 timestamp, e.g. `2024-05-14T10:00:00+00:00`.
    pub fn from_rfc3339(start: &str) -> Result<Self, chrono::ParseError> {
        DateTime::parse_from_rfc3339(start).map(Self::new)
    }

    /// Moves the clock forward.
    pub fn advance(&self, duration: Duration) {
        let Ok(delta) = chrono::Duration::from_std(duration) else {
            return;
        };
        if let Ok(mut now) = self.now.lock() {
            if let Some(next) = now.checked_add_signed(delta) {
                *now = next;
            }
        }
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<FixedOffset> {
        match self.now.lock() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

// == Utility Functions ==
/// Time remaining until the next local midnight after `now`.
///
/// Never returns zero: exactly at midnight the next boundary is a full day away.
pub fn duration_until_next_midnight(now: &DateTime<FixedOffset>) -> Duration {
    let next_midnight = now
        .date_naive()
        .succ_opt()
        .and_then(|date| date.and_hms_opt(0, 0, 0));

    match next_midnight {
        Some(midnight) => (midnight - now.naive_local())
            .to_std()
            .unwrap_or(Duration::from_secs(1)),
        // Only reachable at the end of chrono's representable range
        None => crate::config::ONE_DAY,
    }
}
