//! Entry Store Module
//!
//! The persistence seam of the cache: a flat key → entry table plus a single
//! durable day marker. Implementations report failures as errors; turning
//! them into safe defaults is the facade's job.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::cache::CacheEntry;
use crate::error::Result;

// == Entry Store Trait ==
/// Persistent key → entry table.
#[async_trait]
pub trait EntryStore: Send + Sync + 'static {
    /// Opens the substrate. Idempotent; other operations open lazily.
    async fn open(&self) -> Result<()>;

    /// Inserts or fully replaces the entry under `entry.key`.
    async fn put(&self, entry: CacheEntry) -> Result<()>;

    /// Fetches an entry without any validity checks.
    ///
    /// A stored entry that cannot be read back yields `CacheError::Decode`.
    async fn get_raw(&self, key: &str) -> Result<Option<CacheEntry>>;

    /// Removes an entry. Returns whether it existed.
    async fn remove(&self, key: &str) -> Result<bool>;

    /// Removes every entry. The day marker is kept.
    async fn remove_all(&self) -> Result<()>;

    /// All entries ordered by `written_at`, oldest first.
    ///
    /// Entries that cannot be read back are dropped from the store.
    async fn scan(&self) -> Result<Vec<CacheEntry>>;

    /// Last day-of-month recorded by the day tracker.
    async fn load_day_marker(&self) -> Result<Option<u32>>;

    /// Records the day-of-month the cache currently belongs to.
    async fn save_day_marker(&self, day: u32) -> Result<()>;
}

// == Memory Store ==
/// Non-durable store backed by a `HashMap`.
///
/// Used in tests and as a fallback when no file-backed substrate is wanted.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
    day_marker: RwLock<Option<u32>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current number of entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl EntryStore for MemoryStore {
    async fn open(&self) -> Result<()> {
        Ok(())
    }

    async fn put(&self, entry: CacheEntry) -> Result<()> {
        self.entries.write().await.insert(entry.key.clone(), entry);
        Ok(())
    }

    async fn get_raw(&self, key: &str) -> Result<Option<CacheEntry>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn remove_all(&self) -> Result<()> {
        self.entries.write().await.clear();
        Ok(())
    }

    async fn scan(&self) -> Result<Vec<CacheEntry>> {
        let mut entries: Vec<CacheEntry> = self.entries.read().await.values().cloned().collect();
        entries.sort_by(|a, b| a.written_at.cmp(&b.written_at).then_with(|| a.key.cmp(&b.key)));
        Ok(entries)
    }

    async fn load_day_marker(&self) -> Result<Option<u32>> {
        Ok(*self.day_marker.read().await)
    }

    async fn save_day_marker(&self, day: u32) -> Result<()> {
        *self.day_marker.write().await = Some(day);
        Ok(())
    }
}
