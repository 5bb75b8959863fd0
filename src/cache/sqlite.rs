//! SQLite Entry Store
//!
//! Durable `EntryStore` backed by a single SQLite file. The connection is
//! opened lazily on first use and kept for the life of the store. Every
//! statement runs on `spawn_blocking` so callers never block the runtime.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tokio::sync::OnceCell;
use tokio::task;
use tracing::{debug, info, warn};

use crate::cache::store::EntryStore;
use crate::cache::{CacheEntry, Tier};
use crate::error::{CacheError, Result};

/// Schema version recorded in `PRAGMA user_version`.
pub const STORE_VERSION: i32 = 1;

const DAY_MARKER: &str = "lastCacheDay";

const SELECT_COLUMNS: &str = "SELECT rowid, cache_key, payload, written_at, day_stamp, schema_version, \
     tier, size_bytes, ttl_ms FROM cache_entries";

// == SQLite Store ==
/// File-backed entry store.
#[derive(Debug)]
pub struct SqliteStore {
    path: PathBuf,
    conn: OnceCell<Arc<Mutex<Connection>>>,
}

impl SqliteStore {
    /// Creates a store for `path`. Nothing is opened until first use.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            conn: OnceCell::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the shared connection, opening it on first call.
    ///
    /// A failed open is not cached; the next operation retries.
    async fn connection(&self) -> Result<Arc<Mutex<Connection>>> {
        let conn = self
            .conn
            .get_or_try_init(|| async {
                let path = self.path.clone();
                let conn = task::spawn_blocking(move || open_connection(&path)).await??;
                Ok::<_, CacheError>(Arc::new(Mutex::new(conn)))
            })
            .await?;

        Ok(Arc::clone(conn))
    }

    /// Runs `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.connection().await?;

        task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| CacheError::Storage("connection lock poisoned".to_string()))?;
            f(&mut guard)
        })
        .await?
    }
}

// == Connection Setup ==
fn open_connection(path: &Path) -> Result<Connection> {
    let unavailable = |e: rusqlite::Error| CacheError::Unavailable(format!("{}: {e}", path.display()));

    let mut conn = Connection::open(path).map_err(unavailable)?;
    conn.busy_timeout(Duration::from_secs(5)).map_err(unavailable)?;
    migrate(&mut conn).map_err(unavailable)?;

    debug!("Opened cache database at {}", path.display());
    Ok(conn)
}

/// Creates the schema on first open, detected through `user_version`.
fn migrate(conn: &mut Connection) -> rusqlite::Result<()> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version >= STORE_VERSION {
        return Ok(());
    }

    info!("Creating cache schema (version {} -> {})", version, STORE_VERSION);

    let tx = conn.transaction()?;
    tx.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS cache_entries (
             cache_key      TEXT PRIMARY KEY NOT NULL,
             payload        TEXT NOT NULL,
             written_at     INTEGER NOT NULL,
             day_stamp      INTEGER NOT NULL,
             schema_version TEXT NOT NULL,
             tier           TEXT NOT NULL,
             size_bytes     INTEGER NOT NULL,
             ttl_ms         INTEGER NOT NULL
         );
         CREATE INDEX IF NOT EXISTS idx_cache_entries_written_at ON cache_entries(written_at);
         CREATE INDEX IF NOT EXISTS idx_cache_entries_day_stamp ON cache_entries(day_stamp);
         CREATE TABLE IF NOT EXISTS cache_meta (
             name  TEXT PRIMARY KEY NOT NULL,
             value INTEGER NOT NULL
         );
         PRAGMA user_version = {STORE_VERSION};"
    ))?;
    tx.commit()
}

/// A row of `cache_entries`, kept apart from the entry so one row with
/// unconvertible columns cannot fail a whole read.
enum StoredRow {
    Valid(CacheEntry),
    Corrupt { rowid: i64, reason: String },
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<StoredRow> {
    let rowid: i64 = row.get(0)?;
    match row_to_entry(row) {
        Ok(entry) => Ok(StoredRow::Valid(entry)),
        Err(e) if is_conversion_error(&e) => Ok(StoredRow::Corrupt {
            rowid,
            reason: e.to_string(),
        }),
        Err(e) => Err(e),
    }
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<CacheEntry> {
    let tier: String = row.get(6)?;
    let tier = tier
        .parse::<Tier>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?;

    Ok(CacheEntry {
        key: row.get(1)?,
        payload: row.get(2)?,
        written_at: row.get::<_, i64>(3)?.max(0) as u64,
        day_stamp: row.get::<_, i64>(4)?.max(0) as u32,
        schema_version: row.get(5)?,
        tier,
        size_bytes: row.get::<_, i64>(7)?.max(0) as u64,
        ttl_ms: row.get::<_, i64>(8)?.max(0) as u64,
    })
}

fn is_conversion_error(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::InvalidColumnType(..)
            | rusqlite::Error::IntegralValueOutOfRange(..)
    )
}

fn to_sql_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[async_trait]
impl EntryStore for SqliteStore {
    async fn open(&self) -> Result<()> {
        self.connection().await.map(|_| ())
    }

    async fn put(&self, entry: CacheEntry) -> Result<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO cache_entries
                     (cache_key, payload, written_at, day_stamp, schema_version, tier, size_bytes, ttl_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    entry.key,
                    entry.payload,
                    to_sql_int(entry.written_at),
                    entry.day_stamp,
                    entry.schema_version,
                    entry.tier.as_str(),
                    to_sql_int(entry.size_bytes),
                    to_sql_int(entry.ttl_ms),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_raw(&self, key: &str) -> Result<Option<CacheEntry>> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    &format!("{SELECT_COLUMNS} WHERE cache_key = ?1"),
                    params![key],
                    read_row,
                )
                .optional()?;

            match row {
                None => Ok(None),
                Some(StoredRow::Valid(entry)) => Ok(Some(entry)),
                Some(StoredRow::Corrupt { reason, .. }) => {
                    Err(CacheError::Decode(format!("{key}: {reason}")))
                }
            }
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let removed = conn.execute("DELETE FROM cache_entries WHERE cache_key = ?1", params![key])?;
            Ok(removed > 0)
        })
        .await
    }

    async fn remove_all(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM cache_entries", [])?;
            Ok(())
        })
        .await
    }

    async fn scan(&self) -> Result<Vec<CacheEntry>> {
        self.with_conn(|conn| {
            let rows = {
                let mut stmt = conn
                    .prepare(&format!("{SELECT_COLUMNS} ORDER BY written_at ASC, cache_key ASC"))?;
                let rows = stmt
                    .query_map([], read_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            };

            let mut entries = Vec::with_capacity(rows.len());
            for row in rows {
                match row {
                    StoredRow::Valid(entry) => entries.push(entry),
                    StoredRow::Corrupt { rowid, reason } => {
                        warn!("Dropping unreadable cache row {}: {}", rowid, reason);
                        conn.execute("DELETE FROM cache_entries WHERE rowid = ?1", params![rowid])?;
                    }
                }
            }
            Ok(entries)
        })
        .await
    }

    async fn load_day_marker(&self) -> Result<Option<u32>> {
        self.with_conn(|conn| {
            let day: Option<i64> = conn
                .query_row(
                    "SELECT value FROM cache_meta WHERE name = ?1",
                    params![DAY_MARKER],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(day.and_then(|d| u32::try_from(d).ok()))
        })
        .await
    }

    async fn save_day_marker(&self, day: u32) -> Result<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO cache_meta (name, value) VALUES (?1, ?2)",
                params![DAY_MARKER, day],
            )?;
            Ok(())
        })
        .await
    }
}
