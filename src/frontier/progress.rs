//! Crawl progress cursor
//!
//! One cursor per source: the latest entry timestamp whose samples were
//! confirmed stored. The cursor only moves forward; every store enforces this
//! on write so an out-of-order commit cannot rewind it.

use crate::store::types::TIMESTAMP_FORMAT;
use crate::store::{StoreError, StoreResult};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

/// Progress of one source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlProgress {
    pub source_id: String,
    pub latest_processed: Option<NaiveDateTime>,
}

impl CrawlProgress {
    pub fn new(source_id: impl Into<String>, latest_processed: Option<NaiveDateTime>) -> Self {
        Self {
            source_id: source_id.into(),
            latest_processed,
        }
    }

    /// Move the cursor to the latest of `committed`, never backwards.
    /// Returns true if the cursor moved.
    pub fn advance<I>(&mut self, committed: I) -> bool
    where
        I: IntoIterator<Item = NaiveDateTime>,
    {
        let before = self.latest_processed;
        let candidate = committed.into_iter().max();

        self.latest_processed = match (before, candidate) {
            (Some(prev), Some(next)) => Some(prev.max(next)),
            (prev, next) => prev.or(next),
        };

        self.latest_processed != before
    }
}

/// Persistence for progress cursors
pub trait ProgressStore: Send + Sync {
    fn get_latest(&self, source_id: &str) -> StoreResult<Option<NaiveDateTime>>;

    /// Record `latest` unless the stored cursor is already later
    fn set_latest(&self, source_id: &str, latest: NaiveDateTime) -> StoreResult<()>;

    fn load(&self, source_id: &str) -> StoreResult<CrawlProgress> {
        Ok(CrawlProgress::new(source_id, self.get_latest(source_id)?))
    }

    fn commit(&self, progress: &CrawlProgress) -> StoreResult<()> {
        match progress.latest_processed {
            Some(latest) => self.set_latest(&progress.source_id, latest),
            None => Ok(()),
        }
    }
}

/// Progress cursors in a SQLite table
pub struct SqliteProgressStore {
    conn: Mutex<Connection>,
}

impl SqliteProgressStore {
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA busy_timeout = 5000;
            ",
        )?;
        Self::init(conn)
    }

    pub fn in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS crawl_progress (
                source_id TEXT PRIMARY KEY,
                latest_processed TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl ProgressStore for SqliteProgressStore {
    fn get_latest(&self, source_id: &str) -> StoreResult<Option<NaiveDateTime>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::Lock(e.to_string()))?;

        let raw: Option<String> = conn
            .query_row(
                "SELECT latest_processed FROM crawl_progress WHERE source_id = ?",
                params![source_id],
                |row| row.get(0),
            )
            .optional()?;

        raw.map(|s| {
            NaiveDateTime::parse_from_str(&s, TIMESTAMP_FORMAT)
                .map_err(|e| StoreError::Corruption(format!("cursor {}: {}", s, e)))
        })
        .transpose()
    }

    fn set_latest(&self, source_id: &str, latest: NaiveDateTime) -> StoreResult<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::Lock(e.to_string()))?;

        conn.execute(
            "INSERT INTO crawl_progress (source_id, latest_processed, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (source_id) DO UPDATE SET
                latest_processed = excluded.latest_processed,
                updated_at = excluded.updated_at
             WHERE excluded.latest_processed > crawl_progress.latest_processed",
            params![
                source_id,
                latest.format(TIMESTAMP_FORMAT).to_string(),
                chrono::Utc::now().to_rfc3339()
            ],
        )?;

        Ok(())
    }
}

/// In-process progress store
#[derive(Default)]
pub struct MemoryProgressStore {
    cursors: Mutex<HashMap<String, NaiveDateTime>>,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressStore for MemoryProgressStore {
    fn get_latest(&self, source_id: &str) -> StoreResult<Option<NaiveDateTime>> {
        let cursors = self
            .cursors
            .lock()
            .map_err(|e| StoreError::Lock(e.to_string()))?;
        Ok(cursors.get(source_id).copied())
    }

    fn set_latest(&self, source_id: &str, latest: NaiveDateTime) -> StoreResult<()> {
        let mut cursors = self
            .cursors
            .lock()
            .map_err(|e| StoreError::Lock(e.to_string()))?;
        let cursor = cursors.entry(source_id.to_string()).or_insert(latest);
        if latest > *cursor {
            *cursor = latest;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    #[test]
    fn test_advance_never_moves_backwards() {
        let mut progress = CrawlProgress::new("nem.dispatch", Some(ts("2020-06-11 00:10")));

        assert!(!progress.advance(vec![ts("2020-06-11 00:05")]));
        assert_eq!(progress.latest_processed, Some(ts("2020-06-11 00:10")));

        assert!(progress.advance(vec![ts("2020-06-11 00:20"), ts("2020-06-11 00:15")]));
        assert_eq!(progress.latest_processed, Some(ts("2020-06-11 00:20")));

        assert!(!progress.advance(Vec::new()));
    }

    #[test]
    fn test_advance_from_empty() {
        let mut progress = CrawlProgress::new("nem.dispatch", None);
        assert!(progress.advance(vec![ts("2020-06-11 00:05")]));
        assert_eq!(progress.latest_processed, Some(ts("2020-06-11 00:05")));
    }

    #[test]
    fn test_sqlite_cursor_is_monotonic() {
        let store = SqliteProgressStore::in_memory().unwrap();
        assert_eq!(store.get_latest("nem.dispatch").unwrap(), None);

        store.set_latest("nem.dispatch", ts("2020-06-11 00:10")).unwrap();
        store.set_latest("nem.dispatch", ts("2020-06-11 00:05")).unwrap();
        assert_eq!(
            store.get_latest("nem.dispatch").unwrap(),
            Some(ts("2020-06-11 00:10"))
        );

        store.set_latest("nem.dispatch", ts("2020-06-11 00:15")).unwrap();
        assert_eq!(
            store.get_latest("nem.dispatch").unwrap(),
            Some(ts("2020-06-11 00:15"))
        );
        assert_eq!(store.get_latest("wem.balancing").unwrap(), None);
    }

    #[test]
    fn test_sqlite_cursor_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("progress.db");

        {
            let store = SqliteProgressStore::open(&path).unwrap();
            store
                .commit(&CrawlProgress::new("nem.dispatch", Some(ts("2020-06-11 00:05"))))
                .unwrap();
        }

        let store = SqliteProgressStore::open(&path).unwrap();
        assert_eq!(
            store.load("nem.dispatch").unwrap().latest_processed,
            Some(ts("2020-06-11 00:05"))
        );
    }

    #[test]
    fn test_memory_cursor_is_monotonic() {
        let store = MemoryProgressStore::new();
        store.set_latest("a", ts("2020-06-11 00:10")).unwrap();
        store.set_latest("a", ts("2020-06-11 00:00")).unwrap();
        assert_eq!(store.get_latest("a").unwrap(), Some(ts("2020-06-11 00:10")));
    }
}
