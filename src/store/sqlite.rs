//! SQLite sample store
//!
//! Samples live in one table with a unique `(timestamp, entity_code)`
//! constraint. Writes are multi-row `INSERT ... ON CONFLICT DO UPDATE`
//! statements inside one transaction per batch, so replaying a batch is
//! harmless: existing rows take the new value, new rows are inserted.

use crate::store::error::{StoreError, StoreResult};
use crate::store::types::{RawSample, SampleKey, TIMESTAMP_FORMAT};
use chrono::{NaiveDateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OpenFlags};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;

/// Rows per INSERT statement (5 bound parameters each)
const ROWS_PER_STATEMENT: usize = 500;

/// Persistence operations the ingestion core needs from a sample store
pub trait SampleStore: Send + Sync {
    /// Insert or update samples by natural key. Returns distinct rows written.
    fn upsert(&self, samples: &[RawSample]) -> StoreResult<usize>;

    /// Samples for one entity with `start <= timestamp <= end`, oldest first
    fn range(
        &self,
        entity_code: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> StoreResult<Vec<RawSample>>;

    /// Total stored rows
    fn count(&self) -> StoreResult<u64>;
}

/// SQLite-backed sample store (std Mutex because `Connection` is !Sync)
pub struct SqliteSampleStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteSampleStore {
    /// Create or open the store at `path`
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            ",
        )?;

        Self::init(conn, Some(path.to_path_buf()))
    }

    /// Open a private in-memory store
    pub fn in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> StoreResult<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS raw_samples (
                timestamp TEXT NOT NULL,
                entity_code TEXT NOT NULL,
                value TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT,
                UNIQUE (timestamp, entity_code)
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_samples_entity ON raw_samples(entity_code, timestamp)",
            [],
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Database file, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn upsert_sql(rows: usize) -> String {
        let values = vec!["(?, ?, ?, ?, NULL)"; rows].join(", ");
        format!(
            "INSERT INTO raw_samples (timestamp, entity_code, value, created_at, updated_at)
             VALUES {}
             ON CONFLICT (timestamp, entity_code) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.created_at",
            values
        )
    }
}

impl SampleStore for SqliteSampleStore {
    fn upsert(&self, samples: &[RawSample]) -> StoreResult<usize> {
        if samples.is_empty() {
            return Ok(0);
        }

        // Last occurrence of a key within the batch wins
        let unique: BTreeMap<SampleKey, &RawSample> =
            samples.iter().map(|s| (s.key(), s)).collect();
        let rows: Vec<&RawSample> = unique.into_values().collect();
        let now = Utc::now().to_rfc3339();

        let mut conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::Lock(e.to_string()))?;
        let tx = conn.transaction()?;

        for chunk in rows.chunks(ROWS_PER_STATEMENT) {
            let mut stmt = tx.prepare_cached(&Self::upsert_sql(chunk.len()))?;

            let bound = chunk.iter().flat_map(|s| {
                [
                    Value::Text(s.timestamp.format(TIMESTAMP_FORMAT).to_string()),
                    Value::Text(s.entity_code.clone()),
                    s.value
                        .map(|v| Value::Text(v.to_string()))
                        .unwrap_or(Value::Null),
                    Value::Text(now.clone()),
                ]
            });

            stmt.execute(params_from_iter(bound))?;
        }

        tx.commit()?;

        Ok(rows.len())
    }

    fn range(
        &self,
        entity_code: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> StoreResult<Vec<RawSample>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::Lock(e.to_string()))?;

        let mut stmt = conn.prepare_cached(
            "SELECT timestamp, value FROM raw_samples
             WHERE entity_code = ? AND timestamp >= ? AND timestamp <= ?
             ORDER BY timestamp",
        )?;

        let rows = stmt
            .query_map(
                params![
                    entity_code,
                    start.format(TIMESTAMP_FORMAT).to_string(),
                    end.format(TIMESTAMP_FORMAT).to_string()
                ],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?)),
            )?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(ts, value)| {
                let timestamp = NaiveDateTime::parse_from_str(&ts, TIMESTAMP_FORMAT)
                    .map_err(|e| StoreError::Corruption(format!("timestamp {}: {}", ts, e)))?;
                let value = value
                    .map(|v| {
                        Decimal::from_str(&v)
                            .map_err(|e| StoreError::Corruption(format!("value {}: {}", v, e)))
                    })
                    .transpose()?;
                Ok(RawSample::new(entity_code, timestamp, value))
            })
            .collect()
    }

    fn count(&self) -> StoreResult<u64> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::Lock(e.to_string()))?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM raw_samples", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn sample(entity: &str, at: &str, value: &str) -> RawSample {
        RawSample::new(entity, ts(at), Some(Decimal::from_str(value).unwrap()))
    }

    #[test]
    fn test_same_record_twice_yields_one_row() {
        let store = SqliteSampleStore::in_memory().unwrap();
        let row = sample("BAYSW1", "2020-06-11 00:05", "512.5");

        store.upsert(&[row.clone()]).unwrap();
        store.upsert(&[row.clone()]).unwrap();

        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_upsert_updates_existing_value() {
        let store = SqliteSampleStore::in_memory().unwrap();

        store
            .upsert(&[sample("BAYSW1", "2020-06-11 00:05", "512.5")])
            .unwrap();
        store
            .upsert(&[sample("BAYSW1", "2020-06-11 00:05", "600")])
            .unwrap();

        let rows = store
            .range("BAYSW1", ts("2020-06-11 00:00"), ts("2020-06-11 01:00"))
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value, Some(Decimal::from(600)));
    }

    #[test]
    fn test_duplicates_within_batch_collapse() {
        let store = SqliteSampleStore::in_memory().unwrap();
        let written = store
            .upsert(&[
                sample("ER01", "2020-06-11 00:05", "1"),
                sample("ER01", "2020-06-11 00:05", "2"),
                sample("ER02", "2020-06-11 00:05", "3"),
            ])
            .unwrap();

        assert_eq!(written, 2);
        let rows = store
            .range("ER01", ts("2020-06-11 00:00"), ts("2020-06-11 00:05"))
            .unwrap();
        assert_eq!(rows[0].value, Some(Decimal::from(2)));
    }

    #[test]
    fn test_null_values_round_trip() {
        let store = SqliteSampleStore::in_memory().unwrap();
        store
            .upsert(&[RawSample::new("LOYYB1", ts("2020-06-11 00:05"), None)])
            .unwrap();

        let rows = store
            .range("LOYYB1", ts("2020-06-11 00:00"), ts("2020-06-11 00:10"))
            .unwrap();
        assert_eq!(rows[0].value, None);
    }

    #[test]
    fn test_range_is_inclusive_and_ordered() {
        let store = SqliteSampleStore::in_memory().unwrap();
        store
            .upsert(&[
                sample("ER01", "2020-06-11 00:10", "2"),
                sample("ER01", "2020-06-11 00:00", "0"),
                sample("ER01", "2020-06-11 00:05", "1"),
                sample("ER01", "2020-06-11 00:15", "3"),
                sample("ER02", "2020-06-11 00:05", "9"),
            ])
            .unwrap();

        let rows = store
            .range("ER01", ts("2020-06-11 00:00"), ts("2020-06-11 00:10"))
            .unwrap();
        let values: Vec<_> = rows.iter().map(|r| r.value.unwrap()).collect();
        assert_eq!(
            values,
            vec![Decimal::from(0), Decimal::from(1), Decimal::from(2)]
        );
    }

    #[test]
    fn test_large_batch_spans_statements() {
        let store = SqliteSampleStore::in_memory().unwrap();
        let rows: Vec<RawSample> = (0..1200)
            .map(|i| {
                RawSample::new(
                    format!("UNIT{}", i % 7),
                    ts("2020-06-11 00:00") + chrono::Duration::minutes(5 * (i / 7)),
                    Some(Decimal::from(i)),
                )
            })
            .collect();

        assert_eq!(store.upsert(&rows).unwrap(), 1200);
        assert_eq!(store.count().unwrap(), 1200);
    }

    #[test]
    fn test_persistence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("samples.db");

        {
            let store = SqliteSampleStore::open(&path).unwrap();
            store
                .upsert(&[sample("BAYSW1", "2020-06-11 00:05", "512.5")])
                .unwrap();
        }

        let store = SqliteSampleStore::open(&path).unwrap();
        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.path(), Some(path.as_path()));
    }
}
