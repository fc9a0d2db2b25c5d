//! Storage layer for time entries.
//!
//! Provides a durable [`EntrySink`] backed by `rusqlite`.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! The timer store owns its sink exclusively, so appends are naturally serialized:
//! there is never more than one write in flight.
//!
//! # Schema
//!
//! ## Timestamp Format
//!
//! Timestamps are stored as TEXT in RFC 3339 format with millisecond precision
//! (e.g., `2026-03-02T09:00:00.000Z`), so lexicographic ordering matches
//! chronological ordering.
//!
//! ## Money
//!
//! Rates are stored as decimal TEXT. The amount is not stored: it is derived
//! from billable, rate and duration every time an entry is loaded, so it can
//! never drift from the rule that produced it.
//!
//! ## Activity
//!
//! The `activity` column stores the tagged JSON form of the activity reference.

use std::path::Path;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{Connection, Row, params};
use thiserror::Error;
use tracing::debug;
use wt_core::{ActivityRef, EntryId, EntryParts, EntrySink, Rate, SinkError, TimeEntry};

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Failed to parse a stored timestamp.
    #[error("invalid timestamp for entry {entry_id}: {timestamp}")]
    TimestampParse {
        entry_id: String,
        timestamp: String,
        #[source]
        source: chrono::ParseError,
    },
    /// A stored row that cannot be turned back into an entry.
    #[error("invalid entry data for {entry_id}: {message}")]
    InvalidEntryData { entry_id: String, message: String },
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.conn.path())
            .finish()
    }
}

/// A stored row before validation.
struct EntryRow {
    id: String,
    task: String,
    started_at: String,
    ended_at: String,
    entry_date: String,
    duration_minutes: i64,
    category: String,
    activity: String,
    billable: bool,
    rate: String,
    supersedes: Option<String>,
}

impl EntryRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            task: row.get(1)?,
            started_at: row.get(2)?,
            ended_at: row.get(3)?,
            entry_date: row.get(4)?,
            duration_minutes: row.get(5)?,
            category: row.get(6)?,
            activity: row.get(7)?,
            billable: row.get(8)?,
            rate: row.get(9)?,
            supersedes: row.get(10)?,
        })
    }

    fn into_entry(self) -> Result<TimeEntry, DbError> {
        let invalid = |message: String| DbError::InvalidEntryData {
            entry_id: self.id.clone(),
            message,
        };
        let id = EntryId::new(self.id.clone()).map_err(|e| invalid(e.to_string()))?;
        let started_at = parse_timestamp(&self.id, &self.started_at)?;
        let ended_at = parse_timestamp(&self.id, &self.ended_at)?;
        let duration_minutes =
            u64::try_from(self.duration_minutes).map_err(|e| invalid(e.to_string()))?;
        let activity: ActivityRef =
            serde_json::from_str(&self.activity).map_err(|e| invalid(e.to_string()))?;
        let rate: Rate = self
            .rate
            .parse()
            .map_err(|e: wt_core::ValidationError| invalid(e.to_string()))?;
        let supersedes = self
            .supersedes
            .clone()
            .map(EntryId::new)
            .transpose()
            .map_err(|e| invalid(e.to_string()))?;

        let entry = TimeEntry::from_parts(EntryParts {
            id,
            task: self.task.clone(),
            started_at,
            ended_at,
            duration_minutes,
            category: self.category.clone(),
            activity,
            billable: self.billable,
            rate,
            supersedes,
        });
        let stored_date = NaiveDate::parse_from_str(&self.entry_date, "%Y-%m-%d")
            .map_err(|e| invalid(e.to_string()))?;
        if entry.date() != stored_date {
            return Err(invalid(format!(
                "stored date {stored_date} does not match end time {}",
                self.ended_at
            )));
        }
        Ok(entry)
    }
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch(
            "
            -- Time entries: append-only; edits insert a row that supersedes another
            -- started_at/ended_at: RFC 3339 (e.g., '2026-03-02T09:00:00.000Z')
            -- entry_date: calendar date of ended_at (UTC), 'YYYY-MM-DD'
            -- rate: decimal text
            -- activity: tagged JSON activity reference
            CREATE TABLE IF NOT EXISTS time_entries (
                id TEXT PRIMARY KEY,
                task TEXT NOT NULL,
                started_at TEXT NOT NULL,
                ended_at TEXT NOT NULL,
                entry_date TEXT NOT NULL,
                duration_minutes INTEGER NOT NULL,
                category TEXT NOT NULL,
                activity TEXT NOT NULL,
                billable INTEGER NOT NULL,
                rate TEXT NOT NULL,
                supersedes TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_time_entries_ended ON time_entries(ended_at);
            CREATE INDEX IF NOT EXISTS idx_time_entries_date ON time_entries(entry_date);
            ",
        )?;
        Ok(())
    }

    /// Appends one entry. Fails if an entry with the same ID already exists.
    pub fn append_entry(&mut self, entry: &TimeEntry) -> Result<(), DbError> {
        let activity = serde_json::to_string(entry.activity()).map_err(|e| {
            DbError::InvalidEntryData {
                entry_id: entry.id().to_string(),
                message: e.to_string(),
            }
        })?;
        let duration_minutes = i64::try_from(entry.duration_minutes()).map_err(|e| {
            DbError::InvalidEntryData {
                entry_id: entry.id().to_string(),
                message: e.to_string(),
            }
        })?;
        self.conn.execute(
            "
            INSERT INTO time_entries
            (id, task, started_at, ended_at, entry_date, duration_minutes, category, activity, billable, rate, supersedes)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
            params![
                entry.id().as_str(),
                entry.task(),
                format_timestamp(entry.started_at()),
                format_timestamp(entry.ended_at()),
                entry.date().format("%Y-%m-%d").to_string(),
                duration_minutes,
                entry.category(),
                activity,
                entry.billable(),
                entry.rate().value().to_string(),
                entry.supersedes().map(EntryId::as_str),
            ],
        )?;
        debug!(entry_id = %entry.id(), "entry stored");
        Ok(())
    }

    /// Lists all entries ordered by end time then ID.
    pub fn list_entries(&self) -> Result<Vec<TimeEntry>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT id, task, started_at, ended_at, entry_date, duration_minutes, category, activity, billable, rate, supersedes
            FROM time_entries
            ORDER BY ended_at ASC, id ASC
            ",
        )?;
        let rows = stmt.query_map([], EntryRow::from_row)?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?.into_entry()?);
        }
        Ok(entries)
    }

    /// Lists entries that have not been replaced by a revision.
    pub fn list_current_entries(&self) -> Result<Vec<TimeEntry>, DbError> {
        let entries = self.list_entries()?;
        let superseded: std::collections::HashSet<EntryId> = entries
            .iter()
            .filter_map(|entry| entry.supersedes().cloned())
            .collect();
        Ok(entries
            .into_iter()
            .filter(|entry| !superseded.contains(entry.id()))
            .collect())
    }
}

impl EntrySink for Database {
    fn append(&mut self, entry: &TimeEntry) -> Result<(), SinkError> {
        self.append_entry(entry)
            .map_err(|err| SinkError::new(entry.id().clone(), err))
    }
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(entry_id: &str, timestamp: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|source| DbError::TimestampParse {
            entry_id: entry_id.to_string(),
            timestamp: timestamp.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rust_decimal::Decimal;
    use wt_core::{Binding, EntryEdit, ManualClock, StoreError, TimerStore, WorkOrderId};

    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn billable_binding() -> Binding {
        Binding {
            activity: ActivityRef::WorkOrder(WorkOrderId::new("WO-1042").unwrap()),
            task_name: "Replace conveyor belt".to_string(),
            billable: true,
            rate: Rate::per_hour(500),
            category: "maintenance".to_string(),
        }
    }

    fn saved_entry() -> TimeEntry {
        let clock = ManualClock::new(at("2026-03-02T09:00:00Z"));
        let mut store = TimerStore::new(Arc::new(clock.clone()));
        store.bind_activity(billable_binding());
        store.start();
        clock.advance_secs(180);
        store.stop_and_save().unwrap()
    }

    #[test]
    fn append_and_list_roundtrip() {
        let mut db = Database::open_in_memory().unwrap();
        let entry = saved_entry();

        db.append_entry(&entry).unwrap();

        let entries = db.list_entries().unwrap();
        assert_eq!(entries, vec![entry]);
        assert_eq!(entries[0].amount(), Decimal::from(25));
    }

    #[test]
    fn duplicate_append_is_rejected() {
        let mut db = Database::open_in_memory().unwrap();
        let entry = saved_entry();
        db.append_entry(&entry).unwrap();

        let err = db.append_entry(&entry).unwrap_err();
        assert!(matches!(err, DbError::Sqlite(_)));
        assert_eq!(db.list_entries().unwrap().len(), 1);
    }

    #[test]
    fn current_entries_skip_superseded() {
        let mut db = Database::open_in_memory().unwrap();
        let entry = saved_entry();
        let revised = entry.revised(EntryEdit {
            task: Some("Conveyor belt, second pass".to_string()),
            ..EntryEdit::default()
        });
        db.append_entry(&entry).unwrap();
        db.append_entry(&revised).unwrap();

        assert_eq!(db.list_entries().unwrap().len(), 2);
        assert_eq!(db.list_current_entries().unwrap(), vec![revised]);
    }

    #[test]
    fn store_persists_through_sink() {
        let temp = tempfile::tempdir().unwrap();
        let db_path = temp.path().join("wt.db");

        let clock = ManualClock::new(at("2026-03-02T09:00:00Z"));
        let mut store = TimerStore::new(Arc::new(clock.clone()))
            .with_sink(Box::new(Database::open(&db_path).unwrap()));
        store.start();
        clock.advance_secs(125);
        store.pause();
        store.resume();
        clock.advance_secs(55);
        let entry = store.stop_and_save().unwrap();

        let reopened = Database::open(&db_path).unwrap();
        let entries = reopened.list_entries().unwrap();
        assert_eq!(entries, vec![entry]);
        assert_eq!(entries[0].duration_minutes(), 3);
    }

    #[test]
    fn sink_error_keeps_session_running() {
        let temp = tempfile::tempdir().unwrap();
        let db_path = temp.path().join("wt.db");
        let db = Database::open(&db_path).unwrap();
        db.conn.execute_batch("DROP TABLE time_entries;").unwrap();

        let clock = ManualClock::new(at("2026-03-02T09:00:00Z"));
        let mut store = TimerStore::new(Arc::new(clock.clone())).with_sink(Box::new(db));
        store.start();
        clock.advance_secs(60);

        let err = store.stop_and_save().unwrap_err();
        assert!(matches!(err, StoreError::Persist(_)));
        assert!(store.snapshot().is_running());
    }

    #[test]
    fn rejects_tampered_date() {
        let mut db = Database::open_in_memory().unwrap();
        let entry = saved_entry();
        db.append_entry(&entry).unwrap();
        db.conn
            .execute("UPDATE time_entries SET entry_date = '1999-01-01'", [])
            .unwrap();

        let err = db.list_entries().unwrap_err();
        assert!(matches!(err, DbError::InvalidEntryData { .. }));
    }
}
