//! Storage layer for the attendance monitor.
//!
//! Persists presence intervals using `rusqlite` and applies merge plans from
//! [`at_core::plan_presence`] atomically.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! The monitor owns its `Database` and drives it from a single loop, so no
//! synchronization is needed.
//!
//! # Schema
//!
//! ## Timestamp Format
//!
//! `start_time` and `end_time` are TEXT in local wall-clock time,
//! `YYYY-MM-DD HH:MM:SS` (see [`at_core::TIMESTAMP_FORMAT`]). This format:
//! - Sorts lexicographically in chronological order
//! - Is readable by external query tools using SQLite's `DATE()`/`strftime()`
//! - Keeps exactly whole-second precision, so values round-trip unchanged
//!
//! ## Invariants
//!
//! Per name, rows never overlap, never span more than one calendar day, and
//! are separated by more than the merge threshold. Rows are only written by
//! [`Database::record_presence`].

use std::path::Path;

use at_core::{
    AttendanceInterval, DEFAULT_MERGE_THRESHOLD, Transition, format_timestamp, parse_timestamp,
    plan_presence, truncate_to_second,
};
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use thiserror::Error;

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A stored timestamp could not be parsed.
    #[error("invalid timestamp for interval {id}: {timestamp}")]
    TimestampParse {
        id: i64,
        timestamp: String,
        #[source]
        source: chrono::ParseError,
    },
    /// The merge threshold is negative.
    #[error("invalid merge threshold: {0} seconds")]
    InvalidMergeThreshold(i64),
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
    merge_threshold: Duration,
}

/// Outcome of recording one presence observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceUpdate {
    pub transition: Transition,
    /// Rows inserted by this observation, in chronological order.
    pub inserted: Vec<AttendanceInterval>,
}

#[derive(Debug)]
struct IntervalRow {
    id: i64,
    name: String,
    start_time: String,
    end_time: String,
}

impl IntervalRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            start_time: row.get(2)?,
            end_time: row.get(3)?,
        })
    }

    fn into_interval(self) -> Result<AttendanceInterval, DbError> {
        let start = parse_row_timestamp(self.id, &self.start_time)?;
        let end = parse_row_timestamp(self.id, &self.end_time)?;
        Ok(AttendanceInterval {
            id: self.id,
            name: self.name,
            start,
            end,
        })
    }
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn,
            merge_threshold: DEFAULT_MERGE_THRESHOLD,
        };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn,
            merge_threshold: DEFAULT_MERGE_THRESHOLD,
        };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch(
            "
            -- One row per continuous presence interval
            -- start_time/end_time: local time, 'YYYY-MM-DD HH:MM:SS'
            CREATE TABLE IF NOT EXISTS attendance (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                start_time DATETIME NOT NULL,
                end_time DATETIME NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_attendance_name_end ON attendance(name, end_time);
            CREATE INDEX IF NOT EXISTS idx_attendance_start ON attendance(start_time);
            ",
        )?;
        Ok(())
    }

    /// Sets the maximum gap for which an observation extends the newest interval.
    pub fn set_merge_threshold(&mut self, threshold: Duration) -> Result<(), DbError> {
        if threshold < Duration::zero() {
            return Err(DbError::InvalidMergeThreshold(threshold.num_seconds()));
        }
        self.merge_threshold = threshold;
        Ok(())
    }

    pub const fn merge_threshold(&self) -> Duration {
        self.merge_threshold
    }

    /// Records that `name` was online at `now`.
    ///
    /// Reads the user's newest interval, then extends it (splitting at
    /// midnight), starts a new one, or leaves storage unchanged. All reads and
    /// writes happen in one transaction; on error nothing is committed.
    pub fn record_presence(
        &mut self,
        name: &str,
        now: NaiveDateTime,
    ) -> Result<PresenceUpdate, DbError> {
        let now = truncate_to_second(now);
        let tx = self.conn.transaction()?;
        let latest = latest_interval_in(&tx, name)?;
        let plan = plan_presence(latest.as_ref(), now, self.merge_threshold);
        if plan.is_noop() {
            if let Some(latest) = latest.as_ref().filter(|latest| now < latest.end) {
                tracing::warn!(
                    name,
                    observed = %now,
                    latest_end = %latest.end,
                    "observation precedes newest interval; clock moved backwards"
                );
            }
            return Ok(PresenceUpdate {
                transition: plan.transition,
                inserted: Vec::new(),
            });
        }

        if let Some(id) = plan.delete {
            tx.execute("DELETE FROM attendance WHERE id = ?", params![id])?;
        }
        let mut inserted = Vec::with_capacity(plan.insert.len());
        {
            let mut stmt = tx.prepare(
                "INSERT INTO attendance (name, start_time, end_time) VALUES (?, ?, ?)",
            )?;
            for (start, end) in plan.insert {
                stmt.execute(params![name, format_timestamp(start), format_timestamp(end)])?;
                inserted.push(AttendanceInterval {
                    id: tx.last_insert_rowid(),
                    name: name.to_string(),
                    start,
                    end,
                });
            }
        }
        tx.commit()?;

        tracing::debug!(
            name,
            transition = %plan.transition,
            rows = inserted.len(),
            "recorded presence"
        );
        Ok(PresenceUpdate {
            transition: plan.transition,
            inserted,
        })
    }

    /// Returns the interval with the latest end time for `name`.
    pub fn latest_interval(&self, name: &str) -> Result<Option<AttendanceInterval>, DbError> {
        let row = self
            .conn
            .query_row(LATEST_INTERVAL_SQL, params![name], IntervalRow::from_row)
            .optional()?;
        row.map(IntervalRow::into_interval).transpose()
    }

    /// Lists all intervals for `name`, oldest first.
    pub fn list_intervals_for(&self, name: &str) -> Result<Vec<AttendanceInterval>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT id, name, start_time, end_time
            FROM attendance
            WHERE name = ?
            ORDER BY start_time ASC, id ASC
            ",
        )?;
        let rows = stmt.query_map(params![name], IntervalRow::from_row)?;
        collect_intervals(rows)
    }

    /// Lists intervals that start on `date`, ordered by name then start time.
    pub fn list_intervals_on(&self, date: NaiveDate) -> Result<Vec<AttendanceInterval>, DbError> {
        let day_start = date.and_time(NaiveTime::default());
        let Some(next_day) = date.succ_opt() else {
            return Ok(Vec::new());
        };
        let day_end = next_day.and_time(NaiveTime::default());
        let mut stmt = self.conn.prepare(
            "
            SELECT id, name, start_time, end_time
            FROM attendance
            WHERE start_time >= ? AND start_time < ?
            ORDER BY name ASC, start_time ASC, id ASC
            ",
        )?;
        let rows = stmt.query_map(
            params![format_timestamp(day_start), format_timestamp(day_end)],
            IntervalRow::from_row,
        )?;
        collect_intervals(rows)
    }

    /// Returns each user's newest interval, most recently seen first.
    pub fn latest_interval_per_user(&self) -> Result<Vec<AttendanceInterval>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT id, name, start_time, end_time
            FROM attendance AS a
            WHERE a.id = (
                SELECT b.id FROM attendance AS b
                WHERE b.name = a.name
                ORDER BY b.end_time DESC, b.id DESC
                LIMIT 1
            )
            ORDER BY end_time DESC, name ASC
            ",
        )?;
        let rows = stmt.query_map([], IntervalRow::from_row)?;
        collect_intervals(rows)
    }
}

const LATEST_INTERVAL_SQL: &str = "
    SELECT id, name, start_time, end_time
    FROM attendance
    WHERE name = ?
    ORDER BY end_time DESC, id DESC
    LIMIT 1
";

fn latest_interval_in(
    tx: &Transaction<'_>,
    name: &str,
) -> Result<Option<AttendanceInterval>, DbError> {
    let row = tx
        .query_row(LATEST_INTERVAL_SQL, params![name], IntervalRow::from_row)
        .optional()?;
    row.map(IntervalRow::into_interval).transpose()
}

fn collect_intervals(
    rows: impl Iterator<Item = rusqlite::Result<IntervalRow>>,
) -> Result<Vec<AttendanceInterval>, DbError> {
    let mut intervals = Vec::new();
    for row in rows {
        intervals.push(row?.into_interval()?);
    }
    Ok(intervals)
}

fn parse_row_timestamp(id: i64, timestamp: &str) -> Result<NaiveDateTime, DbError> {
    parse_timestamp(timestamp).map_err(|source| DbError::TimestampParse {
        id,
        timestamp: timestamp.to_string(),
        source,
    })
}
