//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database. Pipeline stages call
//! store methods — they never execute SQL directly.

use crate::{
    error::SimResult,
    event::{EventLogEntry, GridEvent},
};
use chrono::NaiveDate;
use rusqlite::{params, Connection};

mod billing;
mod entity;
mod telemetry;

pub struct SimStore {
    conn: Connection,
}

impl SimStore {
    pub fn open(path: &str) -> SimResult<Self> {
        let flags = rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
            | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
            | rusqlite::OpenFlags::SQLITE_OPEN_URI;
        let conn = Connection::open_with_flags(path, flags)?;
        // Reading volume makes WAL worthwhile; shared-memory and
        // :memory: databases silently ignore the pragma.
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> SimResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> SimResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        Ok(())
    }

    // ── Run ────────────────────────────────────────────────────

    pub fn insert_run(&self, run_id: &str, seed: u64, version: &str) -> SimResult<()> {
        self.conn.execute(
            "INSERT INTO run (run_id, seed, version) VALUES (?1, ?2, ?3)",
            params![run_id, seed as i64, version],
        )?;
        Ok(())
    }

    // ── Event log ──────────────────────────────────────────────

    pub fn append_event(&self, run_id: &str, event: &GridEvent) -> SimResult<()> {
        let payload = serde_json::to_string(event)?;
        self.conn.execute(
            "INSERT INTO event_log (run_id, event_date, event_type, payload)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                run_id,
                event.date().to_string(),
                event.type_name(),
                payload
            ],
        )?;
        Ok(())
    }

    pub fn events_of_type(&self, run_id: &str, event_type: &str) -> SimResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, run_id, event_date, event_type, payload
             FROM event_log WHERE run_id = ?1 AND event_type = ?2
             ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![run_id, event_type], |row| {
                let raw_date: String = row.get(2)?;
                Ok(EventLogEntry {
                    id: Some(row.get(0)?),
                    run_id: row.get(1)?,
                    event_date: date_from_sql(2, raw_date)?,
                    event_type: row.get(3)?,
                    payload: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn event_count(&self, run_id: &str, event_type: &str) -> SimResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM event_log WHERE run_id = ?1 AND event_type = ?2",
            params![run_id, event_type],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn event_total(&self, run_id: &str) -> SimResult<i64> {
        self.count_for_run("event_log", run_id)
    }

    fn count_for_run(&self, table: &str, run_id: &str) -> SimResult<i64> {
        // table names come from a fixed internal set, never user input
        let sql = format!("SELECT COUNT(*) FROM {table} WHERE run_id = ?1");
        let count = self.conn.query_row(&sql, params![run_id], |row| row.get(0))?;
        Ok(count)
    }
}

/// Parse a TEXT date column; dates are stored as ISO-8601.
pub(crate) fn date_from_sql(idx: usize, raw: String) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}
