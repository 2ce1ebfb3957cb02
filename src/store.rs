use chrono::{DateTime, NaiveDateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, params, types::Type};
use serde::Serialize;
use std::path::Path;

use crate::error::Result;
use crate::models::OutcomeRecord;

/// Fixed-width UTC format; lexicographic order equals time order.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// Append-only sink for outcome records.
pub trait LogStore: Send + Sync {
    /// Persist `records` in order. Either all rows land or none do.
    fn append_batch(&self, records: &[OutcomeRecord]) -> Result<()>;
}

/// Create the `api_logs` table if missing
pub fn create_tables(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS api_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            endpoint TEXT NOT NULL,
            http_method TEXT NOT NULL,
            status_code INTEGER NOT NULL,
            response_time_ms INTEGER NOT NULL,
            is_error BOOLEAN NOT NULL
        );

        -- time-bounded analytics queries
        CREATE INDEX IF NOT EXISTS idx_api_logs_timestamp ON api_logs(timestamp);
        "#,
    )
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// A persisted row: auto-increment id plus the record it holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredRecord {
    pub id: i64,
    pub record: OutcomeRecord,
}

/// Overall totals for a time range
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub total: u64,
    pub errors: u64,
    pub error_rate: f64,
    pub avg_response_time_ms: f64, // successful rows only
}

/// Totals grouped by endpoint and method
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointStats {
    pub endpoint: String,
    pub http_method: String,
    pub total_calls: u64,
    pub error_count: u64,
    pub error_rate: f64,
    pub avg_latency_ms: f64,
}

fn rate(errors: u64, total: u64) -> f64 {
    if total == 0 { 0.0 } else { errors as f64 / total as f64 }
}

/// SQLite-backed log store. Also serves the read-only queries analytics runs.
pub struct SqliteLogStore {
    conn: Mutex<Connection>,
}

impl SqliteLogStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL lets analytics read while the writer appends
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        create_tables(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        create_tables(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn count(&self) -> Result<u64> {
        let conn = self.conn.lock();
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM api_logs", [], |row| row.get(0))?;
        Ok(n as u64)
    }

    /// Rows at or after `since` (all rows when `None`), in id order.
    pub fn records(&self, since: Option<DateTime<Utc>>) -> Result<Vec<StoredRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"
            SELECT id, timestamp, endpoint, http_method, status_code, response_time_ms, is_error
            FROM api_logs
            WHERE ?1 IS NULL OR timestamp >= ?1
            ORDER BY id ASC
            "#,
        )?;

        let rows = stmt.query_map([since.as_ref().map(format_timestamp)], |row| {
            let raw: String = row.get(1)?;
            let status: i64 = row.get(4)?;
            let elapsed: i64 = row.get(5)?;
            Ok(StoredRecord {
                id: row.get(0)?,
                record: OutcomeRecord {
                    timestamp: parse_timestamp(1, &raw)?,
                    endpoint: row.get(2)?,
                    method: row.get(3)?,
                    status_code: status as u16,
                    response_time_ms: elapsed as u64,
                    is_error: row.get(6)?,
                },
            })
        })?;

        let out = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(out)
    }

    pub fn summary(&self, since: Option<DateTime<Utc>>) -> Result<Summary> {
        let conn = self.conn.lock();
        let (total, errors, avg): (i64, i64, Option<f64>) = conn.query_row(
            r#"
            SELECT COUNT(*),
                   COALESCE(SUM(CASE WHEN is_error THEN 1 ELSE 0 END), 0),
                   AVG(CASE WHEN is_error THEN NULL ELSE response_time_ms END)
            FROM api_logs
            WHERE ?1 IS NULL OR timestamp >= ?1
            "#,
            [since.as_ref().map(format_timestamp)],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        let (total, errors) = (total as u64, errors as u64);
        Ok(Summary {
            total,
            errors,
            error_rate: rate(errors, total),
            avg_response_time_ms: avg.unwrap_or(0.0),
        })
    }

    /// Per-endpoint breakdown, busiest first.
    pub fn endpoint_stats(&self, since: Option<DateTime<Utc>>) -> Result<Vec<EndpointStats>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"
            SELECT endpoint,
                   http_method,
                   COUNT(*) AS total_calls,
                   SUM(CASE WHEN is_error THEN 1 ELSE 0 END) AS error_count,
                   AVG(response_time_ms) AS avg_latency_ms
            FROM api_logs
            WHERE ?1 IS NULL OR timestamp >= ?1
            GROUP BY endpoint, http_method
            ORDER BY total_calls DESC, endpoint ASC, http_method ASC
            "#,
        )?;

        let rows = stmt.query_map([since.as_ref().map(format_timestamp)], |row| {
            let total: i64 = row.get(2)?;
            let errors: i64 = row.get(3)?;
            let (total, errors) = (total as u64, errors as u64);
            Ok(EndpointStats {
                endpoint: row.get(0)?,
                http_method: row.get(1)?,
                total_calls: total,
                error_count: errors,
                error_rate: rate(errors, total),
                avg_latency_ms: row.get::<_, Option<f64>>(4)?.unwrap_or(0.0),
            })
        })?;

        let out = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(out)
    }
}

impl LogStore for SqliteLogStore {
    fn append_batch(&self, records: &[OutcomeRecord]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO api_logs (timestamp, endpoint, http_method, status_code, response_time_ms, is_error)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )?;
            for record in records {
                stmt.execute(params![
                    format_timestamp(&record.timestamp),
                    &record.endpoint,
                    &record.method,
                    record.status_code as i64,
                    record.response_time_ms as i64,
                    record.is_error,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}
