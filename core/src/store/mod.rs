//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! Engines never see a connection; the engine façade reads a snapshot
//! through `MetricSource` and writes finished run records back.
//!
//! Run records are stored whole as JSON `payload` plus a few indexed
//! lookup columns. They are inserted once and never updated.

mod attribution;
mod benchmark;
mod correlation;
mod investment;
mod optimization;
mod simulation;

pub use investment::{
    ClimateAssessment, EmissionsReport, EsgAssessment, ImpactAssessment, NewInvestment,
};

use crate::error::AnalyticsResult;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::Connection;
use serde::de::DeserializeOwned;

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";

pub struct AnalyticsStore {
    conn: Connection,
}

impl AnalyticsStore {
    pub fn open(path: &str) -> AnalyticsResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> AnalyticsResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> AnalyticsResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_investments.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_analytics_runs.sql"))?;
        Ok(())
    }
}

// ── Shared helpers ─────────────────────────────────────────────

pub(crate) fn date_to_sql(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Fixed-width RFC 3339 so stored timestamps sort as text.
pub(crate) fn timestamp_to_sql(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Parse a stored date, treating malformed text as absent.
pub(crate) fn date_from_sql(text: Option<String>) -> Option<NaiveDate> {
    text.and_then(|t| NaiveDate::parse_from_str(t.trim(), DATE_FORMAT).ok())
}

/// Decode a list of JSON payload strings.
pub(crate) fn decode_payloads<T: DeserializeOwned>(payloads: Vec<String>) -> AnalyticsResult<Vec<T>> {
    payloads
        .iter()
        .map(|p| serde_json::from_str(p).map_err(Into::into))
        .collect()
}
