//! Store methods for correlation analyses.

use crate::{correlation::CorrelationAnalysis, error::AnalyticsResult};
use rusqlite::{params, OptionalExtension};

use super::{date_to_sql, timestamp_to_sql, AnalyticsStore};

impl AnalyticsStore {
    pub fn insert_correlation(&self, analysis: &CorrelationAnalysis) -> AnalyticsResult<()> {
        self.conn.execute(
            "INSERT INTO correlation_analysis
                (analysis_id, analysis_date, sample_size, created_at, payload)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                analysis.analysis_id,
                date_to_sql(analysis.analysis_date),
                analysis.sample_size as i64,
                timestamp_to_sql(analysis.created_at),
                serde_json::to_string(analysis)?,
            ],
        )?;
        Ok(())
    }

    /// The most recent analysis, if any has been run.
    pub fn latest_correlation(&self) -> AnalyticsResult<Option<CorrelationAnalysis>> {
        let payload: Option<String> = self
            .conn
            .query_row(
                "SELECT payload FROM correlation_analysis
                 ORDER BY analysis_date DESC, created_at DESC, rowid DESC
                 LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        match payload {
            Some(p) => Ok(Some(serde_json::from_str(&p)?)),
            None => Ok(None),
        }
    }
}
