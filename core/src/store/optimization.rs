//! Store methods for portfolio optimization runs.

use crate::{error::AnalyticsResult, optimization::PortfolioOptimization};
use rusqlite::params;

use super::{date_to_sql, decode_payloads, timestamp_to_sql, AnalyticsStore};

impl AnalyticsStore {
    pub fn insert_optimization(&self, opt: &PortfolioOptimization) -> AnalyticsResult<()> {
        let status = serde_json::to_value(opt.status)?;
        self.conn.execute(
            "INSERT INTO portfolio_optimization
                (optimization_id, optimization_date, status, created_by, created_at, payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                opt.optimization_id,
                date_to_sql(opt.optimization_date),
                status.as_str().unwrap_or_default(),
                opt.created_by,
                timestamp_to_sql(opt.created_at),
                serde_json::to_string(opt)?,
            ],
        )?;
        Ok(())
    }

    /// Most recent optimization runs, newest first.
    pub fn optimizations(&self, limit: usize) -> AnalyticsResult<Vec<PortfolioOptimization>> {
        let mut stmt = self.conn.prepare(
            "SELECT payload FROM portfolio_optimization
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?1",
        )?;
        let payloads = stmt
            .query_map(params![limit as i64], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        decode_payloads(payloads)
    }
}
