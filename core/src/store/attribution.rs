//! Store methods for impact attribution runs.

use crate::{
    attribution::{AttributionRun, ImpactAttribution},
    error::AnalyticsResult,
    types::InvestmentId,
};
use rusqlite::params;

use super::{date_to_sql, decode_payloads, timestamp_to_sql, AnalyticsStore};

impl AnalyticsStore {
    /// One row per investment in the run, written in a single transaction.
    pub fn insert_attribution_run(&self, run: &AttributionRun) -> AnalyticsResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        for a in &run.attributions {
            tx.execute(
                "INSERT INTO impact_attribution
                    (attribution_id, run_id, investment_id, attribution_date, created_at, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    a.attribution_id,
                    a.run_id,
                    a.investment_id,
                    date_to_sql(a.attribution_date),
                    timestamp_to_sql(a.created_at),
                    serde_json::to_string(a)?,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Stored attributions, newest first, optionally for one investment.
    pub fn impact_attributions(
        &self,
        investment_id: Option<InvestmentId>,
    ) -> AnalyticsResult<Vec<ImpactAttribution>> {
        let mut stmt = self.conn.prepare(
            "SELECT payload FROM impact_attribution
             WHERE (?1 IS NULL OR investment_id = ?1)
             ORDER BY attribution_date DESC, created_at DESC, rowid DESC",
        )?;
        let payloads = stmt
            .query_map(params![investment_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        decode_payloads(payloads)
    }
}
