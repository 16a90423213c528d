//! Store methods for peer benchmarks and benchmark comparisons.

use crate::{
    benchmark::{BenchmarkComparison, PeerBenchmark},
    error::AnalyticsResult,
    types::InvestmentId,
};
use rusqlite::params;

use super::{date_to_sql, decode_payloads, timestamp_to_sql, AnalyticsStore};

impl AnalyticsStore {
    pub fn insert_peer_benchmark(&self, benchmark: &PeerBenchmark) -> AnalyticsResult<()> {
        let level = serde_json::to_value(benchmark.grouping_level)?;
        self.conn.execute(
            "INSERT INTO peer_benchmark
                (benchmark_id, sector, industry, region, grouping_level,
                 benchmark_date, created_at, payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                benchmark.benchmark_id,
                benchmark.sector,
                benchmark.industry,
                benchmark.region,
                level.as_str().unwrap_or_default(),
                date_to_sql(benchmark.benchmark_date),
                timestamp_to_sql(benchmark.created_at),
                serde_json::to_string(benchmark)?,
            ],
        )?;
        Ok(())
    }

    /// Stored benchmarks, newest first. A `None` filter matches anything.
    pub fn peer_benchmarks(
        &self,
        sector:   Option<&str>,
        industry: Option<&str>,
        region:   Option<&str>,
    ) -> AnalyticsResult<Vec<PeerBenchmark>> {
        let mut stmt = self.conn.prepare(
            "SELECT payload FROM peer_benchmark
             WHERE (?1 IS NULL OR sector = ?1)
               AND (?2 IS NULL OR industry = ?2)
               AND (?3 IS NULL OR region = ?3)
             ORDER BY benchmark_date DESC, created_at DESC, rowid DESC",
        )?;
        let payloads = stmt
            .query_map(params![sector, industry, region], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        decode_payloads(payloads)
    }

    /// Persists the comparison and the benchmark it was measured against,
    /// both or neither.
    pub fn insert_benchmark_comparison(&self, comparison: &BenchmarkComparison) -> AnalyticsResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        self.insert_peer_benchmark(&comparison.benchmark)?;
        tx.execute(
            "INSERT INTO benchmark_comparison
                (comparison_id, investment_id, benchmark_id, created_at, payload)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                comparison.comparison_id,
                comparison.investment_id,
                comparison.benchmark.benchmark_id,
                timestamp_to_sql(comparison.created_at),
                serde_json::to_string(comparison)?,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Stored comparisons for one investment, newest first.
    pub fn benchmark_comparisons(
        &self,
        investment_id: InvestmentId,
    ) -> AnalyticsResult<Vec<BenchmarkComparison>> {
        let mut stmt = self.conn.prepare(
            "SELECT payload FROM benchmark_comparison
             WHERE investment_id = ?1
             ORDER BY created_at DESC, rowid DESC",
        )?;
        let payloads = stmt
            .query_map(params![investment_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        decode_payloads(payloads)
    }
}
